//! gestled - hand-gesture finger counter driving a serial LED board
//!
//! Reads hand landmark frames from an external detector, counts raised
//! fingers, and reports the count to the board over a serial link.

mod config;
mod controller;
mod transport;
mod vision;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};

use crate::config::{Config, SerialConfig};
use crate::controller::Controller;
use crate::transport::{SerialLink, TtyPort};
use crate::vision::SexpFrameReader;

#[derive(Parser, Debug)]
#[command(name = "gestled", about = "Finger counting LED controller")]
struct Cli {
    /// Config file (written with defaults if missing)
    #[arg(long, default_value = "gestled.toml")]
    config: PathBuf,

    /// Landmark stream to read, or - for stdin
    #[arg(long, default_value = "-")]
    input: String,

    /// Serial port (overrides the config file)
    #[arg(long)]
    port: Option<String>,

    /// Run without hardware, logging commands instead of sending them
    #[arg(long)]
    demo: bool,

    /// Scan for the board, report where it answered, and exit
    #[arg(long)]
    probe: bool,

    /// Send a single finger count (0-5) to the board and exit
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
    send: Option<u8>,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Log per-frame decisions
    #[arg(long)]
    verbose: bool,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("gestled {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config_existed = cli.config.exists();
    let mut config = Config::load_or_create(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    if let Some(port) = cli.port {
        config.serial.port = port;
    }

    // Initialize tracing
    let default_filter = if cli.verbose || config.application.debug_mode {
        "gestled=debug"
    } else {
        "gestled=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    info!("gestled v{} starting", env!("CARGO_PKG_VERSION"));
    if !config_existed {
        info!(path = %cli.config.display(), "wrote default config");
    }

    if cli.probe {
        return match connect(&config.serial) {
            Some(link) => {
                println!("{}", link.name());
                Ok(())
            }
            None => bail!("no device answered the handshake"),
        };
    }

    if let Some(count) = cli.send {
        let Some(mut link) = connect(&config.serial) else {
            bail!("no device answered the handshake");
        };
        controller::send_once(&mut link, count)
            .with_context(|| format!("sending count {} to {}", count, link.name()))?;
        return Ok(());
    }

    let link = if cli.demo {
        info!("demo mode requested, not opening a serial port");
        None
    } else {
        let link = connect(&config.serial);
        if link.is_none() {
            warn!("no hardware found, running in demo mode");
        }
        link
    };

    let reader: Box<dyn BufRead> = if cli.input == "-" {
        info!("reading landmark frames from stdin");
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let file = File::open(&cli.input)
            .with_context(|| format!("opening landmark stream {}", cli.input))?;
        info!(path = %cli.input, "reading landmark frames");
        Box::new(BufReader::new(file))
    };
    let mut source = SexpFrameReader::new(reader);

    let mut controller = Controller::new(config, link);
    controller.run(&mut source, cli.exit_after.map(Duration::from_secs))?;
    let stats = controller.stats();
    info!(
        frames = source.frames_read(),
        hands = stats.hands,
        sent = stats.commands_sent,
        failed = stats.commands_failed,
        last_count = controller.current_count(),
        "done"
    );
    Ok(())
}

/// Open the configured port, or scan for the board when set to "auto".
fn connect(serial: &SerialConfig) -> Option<SerialLink<TtyPort>> {
    match serial.port_path() {
        Some(path) => {
            match transport::open_device(&path, serial.baud_rate, serial.timeout()) {
                Ok(link) => {
                    info!(port = %path.display(), "device connected");
                    Some(link)
                }
                Err(e) => {
                    warn!(port = %path.display(), "could not connect: {}", e);
                    None
                }
            }
        }
        None => transport::find_device(serial.baud_rate, serial.timeout()),
    }
}
