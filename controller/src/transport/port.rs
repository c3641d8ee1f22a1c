//! Serial port access: open a tty in raw mode and discover the device.
//!
//! Uses termios through libc directly. The read timeout is set with
//! VMIN=0/VTIME so a silent device makes `read` return 0 bytes, which the
//! link reports as a timeout.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use super::link::{SerialLink, TransportError};

/// Device name prefixes that USB serial adapters show up under.
const PORT_PREFIXES: &[&str] = &[
    "ttyUSB",
    "ttyACM",
    "cu.usbserial",
    "cu.usbmodem",
    "cu.SLAB_USBtoUART",
    "cu.wchusbserial",
];

/// An open tty configured for raw 8N1 I/O.
pub struct TtyPort {
    file: File,
    path: PathBuf,
}

impl TtyPort {
    /// Open `path` at `baud_rate` with the given read timeout.
    pub fn open(path: &Path, baud_rate: u32, timeout: Duration) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)?;
        configure_raw(&file, baud_rate, timeout)?;
        debug!(?path, baud_rate, timeout_ms = timeout.as_millis() as u64, "port opened");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for TtyPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for TtyPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        // Block until the bytes have left the UART.
        let ret = unsafe { libc::tcdrain(self.file.as_raw_fd()) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Map a numeric baud rate to its termios constant.
fn baud_constant(baud_rate: u32) -> Option<libc::speed_t> {
    let speed = match baud_rate {
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        _ => return None,
    };
    Some(speed)
}

/// VTIME is in tenths of a second and fits in one byte.
fn timeout_deciseconds(timeout: Duration) -> libc::cc_t {
    (timeout.as_millis() / 100).clamp(1, 255) as libc::cc_t
}

fn configure_raw(file: &File, baud_rate: u32, timeout: Duration) -> io::Result<()> {
    let speed = baud_constant(baud_rate).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported baud rate {baud_rate}"),
        )
    })?;

    let fd = file.as_raw_fd();
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(io::Error::last_os_error());
    }

    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cc[libc::VMIN] = 0;
    tio.c_cc[libc::VTIME] = timeout_deciseconds(timeout);

    let ret = unsafe {
        libc::cfsetispeed(&mut tio, speed);
        libc::cfsetospeed(&mut tio, speed);
        libc::tcsetattr(fd, libc::TCSANOW, &tio)
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    // Drop anything the board printed while booting.
    unsafe { libc::tcflush(fd, libc::TCIOFLUSH) };
    Ok(())
}

/// Whether a /dev entry name looks like a USB serial adapter.
fn is_candidate_name(name: &str) -> bool {
    PORT_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Serial ports that might host the device, sorted by path.
pub fn candidate_ports() -> Vec<PathBuf> {
    candidate_ports_in(Path::new("/dev"))
}

fn candidate_ports_in(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(?dir, "cannot list serial ports: {}", e);
            return Vec::new();
        }
    };
    let mut ports: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_str().map_or(false, is_candidate_name))
        .map(|entry| entry.path())
        .collect();
    ports.sort();
    ports
}

/// Open a specific port and perform the handshake.
pub fn open_device(
    path: &Path,
    baud_rate: u32,
    timeout: Duration,
) -> Result<SerialLink<TtyPort>, TransportError> {
    let port = TtyPort::open(path, baud_rate, timeout)?;
    let name = port.path().display().to_string();
    SerialLink::connect(port, name)
}

/// Try every candidate port and return the first that answers the
/// handshake.
pub fn find_device(baud_rate: u32, timeout: Duration) -> Option<SerialLink<TtyPort>> {
    let ports = candidate_ports();
    if ports.is_empty() {
        info!("no serial ports found");
        return None;
    }
    for path in ports {
        match open_device(&path, baud_rate, timeout) {
            Ok(link) => {
                info!(port = %path.display(), "device found");
                return Some(link);
            }
            Err(e) => debug!(port = %path.display(), "no device: {}", e),
        }
    }
    None
}
