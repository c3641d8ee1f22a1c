//! Controller loop: landmark frames in, finger-count commands out.
//!
//! Each frame's first detected hand is classified, the count is smoothed
//! over recent frames, and the smoothed value is sent to the board only
//! when it changes. Without a board the controller runs in demo mode and
//! only logs what it would have sent.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::transport::{SerialLink, TransportError};
use crate::vision::{classify, view_orientation, CountSmoother, Frame, HandLandmarks, LandmarkSource};

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Consecutive unreadable frames tolerated before giving up on the source.
const MAX_CONSECUTIVE_SOURCE_ERRORS: u32 = 10;

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Running totals for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub frames: u64,
    /// Frames with at least one detected hand.
    pub hands: u64,
    /// Hands rejected as malformed landmark sets.
    pub invalid_hands: u64,
    pub commands_sent: u64,
    pub commands_failed: u64,
}

pub struct Controller<T> {
    config: Config,
    smoother: CountSmoother,
    link: Option<SerialLink<T>>,
    current_count: u8,
    last_sent: Option<u8>,
    stats: ControllerStats,
}

impl<T: Read + Write> Controller<T> {
    /// Create a controller. `link: None` means demo mode.
    pub fn new(config: Config, link: Option<SerialLink<T>>) -> Self {
        let smoother = CountSmoother::new(config.vision.smoothing_frames);
        Self {
            config,
            smoother,
            link,
            current_count: 0,
            last_sent: None,
            stats: ControllerStats::default(),
        }
    }

    pub fn hardware_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Smoothed count after the most recent frame.
    pub fn current_count(&self) -> u8 {
        self.current_count
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    /// Classify one frame, update the smoothed count, and send it if it
    /// changed. Returns the smoothed count.
    pub fn process_frame(&mut self, frame: &Frame) -> u8 {
        self.stats.frames += 1;

        let max_hands = self.config.vision.max_hands;
        let count = match frame.hands.iter().take(max_hands).next() {
            None => self.smoother.push(0),
            Some(hand) => {
                self.stats.hands += 1;
                match HandLandmarks::new(&hand.points, &hand.label) {
                    Ok(landmarks) => {
                        let status = classify(&landmarks);
                        debug!(
                            frame = frame.sequence,
                            hand = landmarks.handedness().as_str(),
                            view = view_orientation(&landmarks).as_str(),
                            status = %status.status_sexp(),
                            "classified"
                        );
                        self.smoother.push(status.raised_count())
                    }
                    Err(e) => {
                        // Hand visible but unusable: keep the previous count.
                        self.stats.invalid_hands += 1;
                        debug!(frame = frame.sequence, "could not classify hand: {}", e);
                        self.smoother.hold()
                    }
                }
            }
        };

        self.current_count = count;
        if self.last_sent != Some(count) {
            self.dispatch(count);
            self.last_sent = Some(count);
        }
        count
    }

    /// Send a count to the board, or log it in demo mode.
    fn dispatch(&mut self, count: u8) {
        let Some(link) = self.link.as_mut() else {
            debug!(count, "demo mode, would send C{}", count);
            return;
        };

        match link.send_count(count) {
            Ok(()) => {
                self.stats.commands_sent += 1;
                info!(count, "count sent");
            }
            Err(e) => {
                self.stats.commands_failed += 1;
                warn!(count, port = link.name(), "command failed: {}", e);
                if e.is_fatal() {
                    warn!("dropping serial link, continuing in demo mode");
                    self.link = None;
                }
            }
        }
    }

    /// Drive the controller from a landmark source until it ends, a
    /// shutdown signal arrives, or `exit_after` elapses.
    pub fn run<S: LandmarkSource>(
        &mut self,
        source: &mut S,
        exit_after: Option<Duration>,
    ) -> anyhow::Result<()> {
        install_signal_handlers();

        let start_time = Instant::now();
        let status_interval = Duration::from_secs(self.config.controller.status_interval_secs);
        let mut last_status_log = Instant::now();
        let mut frames_at_last_status = 0u64;
        let mut consecutive_errors = 0u32;

        info!(
            hardware = self.hardware_connected(),
            smoothing_frames = self.smoother.window(),
            "controller running"
        );

        loop {
            if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
                info!("Shutdown signal received, exiting");
                break;
            }

            if let Some(dur) = exit_after {
                if start_time.elapsed() >= dur {
                    info!("exit timer fired after {:.1}s", dur.as_secs_f64());
                    break;
                }
            }

            match source.next_frame() {
                Ok(Some(frame)) => {
                    consecutive_errors = 0;
                    self.process_frame(&frame);
                }
                Ok(None) => {
                    info!("landmark stream ended");
                    break;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_SOURCE_ERRORS {
                        return Err(e.context(format!(
                            "landmark source failed {} times in a row",
                            consecutive_errors
                        )));
                    }
                    warn!("skipping unreadable frame: {:#}", e);
                    continue;
                }
            }

            if last_status_log.elapsed() >= status_interval {
                let elapsed = last_status_log.elapsed().as_secs_f64();
                let fps = (self.stats.frames - frames_at_last_status) as f64 / elapsed;
                info!(
                    fps = %format!("{:.1}", fps),
                    count = self.current_count,
                    hardware = self.hardware_connected(),
                    "status"
                );
                last_status_log = Instant::now();
                frames_at_last_status = self.stats.frames;
            }
        }

        if let Some(link) = self.link.take() {
            info!(port = link.name(), "hardware connection closed");
        }
        info!(status = %self.status_sexp(), "controller stopped");
        Ok(())
    }

    /// Generate s-expression for status output.
    pub fn status_sexp(&self) -> String {
        let port = self
            .link
            .as_ref()
            .map(|l| format!("{:?}", l.name()))
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:hardware {} :port {} :count {} :frames {} :hands {} :invalid {} :sent {} :failed {})",
            if self.hardware_connected() { "t" } else { "nil" },
            port,
            self.current_count,
            self.stats.frames,
            self.stats.hands,
            self.stats.invalid_hands,
            self.stats.commands_sent,
            self.stats.commands_failed,
        )
    }
}

/// Send a single count over an open link, for bench testing a board.
pub fn send_once<T: Read + Write>(link: &mut SerialLink<T>, count: u8) -> Result<(), TransportError> {
    link.send_count(count)?;
    info!(count, port = link.name(), "count acknowledged");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::link::FakeDevice;
    use crate::vision::landmarks::{HandLandmark, Point, LANDMARK_COUNT};
    use crate::vision::source::{DetectedHand, SexpFrameReader};
    use std::io::Cursor;

    /// Landmarks with the first `raised` fingers (thumb first) raised.
    fn hand_points(raised: usize) -> Vec<Point> {
        let mut p = vec![Point::default(); LANDMARK_COUNT];
        // All-zero knuckles read as back view for a right hand, so the
        // thumb counts as raised when its tip is right of its MCP.
        if raised >= 1 {
            p[HandLandmark::ThumbTip.index()].x = 10.0;
        }
        let tips = [
            HandLandmark::IndexTip,
            HandLandmark::MiddleTip,
            HandLandmark::RingTip,
            HandLandmark::PinkyTip,
        ];
        for tip in tips.iter().take(raised.saturating_sub(1)) {
            p[tip.index()].y = -10.0;
        }
        p
    }

    fn frame_with(seq: u64, raised: usize) -> Frame {
        Frame {
            sequence: seq,
            hands: vec![DetectedHand {
                label: "Right".to_string(),
                points: hand_points(raised),
            }],
        }
    }

    fn empty_frame(seq: u64) -> Frame {
        Frame {
            sequence: seq,
            hands: Vec::new(),
        }
    }

    fn config_with_window(window: usize) -> Config {
        let mut config = Config::default();
        config.vision.smoothing_frames = window;
        config
    }

    fn controller(window: usize, script: &str) -> Controller<FakeDevice> {
        let link = SerialLink::new(FakeDevice::new(script), "fake");
        Controller::new(config_with_window(window), Some(link))
    }

    fn written(c: Controller<FakeDevice>) -> String {
        c.link.map(|l| l.into_inner().written_str()).unwrap_or_default()
    }

    #[test]
    fn test_hand_points_helper() {
        for n in 0..=5 {
            let hand = HandLandmarks::new(&hand_points(n), "Right").unwrap();
            let status = classify(&hand);
            assert_eq!(status.raised_count() as usize, n);
        }
    }

    #[test]
    fn test_sends_only_on_change() {
        let mut c = controller(1, "OK\nOK\n");
        for (i, n) in [2, 2, 2, 3, 3, 3].iter().enumerate() {
            c.process_frame(&frame_with(i as u64, *n));
        }
        assert_eq!(c.current_count(), 3);
        assert_eq!(c.stats().commands_sent, 2);
        assert_eq!(written(c), "C2\nC3\n");
    }

    #[test]
    fn test_smoothing_suppresses_outlier() {
        let mut c = controller(3, "OK\n");
        for (i, n) in [1, 1, 4, 1].iter().enumerate() {
            assert_eq!(c.process_frame(&frame_with(i as u64, *n)), 1);
        }
        assert_eq!(written(c), "C1\n");
    }

    #[test]
    fn test_no_hand_counts_zero() {
        let mut c = controller(1, "OK\nOK\n");
        c.process_frame(&frame_with(0, 4));
        assert_eq!(c.process_frame(&empty_frame(1)), 0);
        assert_eq!(c.stats().hands, 1);
        assert_eq!(written(c), "C4\nC0\n");
    }

    #[test]
    fn test_invalid_hand_holds_previous_count() {
        let mut c = controller(1, "OK\n");
        c.process_frame(&frame_with(0, 2));

        let bad = Frame {
            sequence: 1,
            hands: vec![DetectedHand {
                label: "Right".to_string(),
                points: vec![Point::default(); 20],
            }],
        };
        assert_eq!(c.process_frame(&bad), 2);

        let unknown = Frame {
            sequence: 2,
            hands: vec![DetectedHand {
                label: "Unknown".to_string(),
                points: hand_points(5),
            }],
        };
        assert_eq!(c.process_frame(&unknown), 2);

        assert_eq!(c.stats().invalid_hands, 2);
        assert_eq!(c.stats().commands_sent, 1);
        assert_eq!(written(c), "C2\n");
    }

    #[test]
    fn test_only_first_hand_classified() {
        let mut c = controller(1, "OK\n");
        let frame = Frame {
            sequence: 0,
            hands: vec![
                DetectedHand {
                    label: "Left".to_string(),
                    points: hand_points(0),
                },
                DetectedHand {
                    label: "Right".to_string(),
                    points: hand_points(5),
                },
            ],
        };
        // Left all-zero hand: palm view, thumb tip not right of MCP.
        assert_eq!(c.process_frame(&frame), 0);
    }

    #[test]
    fn test_nack_keeps_link() {
        let mut c = controller(1, "ERR\nOK\n");
        c.process_frame(&frame_with(0, 1));
        assert!(c.hardware_connected());
        assert_eq!(c.stats().commands_failed, 1);

        c.process_frame(&frame_with(1, 2));
        assert_eq!(c.stats().commands_sent, 1);
    }

    #[test]
    fn test_io_failure_drops_link() {
        let mut device = FakeDevice::new("");
        device.fail_writes = true;
        let mut c = Controller::new(
            config_with_window(1),
            Some(SerialLink::new(device, "fake")),
        );
        c.process_frame(&frame_with(0, 3));
        assert!(!c.hardware_connected());
        assert_eq!(c.stats().commands_failed, 1);

        // Demo mode from here on.
        c.process_frame(&frame_with(1, 4));
        assert_eq!(c.stats().commands_failed, 1);
        assert_eq!(c.current_count(), 4);
    }

    #[test]
    fn test_demo_mode() {
        let mut c: Controller<FakeDevice> = Controller::new(config_with_window(1), None);
        assert!(!c.hardware_connected());
        assert_eq!(c.process_frame(&frame_with(0, 5)), 5);
        assert_eq!(c.stats().commands_sent, 0);
        assert_eq!(c.stats().frames, 1);
    }

    #[test]
    fn test_run_until_end_of_stream() {
        let mut input = String::new();
        for n in [0usize, 2, 2] {
            let pts: Vec<String> = hand_points(n)
                .iter()
                .map(|p| format!("({} {})", p.x, p.y))
                .collect();
            input.push_str(&format!(
                "(:hands ((:type \"Right\" :points ({}))))\n",
                pts.join(" ")
            ));
        }
        input.push_str("(:hands ())\n");

        let mut source = SexpFrameReader::new(Cursor::new(input));
        let mut c = controller(1, "OK\nOK\nOK\n");
        c.run(&mut source, None).unwrap();

        assert_eq!(c.stats().frames, 4);
        assert_eq!(c.stats().commands_sent, 3);
        assert_eq!(c.current_count(), 0);
        // Link is released when the loop ends.
        assert!(!c.hardware_connected());
    }

    #[test]
    fn test_run_skips_bad_lines() {
        let input = "(:hands (\n(:hands ())\n";
        let mut source = SexpFrameReader::new(Cursor::new(input));
        let mut c: Controller<FakeDevice> = Controller::new(Config::default(), None);
        c.run(&mut source, None).unwrap();
        assert_eq!(c.stats().frames, 1);
    }

    #[test]
    fn test_run_gives_up_on_persistent_errors() {
        let input = "(\n".repeat(MAX_CONSECUTIVE_SOURCE_ERRORS as usize);
        let mut source = SexpFrameReader::new(Cursor::new(input));
        let mut c: Controller<FakeDevice> = Controller::new(Config::default(), None);
        assert!(c.run(&mut source, None).is_err());
    }

    #[test]
    fn test_run_exit_after_zero() {
        let mut source = SexpFrameReader::new(Cursor::new("(:hands ())\n"));
        let mut c: Controller<FakeDevice> = Controller::new(Config::default(), None);
        c.run(&mut source, Some(Duration::ZERO)).unwrap();
        assert_eq!(c.stats().frames, 0);
    }

    #[test]
    fn test_send_once() {
        let mut link = SerialLink::new(FakeDevice::new("OK\n"), "fake");
        send_once(&mut link, 3).unwrap();
        assert_eq!(link.into_inner().written_str(), "C3\n");
    }

    #[test]
    fn test_status_sexp() {
        let mut c = controller(1, "OK\n");
        c.process_frame(&frame_with(0, 2));
        let sexp = c.status_sexp();
        assert!(sexp.contains(":hardware t"));
        assert!(sexp.contains(":port \"fake\""));
        assert!(sexp.contains(":count 2"));
        assert!(sexp.contains(":sent 1"));
        assert!(lexpr::from_str(&sexp).is_ok());

        let demo: Controller<FakeDevice> = Controller::new(Config::default(), None);
        assert!(demo.status_sexp().contains(":hardware nil :port nil"));
    }
}
