//! Request/acknowledge link to the LED controller.
//!
//! Generic over any `Read + Write` byte stream so the same code drives a
//! real tty and the in-memory fakes used in tests. Read timeouts are the
//! stream's concern: a read that returns no data counts as a timeout.

use std::io::{self, Read, Write};

use thiserror::Error;
use tracing::{debug, warn};

use super::protocol::{self, Command, Reply, MAX_COUNT, MAX_LINE_LEN};

/// Failures talking to the device.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no reply from device before timeout")]
    Timeout,

    #[error("expected {expected:?}, device replied {got:?}")]
    Unexpected { expected: String, got: String },

    #[error("finger count {0} is out of range 0-{max}", max = MAX_COUNT)]
    CountOutOfRange(u8),
}

impl TransportError {
    /// Whether the underlying stream is unusable (as opposed to a
    /// single failed exchange).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// An open link to the device.
pub struct SerialLink<T> {
    stream: T,
    name: String,
}

impl<T: Read + Write> SerialLink<T> {
    /// Wrap a stream without performing the handshake.
    pub fn new(stream: T, name: impl Into<String>) -> Self {
        Self {
            stream,
            name: name.into(),
        }
    }

    /// Wrap a stream and require a successful HELLO/READY handshake.
    pub fn connect(stream: T, name: impl Into<String>) -> Result<Self, TransportError> {
        let mut link = Self::new(stream, name);
        link.handshake()?;
        Ok(link)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send HELLO and wait for READY.
    pub fn handshake(&mut self) -> Result<(), TransportError> {
        self.exchange(Command::Hello)?;
        debug!(port = %self.name, "handshake complete");
        Ok(())
    }

    /// Send a finger count and wait for OK.
    pub fn send_count(&mut self, count: u8) -> Result<(), TransportError> {
        if count > MAX_COUNT {
            return Err(TransportError::CountOutOfRange(count));
        }
        self.exchange(Command::Count(count))
    }

    /// Release the underlying stream.
    #[cfg(test)]
    pub(crate) fn into_inner(self) -> T {
        self.stream
    }

    fn exchange(&mut self, command: Command) -> Result<(), TransportError> {
        self.stream.write_all(&command.encode())?;
        self.stream.flush()?;
        debug!(port = %self.name, ?command, "sent");

        let line = protocol::read_line(&mut self.stream, MAX_LINE_LEN)?
            .ok_or(TransportError::Timeout)?;
        let reply = Reply::parse(&line);
        debug!(port = %self.name, reply = reply.as_str(), "received");

        let expected = command.expected_reply();
        if reply == expected {
            Ok(())
        } else {
            warn!(port = %self.name, ?command, reply = reply.as_str(), "unexpected reply");
            Err(TransportError::Unexpected {
                expected: expected.as_str().to_string(),
                got: reply.as_str().to_string(),
            })
        }
    }
}

/// Scripted duplex stream for tests: reads come from a fixed script,
/// writes are captured.
#[cfg(test)]
pub(crate) struct FakeDevice {
    pub input: io::Cursor<Vec<u8>>,
    pub written: Vec<u8>,
    pub fail_writes: bool,
}

#[cfg(test)]
impl FakeDevice {
    pub fn new(script: &str) -> Self {
        Self {
            input: io::Cursor::new(script.as_bytes().to_vec()),
            written: Vec::new(),
            fail_writes: false,
        }
    }

    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }
}

#[cfg(test)]
impl Read for FakeDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

#[cfg(test)]
impl Write for FakeDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_handshake_ok() {
        let link = SerialLink::connect(FakeDevice::new("READY\n"), "fake").unwrap();
        assert_eq!(link.name(), "fake");
        assert_eq!(link.into_inner().written_str(), "HELLO\n");
    }

    #[test]
    fn test_connect_handshake_crlf() {
        assert!(SerialLink::connect(FakeDevice::new("READY\r\n"), "fake").is_ok());
    }

    #[test]
    fn test_connect_wrong_reply() {
        let err = SerialLink::connect(FakeDevice::new("BUSY\n"), "fake")
            .err()
            .unwrap();
        match err {
            TransportError::Unexpected { expected, got } => {
                assert_eq!(expected, "READY");
                assert_eq!(got, "BUSY");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_connect_silent_device_times_out() {
        let err = SerialLink::connect(FakeDevice::new(""), "fake").err().unwrap();
        assert!(matches!(err, TransportError::Timeout));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_send_count_ok() {
        let mut link = SerialLink::connect(FakeDevice::new("READY\nOK\nOK\n"), "fake").unwrap();
        link.send_count(2).unwrap();
        link.send_count(0).unwrap();
        assert_eq!(link.into_inner().written_str(), "HELLO\nC2\nC0\n");
    }

    #[test]
    fn test_send_count_nack() {
        let mut link = SerialLink::new(FakeDevice::new("ERR\n"), "fake");
        let err = link.send_count(4).unwrap_err();
        assert!(matches!(err, TransportError::Unexpected { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_send_count_out_of_range_writes_nothing() {
        let mut link = SerialLink::new(FakeDevice::new("OK\n"), "fake");
        let err = link.send_count(9).unwrap_err();
        assert!(matches!(err, TransportError::CountOutOfRange(9)));
        assert!(link.into_inner().written.is_empty());
    }

    #[test]
    fn test_write_failure_is_fatal() {
        let mut device = FakeDevice::new("OK\n");
        device.fail_writes = true;
        let mut link = SerialLink::new(device, "fake");
        let err = link.send_count(1).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_reply_without_newline_is_fatal() {
        let script = "O".repeat(4 * MAX_LINE_LEN);
        let mut link = SerialLink::new(FakeDevice::new(&script), "fake");
        let err = link.send_count(1).unwrap_err();
        assert!(err.is_fatal(), "{err:?}");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            TransportError::CountOutOfRange(7).to_string(),
            "finger count 7 is out of range 0-5"
        );
        assert_eq!(
            TransportError::Timeout.to_string(),
            "no reply from device before timeout"
        );
    }
}
