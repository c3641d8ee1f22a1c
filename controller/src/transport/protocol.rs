//! Wire protocol for the LED controller board.
//!
//! ASCII, one message per line:
//!
//! ```text
//! host -> HELLO        device -> READY     (handshake)
//! host -> C<n>         device -> OK        (n = raised fingers, 0-5)
//! ```
//!
//! Replies are trimmed and decoded lossily; anything other than the
//! expected word is treated as a failure by the link.

use std::io::{self, Read};

/// Largest finger count the device accepts.
pub const MAX_COUNT: u8 = 5;

/// Longest reply line kept before the rest is discarded (bytes).
pub const MAX_LINE_LEN: usize = 256;

/// Host-to-device messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Hello,
    Count(u8),
}

impl Command {
    /// Framed bytes, including the trailing newline.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Hello => b"HELLO\n".to_vec(),
            Self::Count(n) => format!("C{}\n", n).into_bytes(),
        }
    }

    /// The reply that acknowledges this command.
    pub fn expected_reply(&self) -> Reply {
        match self {
            Self::Hello => Reply::Ready,
            Self::Count(_) => Reply::Ok,
        }
    }
}

/// Device-to-host replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ready,
    Ok,
    Other(String),
}

impl Reply {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "READY" => Self::Ready,
            "OK" => Self::Ok,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Ready => "READY",
            Self::Ok => "OK",
            Self::Other(s) => s,
        }
    }
}

/// Read one newline-terminated line, byte by byte.
///
/// Returns `Ok(None)` if the reader reports end of data (a serial read
/// timeout looks like this) before any newline. A line that ends without
/// a newline at EOF is returned as-is. Bytes past `max_len` are dropped;
/// once another `max_len` bytes have been dropped the line is abandoned
/// with `InvalidData`, so a device that never sends a newline cannot
/// stall the caller.
pub fn read_line<R: Read>(reader: &mut R, max_len: usize) -> io::Result<Option<String>> {
    let mut buf = Vec::with_capacity(32);
    let mut dropped = 0usize;
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => {
                if buf.is_empty() {
                    return Ok(None);
                }
                break;
            }
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                if buf.len() < max_len {
                    buf.push(byte[0]);
                } else {
                    dropped += 1;
                    if dropped > max_len {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("reply longer than {} bytes without a newline", 2 * max_len),
                        ));
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
