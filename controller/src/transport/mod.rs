//! Serial link to the LED controller board.

pub mod link;
pub mod port;
pub mod protocol;

pub use link::{SerialLink, TransportError};
pub use port::{find_device, open_device, TtyPort};
