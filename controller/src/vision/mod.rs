//! Vision pipeline: landmark frames in, smoothed finger counts out.
//!
//! Provides:
//! - `landmarks`: validated 21-point hand landmark sets
//! - `finger_state`: per-finger raised/curled classification
//! - `smoothing`: majority vote over recent counts
//! - `source`: s-expression landmark frame input

pub mod finger_state;
pub mod landmarks;
pub mod smoothing;
pub mod source;

pub use finger_state::{classify, view_orientation};
pub use landmarks::HandLandmarks;
pub use smoothing::CountSmoother;
pub use source::{Frame, LandmarkSource, SexpFrameReader};
