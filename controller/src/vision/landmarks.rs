//! Hand landmark data model.
//!
//! Models the 21-point hand skeleton reported by webcam landmark
//! detectors (wrist, then four points per finger, thumb to pinky).
//! Coordinates are image space: x grows rightward, y grows downward.
//! A `HandLandmarks` value only exists once it has been validated.

use thiserror::Error;

// ── Landmark definitions ───────────────────────────────────

/// The 21 landmarks of the standard hand topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandLandmark {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of landmarks per hand.
pub const LANDMARK_COUNT: usize = 21;

impl HandLandmark {
    /// All landmarks in index order.
    pub const ALL: [HandLandmark; LANDMARK_COUNT] = [
        Self::Wrist,
        Self::ThumbCmc,
        Self::ThumbMcp,
        Self::ThumbIp,
        Self::ThumbTip,
        Self::IndexMcp,
        Self::IndexPip,
        Self::IndexDip,
        Self::IndexTip,
        Self::MiddleMcp,
        Self::MiddlePip,
        Self::MiddleDip,
        Self::MiddleTip,
        Self::RingMcp,
        Self::RingPip,
        Self::RingDip,
        Self::RingTip,
        Self::PinkyMcp,
        Self::PinkyPip,
        Self::PinkyDip,
        Self::PinkyTip,
    ];

    /// Convert landmark enum to array index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// String representation for status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbCmc => "thumb-cmc",
            Self::ThumbMcp => "thumb-mcp",
            Self::ThumbIp => "thumb-ip",
            Self::ThumbTip => "thumb-tip",
            Self::IndexMcp => "index-mcp",
            Self::IndexPip => "index-pip",
            Self::IndexDip => "index-dip",
            Self::IndexTip => "index-tip",
            Self::MiddleMcp => "middle-mcp",
            Self::MiddlePip => "middle-pip",
            Self::MiddleDip => "middle-dip",
            Self::MiddleTip => "middle-tip",
            Self::RingMcp => "ring-mcp",
            Self::RingPip => "ring-pip",
            Self::RingDip => "ring-dip",
            Self::RingTip => "ring-tip",
            Self::PinkyMcp => "pinky-mcp",
            Self::PinkyPip => "pinky-pip",
            Self::PinkyDip => "pinky-dip",
            Self::PinkyTip => "pinky-tip",
        }
    }
}

impl std::fmt::Display for HandLandmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Handedness ─────────────────────────────────────────────

/// Which physical hand produced the landmarks, as labelled by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Parse the detector label. Only "Left" and "Right" are recognized.
    pub fn from_label(label: &str) -> Result<Self, InvalidInputError> {
        match label {
            "Left" => Ok(Self::Left),
            "Right" => Ok(Self::Right),
            other => Err(InvalidInputError::UnknownHandedness(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

// ── Point ──────────────────────────────────────────────────

/// A single landmark position. `z` is carried but never consulted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn with_depth(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

// ── Errors ─────────────────────────────────────────────────

/// Structurally malformed landmark input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidInputError {
    #[error("expected {expected} landmarks, got {actual}")]
    PointCount { expected: usize, actual: usize },

    #[error("unrecognized handedness label {0:?}")]
    UnknownHandedness(String),

    #[error("landmark {landmark} has a non-finite coordinate")]
    NonFinite { landmark: HandLandmark },
}

// ── Hand landmarks ─────────────────────────────────────────

/// A validated 21-point landmark set for one hand.
///
/// Fields are private so the only way in is through the validating
/// constructors; after that the value is plain `Copy` data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandLandmarks {
    points: [Point; LANDMARK_COUNT],
    handedness: Handedness,
}

impl HandLandmarks {
    /// Validate raw detector output (point list + handedness label).
    pub fn new(points: &[Point], label: &str) -> Result<Self, InvalidInputError> {
        let handedness = Handedness::from_label(label)?;
        Self::from_parts(points, handedness)
    }

    /// Validate a point list for an already-parsed handedness.
    pub fn from_parts(points: &[Point], handedness: Handedness) -> Result<Self, InvalidInputError> {
        let points: [Point; LANDMARK_COUNT] =
            points.try_into().map_err(|_| InvalidInputError::PointCount {
                expected: LANDMARK_COUNT,
                actual: points.len(),
            })?;

        if let Some(index) = points.iter().position(|p| !p.is_finite()) {
            return Err(InvalidInputError::NonFinite {
                landmark: HandLandmark::ALL[index],
            });
        }

        Ok(Self { points, handedness })
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    /// Position of a named landmark.
    pub fn point(&self, landmark: HandLandmark) -> Point {
        self.points[landmark.index()]
    }
}

/// Build a neutral landmark set for tests: all points at (0, 0).
#[cfg(test)]
pub(crate) fn test_points() -> Vec<Point> {
    vec![Point::default(); LANDMARK_COUNT]
}

// ── Tests ──────────────────────────────────────────────────
