//! Finger state classification from hand landmarks.
//!
//! Decides which of the five fingers are raised from a single validated
//! `HandLandmarks` value. Non-thumb fingers compare tip and PIP height.
//! The thumb moves sideways, so its test depends on whether the camera
//! sees the palm or the back of the hand, which is inferred from the
//! horizontal order of the index and pinky knuckles.
//!
//! Pure and stateless: every function here is a function of its input.

use super::landmarks::{HandLandmark, HandLandmarks, Handedness, Point};

// ── Fingers ────────────────────────────────────────────────

/// The five fingers, thumb first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Self::Thumb,
        Self::Index,
        Self::Middle,
        Self::Ring,
        Self::Pinky,
    ];

    /// Fingertip landmark.
    pub fn tip(&self) -> HandLandmark {
        match self {
            Self::Thumb => HandLandmark::ThumbTip,
            Self::Index => HandLandmark::IndexTip,
            Self::Middle => HandLandmark::MiddleTip,
            Self::Ring => HandLandmark::RingTip,
            Self::Pinky => HandLandmark::PinkyTip,
        }
    }

    /// Joint the tip is compared against. The thumb uses its MCP (index 2).
    pub fn reference(&self) -> HandLandmark {
        match self {
            Self::Thumb => HandLandmark::ThumbMcp,
            Self::Index => HandLandmark::IndexPip,
            Self::Middle => HandLandmark::MiddlePip,
            Self::Ring => HandLandmark::RingPip,
            Self::Pinky => HandLandmark::PinkyPip,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumb => "thumb",
            Self::Index => "index",
            Self::Middle => "middle",
            Self::Ring => "ring",
            Self::Pinky => "pinky",
        }
    }
}

// ── View orientation ───────────────────────────────────────

/// Which side of the hand faces the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewOrientation {
    Palm,
    Back,
}

impl ViewOrientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Palm => "palm",
            Self::Back => "back",
        }
    }
}

/// Infer palm vs back view from the index and pinky knuckles.
///
/// In the (mirrored) display frame a right hand shown palm-first has its
/// index knuckle left of its pinky knuckle; a left hand shows the
/// opposite layout. Anything else means the back of the hand is visible.
pub fn view_orientation(hand: &HandLandmarks) -> ViewOrientation {
    let index_left_of_pinky =
        hand.point(HandLandmark::IndexMcp).x < hand.point(HandLandmark::PinkyMcp).x;
    let palm = match hand.handedness() {
        Handedness::Right => index_left_of_pinky,
        Handedness::Left => !index_left_of_pinky,
    };
    if palm {
        ViewOrientation::Palm
    } else {
        ViewOrientation::Back
    }
}

// ── Thumb rule ─────────────────────────────────────────────

/// Horizontal side the thumb tip must be on, relative to its reference
/// joint, for the thumb to count as raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbDirection {
    TipLeftOfReference,
    TipRightOfReference,
}

impl ThumbDirection {
    /// Strict comparison: equal x means curled.
    pub fn is_raised(&self, tip: Point, reference: Point) -> bool {
        match self {
            Self::TipLeftOfReference => tip.x < reference.x,
            Self::TipRightOfReference => tip.x > reference.x,
        }
    }
}

/// Thumb direction table keyed by (view, handedness).
///
/// Base case is a right palm (tip left of reference); every other cell is
/// that case mirrored once per flipped key.
pub struct ThumbRule;

impl ThumbRule {
    const TABLE: [[ThumbDirection; 2]; 2] = [
        // Palm: [Right, Left]
        [
            ThumbDirection::TipLeftOfReference,
            ThumbDirection::TipRightOfReference,
        ],
        // Back: [Right, Left]
        [
            ThumbDirection::TipRightOfReference,
            ThumbDirection::TipLeftOfReference,
        ],
    ];

    pub fn lookup(view: ViewOrientation, handedness: Handedness) -> ThumbDirection {
        let row = match view {
            ViewOrientation::Palm => 0,
            ViewOrientation::Back => 1,
        };
        let col = match handedness {
            Handedness::Right => 0,
            Handedness::Left => 1,
        };
        Self::TABLE[row][col]
    }
}

// ── Finger status ──────────────────────────────────────────

/// Raised (true) / curled (false) state of each finger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FingerStatus {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerStatus {
    pub fn is_raised(&self, finger: Finger) -> bool {
        match finger {
            Finger::Thumb => self.thumb,
            Finger::Index => self.index,
            Finger::Middle => self.middle,
            Finger::Ring => self.ring,
            Finger::Pinky => self.pinky,
        }
    }

    fn set(&mut self, finger: Finger, raised: bool) {
        match finger {
            Finger::Thumb => self.thumb = raised,
            Finger::Index => self.index = raised,
            Finger::Middle => self.middle = raised,
            Finger::Ring => self.ring = raised,
            Finger::Pinky => self.pinky = raised,
        }
    }

    /// (finger, raised) pairs in thumb-to-pinky order.
    pub fn iter(&self) -> impl Iterator<Item = (Finger, bool)> + '_ {
        Finger::ALL
            .into_iter()
            .map(move |f| (f, self.is_raised(f)))
    }

    /// Number of raised fingers (0-5).
    pub fn raised_count(&self) -> u8 {
        self.iter().filter(|(_, raised)| *raised).count() as u8
    }

    /// S-expression report, e.g. `(:thumb t :index nil ... :count 1)`.
    pub fn status_sexp(&self) -> String {
        let mut s = String::from("(");
        for (finger, raised) in self.iter() {
            s.push_str(&format!(
                ":{} {} ",
                finger.as_str(),
                if raised { "t" } else { "nil" }
            ));
        }
        s.push_str(&format!(":count {})", self.raised_count()));
        s
    }
}

// ── Classification ─────────────────────────────────────────

/// Classify every finger of one hand.
pub fn classify(hand: &HandLandmarks) -> FingerStatus {
    let thumb_direction = ThumbRule::lookup(view_orientation(hand), hand.handedness());

    let mut status = FingerStatus::default();
    for finger in Finger::ALL {
        let tip = hand.point(finger.tip());
        let reference = hand.point(finger.reference());
        let raised = match finger {
            Finger::Thumb => thumb_direction.is_raised(tip, reference),
            // Smaller y is higher in the image.
            _ => tip.y < reference.y,
        };
        status.set(finger, raised);
    }
    status
}

// ── Tests ──────────────────────────────────────────────────
