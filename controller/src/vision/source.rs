//! Landmark frame input.
//!
//! The hand detector runs out of process and streams one s-expression per
//! frame, for example:
//!
//! ```text
//! (:frame 12 :hands ((:type "Right" :points ((0.51 0.92) (0.47 0.88 -0.01) ...))))
//! ```
//!
//! Each hand carries its detector label and raw point list. Nothing is
//! validated here beyond s-expression shape; landmark count and label
//! checks belong to `HandLandmarks`.

use std::io::BufRead;

use anyhow::{anyhow, bail, Context};
use lexpr::Value;
use tracing::trace;

use super::landmarks::Point;

/// One detection as reported by the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedHand {
    /// Detector handedness label ("Left" / "Right").
    pub label: String,
    pub points: Vec<Point>,
}

/// All detections for one video frame (possibly none).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub sequence: u64,
    pub hands: Vec<DetectedHand>,
}

/// Anything that yields landmark frames. `Ok(None)` means end of stream.
pub trait LandmarkSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>>;
}

/// Reads s-expression frames line by line.
pub struct SexpFrameReader<R> {
    reader: R,
    line_no: u64,
    frames_read: u64,
}

impl<R: BufRead> SexpFrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            frames_read: 0,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl<R: BufRead> LandmarkSource for SexpFrameReader<R> {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .reader
                .read_line(&mut line)
                .context("reading landmark stream")?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') {
                continue;
            }

            let frame = parse_frame(trimmed, self.frames_read)
                .with_context(|| format!("line {}", self.line_no))?;
            self.frames_read += 1;
            trace!(sequence = frame.sequence, hands = frame.hands.len(), "frame");
            return Ok(Some(frame));
        }
    }
}

/// Parse a single frame s-expression. `fallback_sequence` is used when the
/// frame has no `:frame` number.
pub fn parse_frame(raw: &str, fallback_sequence: u64) -> anyhow::Result<Frame> {
    let value = lexpr::from_str(raw).map_err(|e| anyhow!("malformed s-expression: {e}"))?;

    let sequence = match plist_get(&value, "frame") {
        Some(v) => as_number(v)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u64)
            .ok_or_else(|| anyhow!(":frame must be a non-negative number"))?,
        None => fallback_sequence,
    };

    let hands = match plist_get(&value, "hands") {
        Some(list) => list_items(list)
            .ok_or_else(|| anyhow!(":hands must be a list"))?
            .into_iter()
            .enumerate()
            .map(|(i, hand)| parse_hand(hand).with_context(|| format!("hand {i}")))
            .collect::<anyhow::Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(Frame { sequence, hands })
}

fn parse_hand(value: &Value) -> anyhow::Result<DetectedHand> {
    let label = match plist_get(value, "type") {
        Some(Value::String(s)) => s.to_string(),
        Some(Value::Symbol(s)) => s.to_string(),
        Some(other) => bail!(":type must be a string, got {other}"),
        None => bail!("missing :type"),
    };

    let raw_points = plist_get(value, "points").ok_or_else(|| anyhow!("missing :points"))?;
    let points = list_items(raw_points)
        .ok_or_else(|| anyhow!(":points must be a list"))?
        .into_iter()
        .enumerate()
        .map(|(i, p)| parse_point(p).with_context(|| format!("point {i}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(DetectedHand { label, points })
}

fn parse_point(value: &Value) -> anyhow::Result<Point> {
    let coords = list_items(value)
        .ok_or_else(|| anyhow!("expected (x y) or (x y z)"))?
        .into_iter()
        .map(|v| as_number(v).ok_or_else(|| anyhow!("coordinate {v} is not a number")))
        .collect::<anyhow::Result<Vec<f64>>>()?;

    match coords.as_slice() {
        [x, y] => Ok(Point::new(*x, *y)),
        [x, y, z] => Ok(Point::with_depth(*x, *y, *z)),
        other => bail!("expected 2 or 3 coordinates, got {}", other.len()),
    }
}

// ── s-expression helpers ───────────────────────────────────

/// Look up `:key` in a property list and return the value that follows it.
fn plist_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            return match pair.cdr() {
                Value::Cons(next) => Some(next.car()),
                _ => None,
            };
        }
        current = pair.cdr();
    }
    None
}

/// Top-level elements of a proper list (or vector). `None` for atoms.
fn list_items(value: &Value) -> Option<Vec<&Value>> {
    match value {
        Value::Null | Value::Nil => Some(Vec::new()),
        Value::Vector(items) => Some(items.iter().collect()),
        Value::Cons(_) => {
            let mut items = Vec::new();
            let mut current = value;
            loop {
                match current {
                    Value::Cons(pair) => {
                        items.push(pair.car());
                        current = pair.cdr();
                    }
                    Value::Null | Value::Nil => return Some(items),
                    // Dotted list.
                    _ => return None,
                }
            }
        }
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn points_sexp(n: usize) -> String {
        let pts: Vec<String> = (0..n).map(|i| format!("({} {}.5)", i, i)).collect();
        format!("({})", pts.join(" "))
    }

    // ── parse_frame ─────────────────────────────────────────

    #[test]
    fn test_parse_frame_with_hand() {
        let raw = format!(
            "(:frame 7 :hands ((:type \"Right\" :points {})))",
            points_sexp(21)
        );
        let frame = parse_frame(&raw, 0).unwrap();
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.hands.len(), 1);
        assert_eq!(frame.hands[0].label, "Right");
        assert_eq!(frame.hands[0].points.len(), 21);
        assert_eq!(frame.hands[0].points[3], Point::new(3.0, 3.5));
    }

    #[test]
    fn test_parse_frame_no_hands() {
        let frame = parse_frame("(:frame 2 :hands ())", 0).unwrap();
        assert_eq!(frame.sequence, 2);
        assert!(frame.hands.is_empty());

        let frame = parse_frame("(:frame 3)", 0).unwrap();
        assert!(frame.hands.is_empty());
    }

    #[test]
    fn test_parse_frame_fallback_sequence() {
        let frame = parse_frame("(:hands ())", 41).unwrap();
        assert_eq!(frame.sequence, 41);
    }

    #[test]
    fn test_parse_point_with_depth() {
        let frame =
            parse_frame("(:hands ((:type \"Left\" :points ((1 2 -0.25)))))", 0).unwrap();
        assert_eq!(frame.hands[0].points[0], Point::with_depth(1.0, 2.0, -0.25));
    }

    #[test]
    fn test_parse_point_keeps_full_precision() {
        let frame = parse_frame(
            "(:hands ((:type \"Right\" :points ((1e300 0.50000001) (0 0.50000002)))))",
            0,
        )
        .unwrap();
        let points = &frame.hands[0].points;
        assert_eq!(points[0].x, 1e300);
        assert!(points[0].x.is_finite());
        assert!(points[0].y < points[1].y);
    }

    #[test]
    fn test_wrong_point_count_is_passed_through() {
        // Count validation is the classifier's job, not the reader's.
        let raw = format!("(:hands ((:type \"Left\" :points {})))", points_sexp(20));
        let frame = parse_frame(&raw, 0).unwrap();
        assert_eq!(frame.hands[0].points.len(), 20);
    }

    #[test]
    fn test_unknown_label_is_passed_through() {
        let frame = parse_frame("(:hands ((:type \"Up\" :points ())))", 0).unwrap();
        assert_eq!(frame.hands[0].label, "Up");
    }

    #[test]
    fn test_parse_frame_errors() {
        assert!(parse_frame("(:hands ((:type", 0).is_err());
        assert!(parse_frame("(:hands ((:points ())))", 0).is_err());
        assert!(parse_frame("(:hands ((:type \"Left\")))", 0).is_err());
        assert!(parse_frame("(:hands ((:type \"Left\" :points ((1)))))", 0).is_err());
        assert!(parse_frame("(:hands ((:type \"Left\" :points ((1 \"a\")))))", 0).is_err());
        assert!(parse_frame("(:hands 5)", 0).is_err());
        assert!(parse_frame("(:frame -1)", 0).is_err());
    }

    // ── SexpFrameReader ─────────────────────────────────────

    #[test]
    fn test_reader_skips_blank_and_comment_lines() {
        let input = "; detector v1\n\n(:frame 1 :hands ())\n   \n(:frame 2 :hands ())\n";
        let mut reader = SexpFrameReader::new(Cursor::new(input));
        assert_eq!(reader.next_frame().unwrap().unwrap().sequence, 1);
        assert_eq!(reader.next_frame().unwrap().unwrap().sequence, 2);
        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.frames_read(), 2);
    }

    #[test]
    fn test_reader_reports_line_number() {
        let input = "(:frame 1)\n(:frame\n";
        let mut reader = SexpFrameReader::new(Cursor::new(input));
        assert!(reader.next_frame().unwrap().is_some());
        let err = reader.next_frame().unwrap_err();
        assert!(format!("{err:#}").contains("line 2"), "{err:#}");
    }

    #[test]
    fn test_reader_numbers_frames_without_sequence() {
        let input = "(:hands ())\n(:hands ())\n";
        let mut reader = SexpFrameReader::new(Cursor::new(input));
        assert_eq!(reader.next_frame().unwrap().unwrap().sequence, 0);
        assert_eq!(reader.next_frame().unwrap().unwrap().sequence, 1);
    }
}
