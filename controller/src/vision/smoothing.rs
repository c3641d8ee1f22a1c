//! Finger-count smoothing over recent frames.
//!
//! Keeps a short rolling window of per-frame counts and reports the most
//! frequent one, so a single misclassified frame does not flicker the
//! LEDs. Ties go to the smallest count.

use std::collections::VecDeque;

/// Largest count the window tracks (five fingers).
const MAX_COUNT: usize = 5;

/// Bounded-history majority vote over finger counts.
#[derive(Debug, Clone)]
pub struct CountSmoother {
    window: usize,
    samples: VecDeque<u8>,
}

impl CountSmoother {
    /// Create a smoother over the last `window` frames (at least one).
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Record a frame's count and return the smoothed value.
    pub fn push(&mut self, count: u8) -> u8 {
        self.samples.push_back(count.min(MAX_COUNT as u8));
        while self.samples.len() > self.window {
            self.samples.pop_front();
        }
        self.majority()
    }

    /// Record a frame whose hand could not be classified by repeating the
    /// most recent sample (0 when there is none).
    pub fn hold(&mut self) -> u8 {
        let last = self.samples.back().copied().unwrap_or(0);
        self.push(last)
    }

    fn majority(&self) -> u8 {
        let mut tally = [0usize; MAX_COUNT + 1];
        for &c in &self.samples {
            tally[c as usize] += 1;
        }
        let mut best = 0;
        for (count, &n) in tally.iter().enumerate() {
            if n > tally[best] {
                best = count;
            }
        }
        best as u8
    }
}
