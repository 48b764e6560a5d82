//! Temperature to fan level mapping
//!
//! # How It Works
//!
//! 1. **Normalize**: each reading becomes `lin = (value - low) / (high - low)`
//!    against its group's bounds, so 0.0 is "cool" and 1.0 is "at the limit".
//!
//! 2. **Quantize**: the hottest `lin` maps to a level in 0..=99, biased up by
//!    0.01 so borderline readings round up rather than down.
//!
//! 3. **Smooth**: the applied level is the median of the last three levels.
//!    A single noisy tick is ignored; two agreeing ticks move the fans.

use std::time::Duration;

use crate::constants::{percent, timing};

/// Position of `value` within `(low, high)`, unclamped
pub fn normalize(value: f64, (low, high): (f64, f64)) -> f64 {
    (value - low) / (high - low)
}

/// Map a normalized position to a level in `0..=99`
///
/// NaN maps to 0.
pub fn percent_from_lin(lin: f64) -> u8 {
    if lin >= percent::SATURATION {
        percent::MAX
    } else if lin > 0.0 {
        // 0 < lin < 0.99 keeps this within 0..=98
        (f64::from(percent::MAX) * (lin + percent::ROUNDING_BIAS)).floor() as u8
    } else {
        0
    }
}

/// Raise `level` to the configured floor when requested
pub fn apply_floor(level: u8, raise_floor: bool) -> u8 {
    if raise_floor {
        level.max(percent::RAISED_FLOOR)
    } else {
        level
    }
}

/// Time to wait before the next tick at raw level `level`
///
/// 2 seconds at 99%, 7 seconds at 0%.
pub fn poll_interval(level: u8) -> Duration {
    let level = level.min(percent::MAX);
    let coolness = 1.0 - f64::from(level) / f64::from(percent::MAX);
    timing::BASE_SLEEP + timing::COOL_EXTRA_SLEEP.mul_f64(coolness)
}

/// Last three levels, oldest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingWindow {
    slots: [u8; 3],
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self {
            slots: [percent::INITIAL; 3],
        }
    }
}

impl RollingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift in `level`, dropping the oldest, and return the new median
    pub fn push(&mut self, level: u8) -> u8 {
        self.slots = [self.slots[1], self.slots[2], level];
        self.median()
    }

    pub fn median(&self) -> u8 {
        let mut sorted = self.slots;
        sorted.sort_unstable();
        sorted[1]
    }

    pub fn slots(&self) -> [u8; 3] {
        self.slots
    }
}
