//! Constants and calibration values for Fancurve
//!
//! Centralizes key names, sensor group bounds and loop timing. The group
//! bounds and the percentage rounding bias are domain calibration carried
//! over from field use; change them here and nowhere else.

use std::time::Duration;

/// Well-known controller keys
pub mod keys {
    use crate::smc::Key;

    /// Number of keys the controller exposes
    pub const KEY_COUNT: Key = Key::from_bytes(*b"#KEY");
}

/// Fan mode values written to `F<n>Md`
pub mod fan_mode {
    /// Firmware thermal control
    pub const AUTOMATIC: i64 = 0;
    /// Target writes take effect
    pub const MANUAL: i64 = 1;
}

/// Sensor group calibration bounds `(low, high)` in degrees Celsius
pub mod bounds {
    /// On-die CPU/GPU sensors. Turning the fans up does little for die
    /// temperature once the heatsinks are cool, so this curve sits high.
    pub const HOT: (f64, f64) = (82.0, 96.0);

    /// Thunderbolt ports and the PCH, fine up to about 80°C
    pub const WARM: (f64, f64) = (65.0, 79.0);

    /// Case surface while attached to external displays
    pub const SKIN_DOCKED: (f64, f64) = (40.0, 45.0);

    /// Case surface while the machine may be on a lap
    pub const SKIN_UNDOCKED: (f64, f64) = (36.0, 40.0);

    /// Everything else on the board
    pub const OTHER: (f64, f64) = (60.0, 70.0);
}

/// Percentage mapping and smoothing
pub mod percent {
    /// Top of the percentage scale (the scale runs 0..=99)
    pub const MAX: u8 = 99;

    /// `lin` at or above this maps straight to [`MAX`]
    pub const SATURATION: f64 = 0.99;

    /// Added to `lin` before flooring so borderline values round up
    pub const ROUNDING_BIAS: f64 = 0.01;

    /// Applied level when the raise-floor option is set
    pub const RAISED_FLOOR: u8 = 68;

    /// Rolling window start value: the first actuation is a full-speed pulse
    pub const INITIAL: u8 = MAX;
}

/// Loop timing
pub mod timing {
    use super::*;

    /// Shortest sleep between ticks (at 99%)
    pub const BASE_SLEEP: Duration = Duration::from_secs(2);

    /// Extra sleep added at 0%, scaled down linearly as temperature rises
    pub const COOL_EXTRA_SLEEP: Duration = Duration::from_secs(5);

    /// Manual mode is re-asserted every this many ticks
    pub const REASSERT_PERIOD_TICKS: u64 = 11;

    /// Granularity of the interruptible sleep
    pub const SHUTDOWN_POLL: Duration = Duration::from_millis(100);
}
