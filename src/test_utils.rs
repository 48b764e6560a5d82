/*
 * This file is part of Fancurve.
 *
 * Copyright (C) 2025 Fancurve contributors
 *
 * Fancurve is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Fancurve is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Fancurve. If not, see <https://www.gnu.org/licenses/>.
 */

//! Test utilities for Fancurve
//!
//! Provides simulated controller profiles and sample values for unit tests.

#[cfg(test)]
pub mod test_helpers {
    use std::io::Write;
    use std::time::Duration;

    use fc_core::{Key, SimKey, SimProfile, TickReport, TypeTag};
    use tempfile::NamedTempFile;

    pub fn key(name: &str) -> Key {
        name.parse().unwrap()
    }

    /// Target, mode and bound keys for fan `id`
    pub fn fan_keys(id: u8, min: f64, max: f64) -> Vec<SimKey> {
        vec![
            SimKey::new(key(&format!("F{}Tg", id)), TypeTag::FLT, min),
            SimKey::new(key(&format!("F{}Md", id)), TypeTag::UI8, 0.0),
            SimKey::new(key(&format!("F{}Mn", id)), TypeTag::FLT, min).read_only(),
            SimKey::new(key(&format!("F{}Mx", id)), TypeTag::FLT, max).read_only(),
        ]
    }

    /// A laptop with one sensor per naming pattern, two usable fans and one
    /// fan with unusable bounds
    pub fn laptop_profile() -> SimProfile {
        let mut keys = vec![
            SimKey::new(key("Ts0S"), TypeTag::SP78, 35.0),
            SimKey::new(key("TC0D"), TypeTag::SP78, 95.0),
            SimKey::new(key("TC0P"), TypeTag::SP78, 50.0),
            SimKey::new(key("TTLD"), TypeTag::SP78, 60.0),
            SimKey::new(key("TPCD"), TypeTag::FLT, 60.0),
            SimKey::new(key("BNum"), TypeTag::UI8, 1.0),
        ];
        keys.extend(fan_keys(0, 1200.0, 6000.0));
        keys.extend(fan_keys(1, 1300.0, 5800.0));
        keys.extend(fan_keys(2, 0.0, 0.0));
        SimProfile { docked: false, keys }
    }

    /// A tick report with `raw_percent` driven by `key` reading `value`
    pub fn create_mock_report(raw_percent: u8, value: f64, name: &str) -> TickReport {
        TickReport {
            tick: 2,
            raw_percent,
            effective_percent: raw_percent,
            applied_percent: raw_percent,
            dominant: Some((key(name), value)),
            docked: false,
            reasserted: false,
            write_failures: 0,
            sleep: Duration::from_secs(2),
        }
    }

    /// Creates a temporary file with JSON content
    pub fn create_temp_json_file<T: serde::Serialize>(data: &T) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        let json = serde_json::to_string_pretty(data).unwrap();
        temp_file.write_all(json.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }
}
