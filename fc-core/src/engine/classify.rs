//! Sensor and fan discovery
//!
//! Walks the controller's key list once at startup, sorting temperature keys
//! into calibration groups and probing every fan target key for manual
//! control.
//!
//! # Temperature key naming
//!
//! Temperature keys start with `T` and have a floating-family type. The rest
//! of the name decides the group:
//!
//! | Pattern              | Group   | Meaning                              |
//! |----------------------|---------|--------------------------------------|
//! | `Ts..`               | skin    | case surface                         |
//! | `TC..`, `TG..` not ending in `P` | hot | CPU/GPU on-die (not proximity) |
//! | `TTLD`, `TTRD`       | warm    | Thunderbolt ports                    |
//! | `TPCD`               | warm    | platform controller hub              |
//! | anything else        | other   |                                      |

use std::fmt;

use fc_error::{FancurveError, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::constants::{bounds, fan_mode};
use crate::smc::{ControllerSession, Key, Smc};

/// Calibration bucket for temperature sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorGroup {
    Hot,
    Warm,
    Skin,
    Other,
}

impl SensorGroup {
    pub const ALL: [SensorGroup; 4] = [Self::Hot, Self::Warm, Self::Skin, Self::Other];

    /// Normal operating range `(low, high)` in degrees
    pub fn bounds(self, docked: bool) -> (f64, f64) {
        match self {
            Self::Hot => bounds::HOT,
            Self::Warm => bounds::WARM,
            Self::Skin if docked => bounds::SKIN_DOCKED,
            Self::Skin => bounds::SKIN_UNDOCKED,
            Self::Other => bounds::OTHER,
        }
    }

    /// Group for a temperature key, by name alone
    pub fn of_key(key: Key) -> Self {
        let [_, a, b, c] = key.bytes();
        match (a, b, c) {
            (b's', _, _) => Self::Skin,
            (b'C' | b'G', _, last) if last != b'P' => Self::Hot,
            (b'T', b'L' | b'R', b'D') => Self::Warm,
            (b'P', b'C', b'D') => Self::Warm,
            _ => Self::Other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Skin => "skin",
            Self::Other => "other",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SensorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `key` names a temperature reading
pub fn is_temperature_key(key: Key) -> bool {
    key.char_at(0) == 'T'
}

/// A fan that accepted manual control
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FanDescriptor {
    /// Fan index, the digit in `F<n>Tg`
    pub id: u8,
    pub min: f64,
    pub max: f64,
}

impl FanDescriptor {
    /// Fan index when `key` is a fan target key `F<digit>Tg`
    pub fn parse_target_key(key: Key) -> Option<u8> {
        match key.bytes() {
            [b'F', d @ b'0'..=b'9', b'T', b'g'] => Some(d - b'0'),
            _ => None,
        }
    }

    fn key(id: u8, suffix: [u8; 2]) -> Key {
        Key::from_bytes([b'F', b'0' + id, suffix[0], suffix[1]])
    }

    pub fn target_key_for(id: u8) -> Key {
        Self::key(id, *b"Tg")
    }

    pub fn mode_key_for(id: u8) -> Key {
        Self::key(id, *b"Md")
    }

    pub fn min_key_for(id: u8) -> Key {
        Self::key(id, *b"Mn")
    }

    pub fn max_key_for(id: u8) -> Key {
        Self::key(id, *b"Mx")
    }

    pub fn target_key(&self) -> Key {
        Self::target_key_for(self.id)
    }

    pub fn mode_key(&self) -> Key {
        Self::mode_key_for(self.id)
    }

    /// Native target for a 0..=99 level: `pct/99 * (max - min) + min`
    pub fn target_for(&self, percent: u8) -> f64 {
        f64::from(percent) / f64::from(crate::constants::percent::MAX) * (self.max - self.min)
            + self.min
    }
}

/// How a temperature key's metadata lookup turned out
enum TemperatureKey {
    Sensor(SensorGroup),
    Ignored,
    /// Metadata lookup failed transiently; ask again later
    Pending,
}

fn sort_temperature_key<S: ControllerSession>(smc: &mut Smc<S>, key: Key) -> TemperatureKey {
    match smc.key_info(key) {
        Ok(info) if info.tag.is_float_family() => TemperatureKey::Sensor(SensorGroup::of_key(key)),
        Ok(_) => TemperatureKey::Ignored,
        Err(FancurveError::MetadataNotFound(_)) => {
            debug!(key = %key, "skipping temperature key without metadata");
            TemperatureKey::Ignored
        }
        Err(e) => {
            debug!(key = %key, error = %e, "temperature key metadata unavailable, will retry");
            TemperatureKey::Pending
        }
    }
}

/// Everything the control loop acts on
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    groups: [Vec<Key>; 4],
    pending: Vec<Key>,
    pub fans: Vec<FanDescriptor>,
}

impl Inventory {
    pub fn sensors(&self, group: SensorGroup) -> &[Key] {
        &self.groups[group.index()]
    }

    pub fn add_sensor(&mut self, group: SensorGroup, key: Key) {
        self.groups[group.index()].push(key);
    }

    /// Total temperature keys across all groups
    pub fn sensor_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Every classified key with its group
    pub fn iter_sensors(&self) -> impl Iterator<Item = (SensorGroup, Key)> + '_ {
        SensorGroup::ALL
            .into_iter()
            .flat_map(move |g| self.sensors(g).iter().map(move |k| (g, *k)))
    }

    pub fn group_of(&self, key: Key) -> Option<SensorGroup> {
        self.iter_sensors().find(|(_, k)| *k == key).map(|(g, _)| g)
    }

    /// Temperature keys whose metadata has not resolved yet
    pub fn pending(&self) -> &[Key] {
        &self.pending
    }

    /// Retry metadata for pending temperature keys
    ///
    /// Returns how many became sensors.
    pub fn resolve_pending<S: ControllerSession>(&mut self, smc: &mut Smc<S>) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let mut added = 0;
        for key in std::mem::take(&mut self.pending) {
            match sort_temperature_key(smc, key) {
                TemperatureKey::Sensor(group) => {
                    info!(key = %key, group = %group, "late sensor classified");
                    self.add_sensor(group, key);
                    added += 1;
                }
                TemperatureKey::Ignored => {}
                TemperatureKey::Pending => self.pending.push(key),
            }
        }
        added
    }
}

/// Switch a fan to manual control and pin it at `max`
///
/// Returns `None` when the fan is unusable, after reverting it to automatic
/// control. No fan is left half enabled.
fn probe_fan<S: ControllerSession>(smc: &mut Smc<S>, id: u8) -> Option<FanDescriptor> {
    let max = smc.read_num(FanDescriptor::max_key_for(id));
    let min = smc.read_num(FanDescriptor::min_key_for(id));
    let fan = FanDescriptor { id, min, max };

    // false when either bound is NaN
    if max > min {
        let probed = smc
            .write_int(fan.mode_key(), fan_mode::MANUAL)
            .and_then(|_| smc.write_num(fan.target_key(), max));
        match probed {
            Ok(()) => {
                debug!(fan = id, min, max, "fan accepted manual control");
                return Some(fan);
            }
            Err(e) => warn!(fan = id, error = %e, "fan rejected manual control"),
        }
    } else {
        warn!(fan = id, min, max, "fan has unusable authority bounds");
    }

    if let Err(e) = smc.write_int(fan.mode_key(), fan_mode::AUTOMATIC) {
        warn!(fan = id, error = %e, "failed to return fan to automatic");
    }
    None
}

/// Return every fan in `fans` to automatic control
///
/// Each fan gets exactly one attempt. Returns how many reverts failed.
pub fn release_fans<S: ControllerSession>(smc: &mut Smc<S>, fans: &[FanDescriptor]) -> usize {
    let mut failures = 0;
    for fan in fans {
        match smc.write_int(fan.mode_key(), fan_mode::AUTOMATIC) {
            Ok(()) => debug!(fan = fan.id, "fan returned to automatic"),
            Err(e) => {
                warn!(fan = fan.id, error = %e, "failed to return fan to automatic");
                failures += 1;
            }
        }
    }
    failures
}

/// Sort the controller's keys into sensor groups and usable fans
///
/// Temperature keys whose metadata fails transiently are retried once after
/// the pass and otherwise left pending for the control loop. Fails with
/// [`FancurveError::NoSensors`] or [`FancurveError::NoFans`] when there is
/// nothing to control. Fans already switched to manual when no
/// sensor turns up are handed back to automatic control first.
pub fn classify<S: ControllerSession>(smc: &mut Smc<S>) -> Result<Inventory> {
    let keys = smc.enumerate_keys()?;
    let mut inventory = Inventory::default();

    for key in keys {
        if is_temperature_key(key) {
            match sort_temperature_key(smc, key) {
                TemperatureKey::Sensor(group) => inventory.add_sensor(group, key),
                TemperatureKey::Ignored => {}
                TemperatureKey::Pending => inventory.pending.push(key),
            }
        } else if let Some(id) = FanDescriptor::parse_target_key(key) {
            if let Some(fan) = probe_fan(smc, id) {
                inventory.fans.push(fan);
            }
        }
    }

    // one more pass over hiccups before deciding what exists
    inventory.resolve_pending(smc);

    for group in SensorGroup::ALL {
        let keys = inventory.sensors(group);
        if !keys.is_empty() {
            let names: Vec<String> = keys.iter().map(Key::to_string).collect();
            info!(group = %group, count = keys.len(), keys = %names.join(" "), "classified sensors");
        }
    }

    if !inventory.pending.is_empty() {
        let names: Vec<String> = inventory.pending.iter().map(Key::to_string).collect();
        warn!(keys = %names.join(" "), "temperature keys still unresolved, retrying each tick");
    }

    if inventory.sensor_count() == 0 && inventory.pending.is_empty() {
        release_fans(smc, &inventory.fans);
        return Err(FancurveError::NoSensors);
    }
    if inventory.fans.is_empty() {
        return Err(FancurveError::NoFans);
    }

    info!(
        sensors = inventory.sensor_count(),
        fans = inventory.fans.len(),
        "classification complete"
    );
    Ok(inventory)
}
