//! Simulated management controller
//!
//! An in-memory controller loaded from a JSON profile. Values are stored
//! encoded with the real codec, so reads and writes go through the same byte
//! layouts a hardware transport would produce.
//!
//! ```json
//! {
//!   "docked": false,
//!   "keys": [
//!     { "key": "TC0D", "type": "sp78", "value": 71.5 },
//!     { "key": "F0Tg", "type": "flt ", "value": 1200 },
//!     { "key": "TXXX", "type": "sp78", "value": 40, "missing_info": true }
//!   ]
//! }
//! ```
//!
//! The simulator answers `#KEY` itself with the number of keys it holds.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fc_error::{FancurveError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{enumerate_by_index, IndexedKeys};
use crate::constants::keys;
use crate::smc::{
    codec, Connector, ControllerSession, DockState, Encoding, InfoError, Key, KeyInfo, RawValue,
    TypeTag, VALUE_CAPACITY,
};

/// Width used for tags the codec does not know
const OPAQUE_WIDTH: u32 = 4;

fn default_writable() -> bool {
    true
}

/// One simulated key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimKey {
    pub key: Key,
    #[serde(rename = "type")]
    pub tag: TypeTag,
    #[serde(default)]
    pub value: f64,
    #[serde(default = "default_writable")]
    pub writable: bool,
    /// Metadata lookups answer "not found" although the key is enumerated
    #[serde(default)]
    pub missing_info: bool,
    /// Number of metadata lookups that fail transiently before one succeeds
    #[serde(default)]
    pub flaky_info: u32,
}

impl SimKey {
    pub fn new(key: Key, tag: TypeTag, value: f64) -> Self {
        Self {
            key,
            tag,
            value,
            writable: true,
            missing_info: false,
            flaky_info: 0,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn missing_info(mut self) -> Self {
        self.missing_info = true;
        self
    }

    pub fn flaky_info(mut self, failures: u32) -> Self {
        self.flaky_info = failures;
        self
    }
}

/// Simulated controller contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimProfile {
    #[serde(default)]
    pub docked: bool,
    #[serde(default)]
    pub keys: Vec<SimKey>,
}

impl SimProfile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| FancurveError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_key(mut self, key: SimKey) -> Self {
        self.keys.push(key);
        self
    }
}

/// A write the simulator accepted, decoded for inspection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimWrite {
    pub key: Key,
    pub value: f64,
}

#[derive(Debug)]
struct SimEntry {
    key: Key,
    info: KeyInfo,
    bytes: [u8; VALUE_CAPACITY],
    writable: bool,
    missing_info: bool,
    flaky_remaining: u32,
}

impl SimEntry {
    fn from_key(sim_key: &SimKey) -> Result<Self> {
        let (size, bytes) = match Encoding::of(sim_key.tag) {
            Some(encoding) => (encoding.width() as u32, codec::encode_number(sim_key.tag, sim_key.value)?),
            None => (OPAQUE_WIDTH, [0; VALUE_CAPACITY]),
        };
        Ok(Self {
            key: sim_key.key,
            info: KeyInfo { size, tag: sim_key.tag, attributes: 0 },
            bytes,
            writable: sim_key.writable,
            missing_info: sim_key.missing_info,
            flaky_remaining: sim_key.flaky_info,
        })
    }

    fn decoded(&self) -> f64 {
        let len = (self.info.size as usize).min(VALUE_CAPACITY);
        codec::decode_number(self.info.tag, &self.bytes[..len]).unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Default)]
struct SimState {
    entries: Vec<SimEntry>,
    index: HashMap<Key, usize>,
    docked: bool,
    info_queries: HashMap<Key, u32>,
    writes: Vec<SimWrite>,
    close_count: u32,
}

impl SimState {
    fn from_profile(profile: &SimProfile) -> Result<Self> {
        let mut state = Self {
            docked: profile.docked,
            ..Self::default()
        };

        // slot 0 is the key count, filled in once the rest is known
        state.push(SimEntry::from_key(&SimKey::new(keys::KEY_COUNT, TypeTag::UI32, 0.0))?);
        for sim_key in profile.keys.iter().filter(|k| k.key != keys::KEY_COUNT) {
            state.push(SimEntry::from_key(sim_key)?);
        }
        let count = state.entries.len() as i64;
        state.entries[0].bytes = codec::encode_integer(TypeTag::UI32, count)?;

        Ok(state)
    }

    fn push(&mut self, entry: SimEntry) {
        match self.index.get(&entry.key) {
            // later definitions of the same key win
            Some(&i) => self.entries[i] = entry,
            None => {
                self.index.insert(entry.key, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    fn entry(&self, key: Key) -> Option<&SimEntry> {
        self.index.get(&key).map(|&i| &self.entries[i])
    }

    fn entry_mut(&mut self, key: Key) -> Option<&mut SimEntry> {
        match self.index.get(&key) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }
}

/// Shared view of a simulated controller, usable after the session moved away
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current decoded value of `key`
    pub fn value(&self, key: Key) -> Option<f64> {
        self.lock().entry(key).map(SimEntry::decoded)
    }

    /// Change a stored value, as the hardware would between ticks
    pub fn set_value(&self, key: Key, value: f64) -> Result<()> {
        let mut state = self.lock();
        let entry = state
            .entry_mut(key)
            .ok_or_else(|| FancurveError::write(key.to_string(), "no such key"))?;
        entry.bytes = codec::encode_number(entry.info.tag, value)?;
        Ok(())
    }

    pub fn set_docked(&self, docked: bool) {
        self.lock().docked = docked;
    }

    /// Every accepted write, oldest first
    pub fn writes(&self) -> Vec<SimWrite> {
        self.lock().writes.clone()
    }

    /// Values written to `key`, oldest first
    pub fn writes_to(&self, key: Key) -> Vec<f64> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.key == key)
            .map(|w| w.value)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// How many metadata lookups reached the simulator for `key`
    pub fn info_queries(&self, key: Key) -> u32 {
        self.lock().info_queries.get(&key).copied().unwrap_or(0)
    }

    pub fn close_count(&self) -> u32 {
        self.lock().close_count
    }
}

impl DockState for SimHandle {
    fn is_docked(&self) -> bool {
        self.lock().docked
    }
}

/// Session on a simulated controller
#[derive(Debug)]
pub struct SimSession {
    handle: SimHandle,
}

impl SimSession {
    pub fn new(profile: &SimProfile) -> Result<Self> {
        let state = SimState::from_profile(profile)?;
        Ok(Self {
            handle: SimHandle {
                state: Arc::new(Mutex::new(state)),
            },
        })
    }

    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }
}

impl ControllerSession for SimSession {
    fn enumerate_keys(&mut self) -> Result<Vec<Key>> {
        enumerate_by_index(self)
    }

    fn fetch_key_info(&mut self, key: Key) -> std::result::Result<KeyInfo, InfoError> {
        let mut state = self.handle.lock();
        *state.info_queries.entry(key).or_insert(0) += 1;

        let entry = state.entry_mut(key).ok_or(InfoError::NotFound)?;
        if entry.missing_info {
            return Err(InfoError::NotFound);
        }
        if entry.flaky_remaining > 0 {
            entry.flaky_remaining -= 1;
            return Err(InfoError::Transient("simulated channel busy".into()));
        }
        Ok(entry.info)
    }

    fn read_value(&mut self, key: Key, _info: &KeyInfo) -> Result<RawValue> {
        let state = self.handle.lock();
        let entry = state
            .entry(key)
            .ok_or_else(|| FancurveError::read(key.to_string(), "no such key"))?;
        trace!(key = %key, value = entry.decoded(), "sim read");
        Ok(RawValue {
            info: entry.info,
            bytes: entry.bytes,
        })
    }

    fn write_value(&mut self, key: Key, _info: &KeyInfo, bytes: &[u8; VALUE_CAPACITY]) -> Result<()> {
        let mut state = self.handle.lock();
        let entry = state
            .entry_mut(key)
            .ok_or_else(|| FancurveError::write(key.to_string(), "no such key"))?;
        if !entry.writable {
            return Err(FancurveError::write(key.to_string(), "key is read-only"));
        }
        entry.bytes = *bytes;
        let value = entry.decoded();
        trace!(key = %key, value, "sim write");
        state.writes.push(SimWrite { key, value });
        Ok(())
    }

    fn close(&mut self) {
        debug!("simulated controller closed");
        self.handle.lock().close_count += 1;
    }
}

impl IndexedKeys for SimSession {
    fn key_at(&mut self, index: u32) -> Result<Key> {
        let state = self.handle.lock();
        state
            .entries
            .get(index as usize)
            .map(|e| e.key)
            .ok_or_else(|| FancurveError::read(keys::KEY_COUNT.to_string(), format!("no key at index {}", index)))
    }
}

/// Opens sessions on one shared simulated controller
#[derive(Debug)]
pub struct SimConnector {
    handle: SimHandle,
}

impl SimConnector {
    pub fn new(profile: &SimProfile) -> Result<Self> {
        let session = SimSession::new(profile)?;
        Ok(Self { handle: session.handle })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let profile = SimProfile::from_file(path)?;
        debug!(path = %path.display(), keys = profile.keys.len(), "loaded simulator profile");
        Self::new(&profile)
    }

    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }
}

impl Connector for SimConnector {
    type Session = SimSession;

    fn open(&self) -> Result<SimSession> {
        Ok(SimSession {
            handle: self.handle.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn key(name: &[u8; 4]) -> Key {
        Key::from_bytes(*name)
    }

    fn profile() -> SimProfile {
        SimProfile::default()
            .with_key(SimKey::new(key(b"TC0D"), TypeTag::SP78, 71.5))
            .with_key(SimKey::new(key(b"F0Mx"), TypeTag::FLT, 6000.0).read_only())
            .with_key(SimKey::new(key(b"F0Md"), TypeTag::UI8, 0.0))
    }

    #[test]
    fn test_enumerates_through_key_count() {
        let mut session = SimSession::new(&profile()).unwrap();
        assert_eq!(super::super::key_count(&mut session).unwrap(), 4);
        let keys = session.enumerate_keys().unwrap();
        assert_eq!(keys, vec![keys::KEY_COUNT, key(b"TC0D"), key(b"F0Mx"), key(b"F0Md")]);
    }

    #[test]
    fn test_unknown_key_is_not_found() {
        let mut session = SimSession::new(&profile()).unwrap();
        assert_eq!(session.fetch_key_info(key(b"ZZZZ")), Err(InfoError::NotFound));
        assert_eq!(session.handle().info_queries(key(b"ZZZZ")), 1);
    }

    #[test]
    fn test_flaky_info_recovers() {
        let p = SimProfile::default()
            .with_key(SimKey::new(key(b"TC0D"), TypeTag::SP78, 50.0).flaky_info(2));
        let mut session = SimSession::new(&p).unwrap();
        assert!(matches!(session.fetch_key_info(key(b"TC0D")), Err(InfoError::Transient(_))));
        assert!(matches!(session.fetch_key_info(key(b"TC0D")), Err(InfoError::Transient(_))));
        assert_eq!(session.fetch_key_info(key(b"TC0D")).unwrap().tag, TypeTag::SP78);
    }

    #[test]
    fn test_write_updates_stored_bytes() {
        let mut session = SimSession::new(&profile()).unwrap();
        let handle = session.handle();
        let info = session.fetch_key_info(key(b"F0Md")).unwrap();
        let bytes = codec::encode_integer(TypeTag::UI8, 1).unwrap();
        session.write_value(key(b"F0Md"), &info, &bytes).unwrap();

        assert_eq!(handle.value(key(b"F0Md")), Some(1.0));
        assert_eq!(handle.writes(), vec![SimWrite { key: key(b"F0Md"), value: 1.0 }]);
    }

    #[test]
    fn test_read_only_key_refuses_write() {
        let mut session = SimSession::new(&profile()).unwrap();
        let info = session.fetch_key_info(key(b"F0Mx")).unwrap();
        let bytes = codec::encode_number(TypeTag::FLT, 1.0).unwrap();
        let err = session.write_value(key(b"F0Mx"), &info, &bytes).unwrap_err();
        assert!(matches!(err, FancurveError::WriteFailure { .. }));
        assert!(session.handle().writes().is_empty());
    }

    #[test]
    fn test_profile_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"docked": true, "keys": [{{"key": "Ts0S", "type": "sp78", "value": 38.25}}]}}"#
        )
        .unwrap();

        let connector = SimConnector::from_file(file.path()).unwrap();
        let handle = connector.handle();
        assert!(handle.is_docked());
        assert_eq!(handle.value(key(b"Ts0S")), Some(38.25));

        let mut session = connector.open().unwrap();
        session.close();
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn test_profile_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"keys": [], "fans": 2}}"#).unwrap();
        assert!(matches!(
            SimProfile::from_file(file.path()),
            Err(FancurveError::JsonParse(_))
        ));
        assert!(matches!(
            SimProfile::from_file(Path::new("/nonexistent/profile.json")),
            Err(FancurveError::FileRead { .. })
        ));
    }

    #[test]
    fn test_connector_debug_shows_state() {
        let connector = SimConnector::new(&profile()).unwrap();
        let shown = format!("{:?}", connector);
        assert!(shown.starts_with("SimConnector"));
        assert!(shown.contains("close_count: 0"));

        let result: Result<SimConnector> = Err(FancurveError::session("down"));
        assert!(matches!(result.unwrap_err(), FancurveError::SessionUnavailable(_)));
    }
}
