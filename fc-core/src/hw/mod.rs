//! Controller backends
//!
//! Contains the index-based key enumeration shared by backends and the
//! simulated controller used by `--sim` and the tests.

mod sim;

pub use sim::{SimConnector, SimHandle, SimKey, SimProfile, SimSession, SimWrite};

use fc_error::{FancurveError, Result};
use tracing::{debug, warn};

use crate::constants::keys;
use crate::smc::{codec, ControllerSession, Key};

/// A session that can list its keys by position
pub trait IndexedKeys: ControllerSession {
    /// Key at `index` in `0..key_count`
    fn key_at(&mut self, index: u32) -> Result<Key>;
}

/// Number of keys the controller exposes, read from `#KEY`
pub fn key_count<S: ControllerSession + ?Sized>(session: &mut S) -> Result<u32> {
    let key = keys::KEY_COUNT;
    let info = session.fetch_key_info(key).map_err(|e| e.into_error(key))?;
    let mut value = session.read_value(key, &info)?;
    value.info = info;

    let count = codec::decode_integer(info.tag, value.payload())?;
    u32::try_from(count)
        .map_err(|_| FancurveError::read(key.to_string(), format!("invalid key count {}", count)))
}

/// Enumerate every key by reading `#KEY` and then asking for each index
///
/// An index that cannot be read is skipped; only a failed `#KEY` read is
/// an error.
pub fn enumerate_by_index<S: IndexedKeys + ?Sized>(session: &mut S) -> Result<Vec<Key>> {
    let count = key_count(session)?;
    debug!(count, "enumerating controller keys");

    let mut found = Vec::new();
    for index in 0..count {
        match session.key_at(index) {
            Ok(key) => found.push(key),
            Err(e) => warn!(index, error = %e, "skipping unreadable key index"),
        }
    }
    Ok(found)
}
