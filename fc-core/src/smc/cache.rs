//! Typed access to a controller session with memoized key metadata
//!
//! Key metadata is static for the life of a session, so each key is looked up
//! at most once successfully. A "not found" answer is remembered too and the
//! key is never queried again. Any other failure leaves the key unresolved so
//! the next use retries.

use std::collections::HashMap;

use fc_error::{FancurveError, Result};
use tracing::{debug, trace};

use super::codec;
use super::key::{Key, KeyInfo, RawValue};
use super::session::{ControllerSession, InfoError};

/// Lookup state of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoState {
    Unresolved,
    Resolved(KeyInfo),
    PermanentlyAbsent,
}

/// Value returned by [`Smc::read_num`] when a key cannot be read or decoded
pub const READ_NUM_FALLBACK: f64 = f64::NAN;

/// Value returned by [`Smc::read_int`] when a key cannot be read or decoded
pub const READ_INT_FALLBACK: i64 = -1;

/// Controller session plus its key metadata cache
///
/// Owns the session exclusively and closes it exactly once when dropped.
pub struct Smc<S: ControllerSession> {
    session: S,
    info_cache: HashMap<Key, InfoState>,
}

impl<S: ControllerSession> Smc<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            info_cache: HashMap::new(),
        }
    }

    /// Direct access to the underlying session
    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Current cache state for `key` without touching the session
    pub fn info_state(&self, key: Key) -> InfoState {
        self.info_cache.get(&key).copied().unwrap_or(InfoState::Unresolved)
    }

    pub fn enumerate_keys(&mut self) -> Result<Vec<Key>> {
        self.session.enumerate_keys()
    }

    /// Cached key metadata, fetching it if still unresolved
    pub fn key_info(&mut self, key: Key) -> Result<KeyInfo> {
        match self.info_state(key) {
            InfoState::Resolved(info) => return Ok(info),
            InfoState::PermanentlyAbsent => {
                return Err(FancurveError::MetadataNotFound(key.to_string()))
            }
            InfoState::Unresolved => {}
        }

        match self.session.fetch_key_info(key) {
            Ok(info) => {
                trace!(key = %key, tag = %info.tag, size = info.size, "key info resolved");
                self.info_cache.insert(key, InfoState::Resolved(info));
                Ok(info)
            }
            Err(InfoError::NotFound) => {
                debug!(key = %key, "key not found, caching");
                self.info_cache.insert(key, InfoState::PermanentlyAbsent);
                Err(InfoError::NotFound.into_error(key))
            }
            Err(err) => {
                debug!(key = %key, error = ?err, "key info lookup failed, will retry");
                Err(err.into_error(key))
            }
        }
    }

    /// Read a key's raw bytes
    pub fn read(&mut self, key: Key) -> Result<RawValue> {
        let info = self.key_info(key)?;
        let mut value = self.session.read_value(key, &info)?;
        // the transport does not echo metadata back reliably
        value.info = info;
        Ok(value)
    }

    pub fn try_read_num(&mut self, key: Key) -> Result<f64> {
        let value = self.read(key)?;
        codec::decode_number(value.info.tag, value.payload())
    }

    pub fn try_read_int(&mut self, key: Key) -> Result<i64> {
        let value = self.read(key)?;
        codec::decode_integer(value.info.tag, value.payload())
    }

    /// Read a key as a number, [`READ_NUM_FALLBACK`] on any failure
    pub fn read_num(&mut self, key: Key) -> f64 {
        self.try_read_num(key).unwrap_or_else(|e| {
            debug!(key = %key, error = %e, "read_num fallback");
            READ_NUM_FALLBACK
        })
    }

    /// Read a key as an integer, [`READ_INT_FALLBACK`] on any failure
    pub fn read_int(&mut self, key: Key) -> i64 {
        self.try_read_int(key).unwrap_or_else(|e| {
            debug!(key = %key, error = %e, "read_int fallback");
            READ_INT_FALLBACK
        })
    }

    /// Encode `value` for the key's declared type and write it
    pub fn write_num(&mut self, key: Key, value: f64) -> Result<()> {
        let info = self.key_info(key)?;
        let bytes = codec::encode_number(info.tag, value)?;
        self.session.write_value(key, &info, &bytes)
    }

    pub fn write_int(&mut self, key: Key, value: i64) -> Result<()> {
        let info = self.key_info(key)?;
        let bytes = codec::encode_integer(info.tag, value)?;
        self.session.write_value(key, &info, &bytes)
    }
}

impl<S: ControllerSession> Drop for Smc<S> {
    fn drop(&mut self) {
        debug!("closing controller session");
        self.session.close();
    }
}
