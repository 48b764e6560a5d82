//! Collaborator seams: the controller channel and the docked-state probe
//!
//! The transport that actually talks to the management controller lives
//! behind [`ControllerSession`]. Every call is synchronous and may fail
//! transiently; callers decide per call site what a failure means.

use fc_error::{FancurveError, Result};

use super::key::{Key, KeyInfo, RawValue, VALUE_CAPACITY};

/// Why a metadata lookup failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoError {
    /// The controller reports that the key does not exist
    NotFound,
    /// Anything else: the channel hiccuped and the lookup may succeed later
    Transient(String),
}

impl InfoError {
    /// Lift into the crate error for `key`
    pub fn into_error(self, key: Key) -> FancurveError {
        match self {
            Self::NotFound => FancurveError::MetadataNotFound(key.to_string()),
            Self::Transient(reason) => FancurveError::MetadataTransient {
                key: key.to_string(),
                reason,
            },
        }
    }
}

/// An open, exclusively owned channel to the controller
#[cfg_attr(test, mockall::automock)]
pub trait ControllerSession {
    /// Every key the controller exposes, in discovery order
    fn enumerate_keys(&mut self) -> Result<Vec<Key>>;

    fn fetch_key_info(&mut self, key: Key) -> std::result::Result<KeyInfo, InfoError>;

    fn read_value(&mut self, key: Key, info: &KeyInfo) -> Result<RawValue>;

    fn write_value(&mut self, key: Key, info: &KeyInfo, bytes: &[u8; VALUE_CAPACITY]) -> Result<()>;

    /// Release the channel. Called exactly once by the owning [`Smc`](super::Smc).
    fn close(&mut self) {}
}

/// Opens controller sessions
pub trait Connector {
    type Session: ControllerSession;

    fn open(&self) -> Result<Self::Session>;
}

/// Whether the machine is attached to external displays
///
/// Polled once per tick; must be cheap and free of side effects.
pub trait DockState {
    fn is_docked(&self) -> bool;
}

impl DockState for bool {
    fn is_docked(&self) -> bool {
        *self
    }
}

impl<F: Fn() -> bool> DockState for F {
    fn is_docked(&self) -> bool {
        self()
    }
}
