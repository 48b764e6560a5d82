//! Unified error handling for Fancurve
//!
//! This crate provides the single error type used by the codec, the
//! controller session layer, the classifier and the control loop.
//! Fatal startup errors and recoverable per-tick errors share the enum;
//! [`FancurveError::is_fatal`] tells them apart.

use std::io;
use std::path::PathBuf;

/// Result type alias using FancurveError
pub type Result<T> = std::result::Result<T, FancurveError>;

/// Unified error type for all Fancurve operations
#[derive(thiserror::Error, Debug)]
pub enum FancurveError {
    // ============================================================================
    // Startup Errors (fatal)
    // ============================================================================
    #[error("Controller session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("No temperature sensors!")]
    NoSensors,

    #[error("No controllable fans!")]
    NoFans,

    // ============================================================================
    // Key Metadata Errors
    // ============================================================================
    #[error("Key not found: {0}")]
    MetadataNotFound(String),

    #[error("Failed to fetch key info for {key}: {reason}")]
    MetadataTransient {
        key: String,
        reason: String,
    },

    // ============================================================================
    // Value Access Errors (recoverable, per tick)
    // ============================================================================
    #[error("Failed to read {key}: {reason}")]
    ReadFailure {
        key: String,
        reason: String,
    },

    #[error("Failed to write {key}: {reason}")]
    WriteFailure {
        key: String,
        reason: String,
    },

    // ============================================================================
    // Codec Errors
    // ============================================================================
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Value {value} out of range for type {tag}")]
    OutOfRange {
        tag: String,
        value: f64,
    },

    #[error("Buffer too short for type {tag}: need {needed} bytes, got {got}")]
    ShortBuffer {
        tag: String,
        needed: usize,
        got: usize,
    },

    #[error("Invalid key {0:?}: keys are exactly four ASCII characters")]
    InvalidKey(String),

    // ============================================================================
    // Configuration and I/O Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FancurveError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a session error from a string
    pub fn session(msg: impl Into<String>) -> Self {
        Self::SessionUnavailable(msg.into())
    }

    /// Create a read failure for the given key label
    pub fn read(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReadFailure {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a write failure for the given key label
    pub fn write(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteFailure {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Errors that must stop the process before the control loop starts
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SessionUnavailable(_) | Self::NoSensors | Self::NoFans | Self::Config(_)
        )
    }
}
