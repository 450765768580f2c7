//! Error taxonomy for the tracking engine.
//!
//! Steady-state faults in the four core components are absorbed into state
//! and metrics. The only caller-visible failures are configuration errors
//! raised at construction time.
//!
//! | Fault                     | Raised by            | Outcome                              |
//! |---------------------------|----------------------|--------------------------------------|
//! | [`SensorFault`]           | motion source        | classifier holds state, speed-only   |
//! | missing policy signal     | signal sources       | default category substituted         |
//! | [`DeliveryError::Transient`] | sync transport    | batch re-queued with backoff         |
//! | [`DeliveryError::Permanent`] | sync transport    | batch dropped and counted            |
//! | [`EncodeError`]           | sync shaping         | batch dropped and counted            |
//! | [`StoreError`]            | session store        | logged and counted                   |
//! | [`ConfigError`]           | constructors, loader | returned to the caller               |

use thiserror::Error;

/// Configuration rejected at construction or load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is outside its allowed range.
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid {
        /// Dotted key of the offending value (e.g. `motion.window_size`).
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },

    /// A value in a configuration file could not be parsed.
    #[error("Cannot parse {section}.{key} = '{value}': {reason}")]
    Parse {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Reading the configuration file failed.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// The INI file is malformed.
    #[error("Malformed configuration file: {0}")]
    Ini(String),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::Invalid`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Motion sensor could not be read.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Motion sensor unavailable: {reason}")]
pub struct SensorFault {
    pub reason: String,
}

impl SensorFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failure reported by a [`SyncTransport`](crate::ports::SyncTransport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The batch may succeed if retried later (timeouts, 5xx, connection reset).
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// Retrying cannot help (rejected payload, authorization revoked).
    #[error("Permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Permanent(_))
    }
}

/// A shaped batch could not be encoded for the wire.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Failed to serialize batch: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to compress batch: {0}")]
    Compress(#[from] std::io::Error),
}

/// Failure reported by a [`SessionStore`](crate::ports::SessionStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Store rejected session: {0}")]
    Rejected(String),
}
