//! Error types for the sync cache and its persistence layer.

use thiserror::Error;

use crate::models::MessageError;
use crate::remote::ApiError;

/// Local cache read/write failure. Recovered locally and logged.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Cache I/O failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode cache entry '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse cache entry '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Subscription failed: {0}")]
    RemoteSubscription(#[source] ApiError),

    #[error("Not connected - message {0} was not sent")]
    OfflineSubmit(String),

    #[error("Failed to send message: {0}")]
    RemoteWrite(#[source] ApiError),

    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] MessageError),
}

impl SyncError {
    /// Whether the caller should keep the input around for a manual resend
    pub fn is_offline(&self) -> bool {
        matches!(self, SyncError::OfflineSubmit(_))
    }
}
