//! Error types shared by every crate in the workspace.
//!
//! The `SyncError` enum carries the failure taxonomy of the tick pipeline:
//! remote fetches, the push connection, malformed wire payloads and durable
//! storage, next to the usual I/O and serialization failures, so that crates
//! can propagate a single error type.
use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type of the tick synchronization engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration or snapshot retrieval failed (network, HTTP status or parse).
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The push connection could not be established or was dropped.
    #[error("Connection error: {0}")]
    Connection(String),

    /// An inbound push frame or event payload was malformed.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Persisted channel state could not be read, decoded or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error originating from the standard library or sockets/files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Generic formatting/validation error with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// Channel send failed (e.g., receiver dropped); contains a short context string.
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// Error indicating a poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),
}

impl<T> From<PoisonError<T>> for SyncError {
    fn from(err: PoisonError<T>) -> Self {
        SyncError::MutexLock(err.to_string())
    }
}

impl SyncError {
    /// Short, stable label of the error family, used in logs and health reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Fetch(_) => "fetch",
            SyncError::Connection(_) => "connection",
            SyncError::Protocol(_) => "protocol",
            SyncError::Storage(_) => "storage",
            SyncError::Io(_) => "io",
            SyncError::SerdeJson(_) => "json",
            SyncError::Format(_) => "format",
            SyncError::ChannelSend(_) => "channel",
            SyncError::MutexLock(_) => "lock",
        }
    }
}
