//! Engine configuration.
use std::path::PathBuf;
use std::time::Duration;

use tick_common::Result;
use tick_common::net::{DEFAULT_SERVER_URL, TICK_EVENT, push_url};

use crate::connection::{RetryPolicy, StreamOptions};

/// Directory used for persisted channel state when none is given.
pub const DEFAULT_STATE_DIR: &str = "tick_state";

/// Everything the engine and its default collaborators need to start.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base HTTP URL of the feed backend.
    pub server_url: String,
    /// Where `FileStorage` keeps the per-channel state files.
    pub state_dir: PathBuf,
    /// Push event carrying tick batches.
    pub event_name: String,
    /// Reconnection policy of the push connection.
    pub retry: RetryPolicy,
    /// Timeout of each HTTP fetch.
    pub http_timeout: Duration,
    /// How long a fresh push transport may stay silent before the handshake.
    pub handshake_timeout: Duration,
    /// Read timeout of the push socket; bounds how fast shutdown is noticed.
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            event_name: TICK_EVENT.to_string(),
            retry: RetryPolicy::default(),
            http_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl SyncConfig {
    /// WebSocket URL of the push endpoint.
    pub fn push_url(&self) -> Result<String> {
        push_url(&self.server_url)
    }

    /// Options for the connection manager.
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            event_name: self.event_name.clone(),
            retry: self.retry.clone(),
            handshake_timeout: self.handshake_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_the_local_backend() {
        let config = SyncConfig::default();
        assert_eq!(
            config.push_url().unwrap(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
        let options = config.stream_options();
        assert_eq!(options.event_name, "FromAPI");
        assert_eq!(options.retry.max_attempts, 5);
    }
}
