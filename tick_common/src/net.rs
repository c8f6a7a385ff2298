//! Shared endpoint constants and URL helpers.

use crate::error::SyncError;
use crate::result::Result;

/// Base URL of the feed backend when nothing else is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";
/// Path of the configuration document holding every channel's interest set.
pub const CONFIG_PATH: &str = "/config.json";
/// Path of the full current-state tick snapshot.
pub const SNAPSHOT_PATH: &str = "/api/ticks";
/// Path and query of the Socket.IO WebSocket endpoint.
pub const PUSH_PATH: &str = "/socket.io/?EIO=4&transport=websocket";
/// Name of the push event carrying tick batches.
pub const TICK_EVENT: &str = "FromAPI";

/// Join a base URL and an absolute path like "base/path".
pub fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Derive the push endpoint from the HTTP base URL (`http` → `ws`, `https` → `wss`).
pub fn push_url(base: &str) -> Result<String> {
    let base = base.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(SyncError::Format(format!(
            "unsupported server URL scheme: {}",
            base
        )));
    };
    Ok(format!("{}{}", ws_base, PUSH_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_endpoints_without_double_slashes() {
        assert_eq!(endpoint("http://localhost:5000/", CONFIG_PATH), "http://localhost:5000/config.json");
        assert_eq!(endpoint(DEFAULT_SERVER_URL, SNAPSHOT_PATH), "http://localhost:5000/api/ticks");
    }

    #[test]
    fn maps_http_schemes_to_websocket_schemes() {
        assert_eq!(
            push_url("http://localhost:5000").unwrap(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            push_url("https://feed.example.com/").unwrap(),
            "wss://feed.example.com/socket.io/?EIO=4&transport=websocket"
        );
        assert!(push_url("ftp://x").is_err());
    }
}
