//! Remote documents consumed at startup: the interest configuration and the
//! full tick snapshot.
//!
//! `TickSource` is the seam between the engine and the backend; the engine only
//! ever sees parsed JSON documents, so tests can inject canned ones.
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use serde_json::Value;
use tick_common::net::{CONFIG_PATH, SNAPSHOT_PATH, endpoint};
use tick_common::{Result, SyncError};

/// Fetches the two startup documents.
pub trait TickSource: Send + Sync {
    /// Fetch the configuration document (channel config key → interest set).
    fn fetch_config(&self) -> Result<Value>;

    /// Fetch the full current-state snapshot (instrument id → tick).
    fn fetch_snapshot(&self) -> Result<Value>;
}

/// `TickSource` backed by plain HTTP GETs against the feed backend.
pub struct HttpTickSource {
    client: Client,
    config_url: String,
    snapshot_url: String,
}

impl HttpTickSource {
    /// Build a source for the backend at `server_url`.
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Fetch(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config_url: endpoint(server_url, CONFIG_PATH),
            snapshot_url: endpoint(server_url, SNAPSHOT_PATH),
        })
    }

    fn get_json(&self, url: &str) -> Result<Value> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header("Cache-Control", "no-store")
            .send()
            .map_err(|e| SyncError::Fetch(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Fetch(format!("GET {} returned HTTP {}", url, status)));
        }

        response
            .json::<Value>()
            .map_err(|e| SyncError::Fetch(format!("GET {} returned invalid JSON: {}", url, e)))
    }
}

impl TickSource for HttpTickSource {
    fn fetch_config(&self) -> Result<Value> {
        self.get_json(&self.config_url)
    }

    fn fetch_snapshot(&self) -> Result<Value> {
        self.get_json(&self.snapshot_url)
    }
}
