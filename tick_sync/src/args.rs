//! Command-line arguments of the tick sync binary.
//!
//! Every flag falls back to an environment variable, so the binary can be
//! configured the same way in a shell and in a container.
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tick_common::Channel;
use tick_common::net::{DEFAULT_SERVER_URL, TICK_EVENT};
use tick_sync::SyncConfig;
use tick_sync::config::DEFAULT_STATE_DIR;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Base HTTP URL of the feed backend.
    #[clap(long, env = "TICK_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    pub server_url: String,

    /// Directory holding the persisted state of every channel.
    #[clap(long, env = "TICK_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    /// Push event that carries tick batches.
    #[clap(long, env = "TICK_EVENT", default_value = TICK_EVENT)]
    pub event: String,

    /// Reconnection attempts after a connection failure before giving up.
    #[clap(long, env = "TICK_MAX_RECONNECT_ATTEMPTS", default_value_t = 5)]
    pub max_reconnect_attempts: u32,

    /// Delay before the first reconnection, in milliseconds.
    #[clap(long, env = "TICK_RECONNECT_DELAY_MS", default_value_t = 1000)]
    pub reconnect_delay_ms: u64,

    /// Upper bound of the reconnection delay, in milliseconds.
    #[clap(long, env = "TICK_RECONNECT_DELAY_MAX_MS", default_value_t = 5000)]
    pub reconnect_delay_max_ms: u64,

    /// Timeout of the configuration and snapshot requests, in seconds.
    #[clap(long, env = "TICK_HTTP_TIMEOUT_SECS", default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// Channels to print; repeat the flag for several. All channels when omitted.
    #[clap(long = "channel", value_enum)]
    pub channels: Vec<Channel>,
}

impl Args {
    /// Engine configuration described by these arguments.
    pub fn to_config(&self) -> SyncConfig {
        let mut config = SyncConfig {
            server_url: self.server_url.trim().replace('"', ""),
            state_dir: self.state_dir.clone(),
            event_name: self.event.clone(),
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            ..SyncConfig::default()
        };
        config.retry.max_attempts = self.max_reconnect_attempts;
        config.retry.base_delay = Duration::from_millis(self.reconnect_delay_ms);
        config.retry.max_delay = Duration::from_millis(self.reconnect_delay_max_ms.max(self.reconnect_delay_ms));
        config
    }

    /// Channels the console view prints.
    pub fn printed_channels(&self) -> Vec<Channel> {
        if self.channels.is_empty() {
            Channel::ALL.to_vec()
        } else {
            self.channels.clone()
        }
    }
}
