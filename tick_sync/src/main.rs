//! Tick Sync — console front end of the tick synchronization engine.
//!
//! Fetches the interest configuration and the startup snapshot from the feed
//! backend, keeps a Socket.IO push connection open and prints every channel whose
//! state changes, together with connection health and reported errors. Channel
//! state is persisted under `--state-dir` and restored on the next start.
//!
//! Usage example (CLI):
//! ```bash
//! tick_sync --server-url http://localhost:5000 --state-dir ./tick_state --channel marquee
//! ```
#![warn(missing_docs)]
mod args;

use std::sync::Arc;
use std::thread;

use clap::Parser;
use crossbeam_channel::Receiver;
use log::{error, info};
use tick_common::{Channel, Result, SyncError};
use tick_sync::connection::WebSocketConnector;
use tick_sync::source::HttpTickSource;
use tick_sync::storage::FileStorage;
use tick_sync::store::ChannelState;
use tick_sync::{Notification, TickSync};

use crate::args::Args;

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let config = args.to_config();
    info!(
        "Feed {} (push {}), state in {}",
        config.server_url,
        config.push_url()?,
        config.state_dir.display()
    );

    let source = Arc::new(HttpTickSource::new(&config.server_url, config.http_timeout)?);
    let storage = Arc::new(FileStorage::new(config.state_dir.clone()));
    let connector = Arc::new(WebSocketConnector::new(
        config.push_url()?,
        config.poll_interval,
        config.handshake_timeout,
    ));

    let mut engine = TickSync::new(config, source, storage, connector);
    let notifications = engine.subscribe();
    let handle = engine.handle();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down...");
        handle.shutdown();
    })
    .map_err(|e| SyncError::Format(format!("Error setting Ctrl+C handler: {}", e)))?;

    let printed = args.printed_channels();
    let view = thread::Builder::new()
        .name("console-view".to_string())
        .spawn(move || run_console_view(notifications, &printed))?;

    info!("Running. Press Ctrl+C to exit.");
    engine.run();

    if view.join().is_err() {
        error!("Console view panicked");
    }
    Ok(())
}

/// Print notifications until the engine stops and closes the channel.
fn run_console_view(notifications: Receiver<Notification>, printed: &[Channel]) {
    for notification in notifications {
        match notification {
            Notification::ChannelChanged { channel, snapshot } => {
                if printed.contains(&channel) {
                    print_channel(channel, &snapshot);
                }
            }
            Notification::HealthChanged(health) => println!("[connection] {}", health),
            Notification::Error(e) => println!("[{} error] {}", e.kind(), e),
        }
    }
}

fn print_channel(channel: Channel, state: &ChannelState) {
    println!("== {} ==", channel);
    if state.is_empty() {
        println!("  No data available");
        return;
    }
    for (id, record) in state {
        let arrow = if record.is_positive { '+' } else { '-' };
        println!(
            "  {:<8} {:<24} {:>12} {}{:>9} {:>8}%",
            id.as_str(),
            record.symbol_name,
            record.last_price,
            arrow,
            record.net_change,
            record.change_percentage
        );
    }
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
