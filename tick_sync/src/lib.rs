//! Real-time tick synchronization engine.
//!
//! Ticks arrive as a full snapshot at startup and then as incremental batches over
//! a Socket.IO push connection. The engine partitions every batch into the display
//! channels interested in each instrument, merges it into that channel's
//! persisted state while suppressing no-op updates, and notifies subscribed views.
//!
//! Modules, leaf-first:
//! - `source` — fetches the interest configuration and the snapshot.
//! - `interest` — per-channel interest sets.
//! - `classifier` — splits a tick batch by channel.
//! - `snapshot` — the one-shot startup snapshot.
//! - `connection` — push connection lifecycle and recovery.
//! - `storage` / `store` — durable per-channel state and its reconciliation.
//! - `observer` — notifications to views.
//! - `engine` — the `TickSync` service object running the event loop.
#![warn(missing_docs)]
pub mod classifier;
pub mod config;
pub mod connection;
pub mod engine;
pub mod interest;
pub mod observer;
pub mod snapshot;
pub mod source;
pub mod storage;
pub mod store;

pub use config::SyncConfig;
pub use connection::ConnectionHealth;
pub use engine::{SyncHandle, TickSync};
pub use observer::Notification;
