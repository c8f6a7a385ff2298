//!
//! Common types and utilities shared by the tick synchronization engine.
//!
//! This crate aggregates:
//! - `error` — unified error type `SyncError` used across the workspace.
//! - `result` — handy `Result<T, SyncError>` alias.
//! - `channel` — the closed set of display channels and their keys.
//! - `tick` — raw tick payloads and lenient JSON decoding.
//! - `record` — display-ready records and the numeric formatting policy.
//! - `packet` — Socket.IO / Engine.IO text frame codec for the push connection.
//! - `net` — endpoint constants and small URL helpers.
#![warn(missing_docs)]
pub mod channel;
pub mod error;
pub mod net;
pub mod packet;
pub mod record;
pub mod result;
pub mod tick;

pub use channel::Channel;
pub use error::SyncError;
pub use record::DisplayRecord;
pub use result::Result;
pub use tick::{InstrumentId, RawTick, TickBatch};
