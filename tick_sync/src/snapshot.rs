//! Snapshot Loader: one full-state fetch that seeds every channel at startup.
//!
//! The load is a guarded one-shot. It starts only once the registry knows at least
//! one instrument (there is nothing to classify before that) and is never retried;
//! on failure the channels keep whatever cold-start state they recovered.
use log::{info, warn};
use tick_common::tick::batch_from_value;
use tick_common::{Result, SyncError, TickBatch};

use crate::interest::InterestRegistry;
use crate::source::TickSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Idle,
    InFlight,
    Done,
}

/// Tracks the single snapshot load of a session.
#[derive(Debug)]
pub struct SnapshotLoader {
    state: LoadState,
}

impl Default for SnapshotLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotLoader {
    /// Loader that has not started yet.
    pub fn new() -> Self {
        Self {
            state: LoadState::Idle,
        }
    }

    /// Claim the one-shot load. Returns `false` when it already ran or when no
    /// channel has interests yet.
    pub fn try_begin(&mut self, registry: &InterestRegistry) -> bool {
        if self.state != LoadState::Idle {
            return false;
        }
        if !registry.has_interests() {
            info!("No interests known yet, skipping the initial snapshot");
            return false;
        }
        self.state = LoadState::InFlight;
        true
    }

    /// Record the outcome of the load.
    ///
    /// Returns the batch to seed channels with, `Ok(None)` for a result nobody
    /// asked for, and hands a failure back so it can be reported.
    pub fn finish(&mut self, result: Result<TickBatch>) -> Result<Option<TickBatch>> {
        if self.state != LoadState::InFlight {
            warn!("Ignoring a snapshot result that was never requested");
            return Ok(None);
        }
        self.state = LoadState::Done;
        match result {
            Ok(batch) => {
                info!("Initial snapshot received with {} ticks", batch.len());
                Ok(Some(batch))
            }
            Err(e) => {
                warn!("Initial snapshot failed, keeping recovered state: {}", e);
                Err(e)
            }
        }
    }

    /// `true` once the load has completed, successfully or not.
    pub fn is_done(&self) -> bool {
        self.state == LoadState::Done
    }
}

/// Fetch and decode the snapshot. Decoding failures are reported as fetch errors.
pub fn fetch_snapshot(source: &dyn TickSource) -> Result<TickBatch> {
    let document = source.fetch_snapshot()?;
    batch_from_value(document).map_err(|e| SyncError::Fetch(format!("snapshot: {}", e)))
}
