//! Reconciliation Store: the authoritative display state of one channel.
//!
//! A store is created once per channel. On creation it recovers the state the
//! previous process persisted; afterwards every accepted merge is written through
//! to storage. Merges that would not change any rendered field are dropped
//! entirely: no state swap, no write, and the caller is told nothing changed so it
//! does not notify the views.
//!
//! The state is kept behind an `Arc` and replaced copy-on-write, so a snapshot
//! handed to a view is never mutated afterwards.
use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tick_common::{Channel, DisplayRecord, InstrumentId, SyncError};

use crate::classifier::ChannelBatch;
use crate::interest::InterestSet;
use crate::storage::{StateStorage, decode_state, encode_state};

/// Instrument id → rendered record for one channel.
pub type ChannelState = BTreeMap<InstrumentId, DisplayRecord>;

/// Result of a merge.
#[must_use]
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// At least one record was added or changed.
    pub changed: bool,
    /// The in-memory merge succeeded but persisting it did not.
    pub storage_error: Option<SyncError>,
}

/// Owns and reconciles one channel's state.
pub struct ReconciliationStore {
    channel: Channel,
    state: Arc<ChannelState>,
    storage: Arc<dyn StateStorage>,
}

impl ReconciliationStore {
    /// Create the store for `channel`, recovering persisted state if any.
    ///
    /// Unreadable or unparseable storage is treated as absent.
    pub fn open(channel: Channel, storage: Arc<dyn StateStorage>) -> Self {
        let key = channel.storage_key();
        let state = match storage.read(key) {
            Ok(Some(text)) => match decode_state(&text) {
                Ok(state) => {
                    info!("Channel {} recovered {} records from {}", channel, state.len(), key);
                    state
                }
                Err(e) => {
                    warn!("Channel {} ignores unusable persisted state: {}", channel, e);
                    ChannelState::new()
                }
            },
            Ok(None) => ChannelState::new(),
            Err(e) => {
                warn!("Channel {} could not read persisted state: {}", channel, e);
                ChannelState::new()
            }
        };

        Self {
            channel,
            state: Arc::new(state),
            storage,
        }
    }

    /// Channel this store serves.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Current state; cheap to clone and never mutated after it is handed out.
    pub fn snapshot(&self) -> Arc<ChannelState> {
        Arc::clone(&self.state)
    }

    /// Merge a classified batch.
    ///
    /// Each tick is rendered and compared field-by-field with the current record.
    /// Instruments absent from the batch keep their records.
    pub fn merge(&mut self, batch: &ChannelBatch) -> MergeOutcome {
        let staged: Vec<(InstrumentId, DisplayRecord)> = batch
            .iter()
            .filter_map(|(id, named)| {
                let candidate = DisplayRecord::from_tick(&named.symbol_name, &named.tick);
                match self.state.get(id) {
                    Some(current) if *current == candidate => None,
                    _ => Some((id.clone(), candidate)),
                }
            })
            .collect();

        if staged.is_empty() {
            debug!("Channel {}: batch of {} changed nothing", self.channel, batch.len());
            return MergeOutcome::default();
        }

        debug!(
            "Channel {}: {} of {} records changed",
            self.channel,
            staged.len(),
            batch.len()
        );
        Arc::make_mut(&mut self.state).extend(staged);
        self.committed()
    }

    /// Drop every record whose instrument is not in `interests`.
    pub fn retain(&mut self, interests: &InterestSet) -> MergeOutcome {
        let stale = self
            .state
            .keys()
            .filter(|id| !interests.contains_key(*id))
            .count();
        if stale == 0 {
            return MergeOutcome::default();
        }

        info!("Channel {}: pruning {} records no longer of interest", self.channel, stale);
        Arc::make_mut(&mut self.state).retain(|id, _| interests.contains_key(id));
        self.committed()
    }

    fn committed(&self) -> MergeOutcome {
        MergeOutcome {
            changed: true,
            storage_error: self.persist().err(),
        }
    }

    fn persist(&self) -> Result<(), SyncError> {
        let text = encode_state(&self.state)?;
        self.storage
            .write(self.channel.storage_key(), &text)
            .inspect_err(|e| warn!("Channel {}: state not persisted: {}", self.channel, e))
    }
}
