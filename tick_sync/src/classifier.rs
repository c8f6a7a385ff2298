//! Channel Classifier: partitions a tick batch into per-channel subsets.
use std::collections::BTreeMap;

use tick_common::{Channel, InstrumentId, RawTick, TickBatch};

use crate::interest::InterestRegistry;

/// A tick addressed to one channel, with the display name that channel uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedTick {
    /// Display name from the channel's interest set.
    pub symbol_name: String,
    /// The raw tick.
    pub tick: RawTick,
}

/// Ticks of one batch that belong to one channel.
pub type ChannelBatch = BTreeMap<InstrumentId, NamedTick>;

/// Split `batch` by channel interest.
///
/// An instrument lands in every channel whose interest set contains it and in no
/// other. Channels that receive nothing are left out of the result.
pub fn classify(batch: &TickBatch, registry: &InterestRegistry) -> BTreeMap<Channel, ChannelBatch> {
    let mut classified: BTreeMap<Channel, ChannelBatch> = BTreeMap::new();
    for (id, tick) in batch {
        for channel in Channel::ALL {
            if let Some(name) = registry.display_name(channel, id) {
                classified.entry(channel).or_default().insert(
                    id.clone(),
                    NamedTick {
                        symbol_name: name.to_string(),
                        tick: tick.clone(),
                    },
                );
            }
        }
    }
    classified
}
