//! Interest Registry: which instruments each channel cares about.
//!
//! The registry is loaded once from the configuration document and is immutable
//! afterwards; a reload builds a new registry and replaces the old one wholesale.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::{info, warn};
use serde_json::Value;
use tick_common::{Channel, InstrumentId, Result, SyncError};

use crate::source::TickSource;

/// Instrument id → display name for one channel.
pub type InterestSet = BTreeMap<InstrumentId, String>;

/// Interest sets of every channel.
#[derive(Debug, Clone, Default)]
pub struct InterestRegistry {
    sets: HashMap<Channel, Arc<InterestSet>>,
}

impl InterestRegistry {
    /// Registry in which every channel is interested in nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fetch and parse the configuration document.
    pub fn load(source: &dyn TickSource) -> Result<Self> {
        let document = source.fetch_config()?;
        let registry = Self::from_config(&document)?;
        info!(
            "Interests loaded: {}",
            Channel::ALL
                .iter()
                .map(|c| format!("{}={}", c, registry.interests(*c).len()))
                .collect::<Vec<_>>()
                .join(" ")
        );
        Ok(registry)
    }

    /// Parse the configuration document.
    ///
    /// A channel whose key is absent gets an empty set. Display names that are not
    /// strings are stringified.
    pub fn from_config(document: &Value) -> Result<Self> {
        let Value::Object(root) = document else {
            return Err(SyncError::Fetch(
                "configuration document is not a JSON object".to_string(),
            ));
        };

        let mut registry = Self::empty();
        for channel in Channel::ALL {
            let set = match root.get(channel.config_key()) {
                None | Some(Value::Null) => InterestSet::new(),
                Some(Value::Object(entries)) => entries
                    .iter()
                    .map(|(token, name)| {
                        let name = match name {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (InstrumentId::from(token.as_str()), name)
                    })
                    .collect(),
                Some(other) => {
                    warn!(
                        "Ignoring {} for channel {}: expected an object, got {}",
                        channel.config_key(),
                        channel,
                        other
                    );
                    InterestSet::new()
                }
            };
            registry = registry.with_set(channel, set);
        }
        Ok(registry)
    }

    /// Replace one channel's interest set.
    pub fn with_set(mut self, channel: Channel, set: InterestSet) -> Self {
        self.sets.insert(channel, Arc::new(set));
        self
    }

    /// Interest set of `channel` (empty when unknown).
    pub fn interests(&self, channel: Channel) -> Arc<InterestSet> {
        self.sets.get(&channel).cloned().unwrap_or_default()
    }

    /// Display name of `id` in `channel`, if the channel is interested in it.
    pub fn display_name(&self, channel: Channel, id: &InstrumentId) -> Option<&str> {
        self.sets
            .get(&channel)
            .and_then(|set| set.get(id))
            .map(String::as_str)
    }

    /// `true` when at least one channel is interested in something.
    pub fn has_interests(&self) -> bool {
        self.sets.values().any(|set| !set.is_empty())
    }
}
