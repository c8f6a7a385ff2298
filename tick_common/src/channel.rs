//! Named display channels and the keys they own.
//!
//! Every channel is one independently filtered destination for classified ticks.
//! The set is closed: each variant maps to the key of its interest set in the
//! remote configuration document and to its own durable-storage key, so adding a
//! channel can never silently reuse another channel's cache entry.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Set of supported channels.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    ValueEnum,
    Display,
    EnumString,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lower")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Channel {
    /// Card grid of hand-picked instruments.
    Watchlist,
    /// Scrolling ticker marquee.
    Marquee,
    /// Global indices panel.
    Global,
}

impl Channel {
    /// Every channel, in display order.
    pub const ALL: [Channel; 3] = [Channel::Watchlist, Channel::Marquee, Channel::Global];

    /// Key of this channel's interest set in the configuration document.
    pub fn config_key(self) -> &'static str {
        match self {
            Channel::Watchlist => "desiredTokens",
            Channel::Marquee => "marqueeTokens",
            Channel::Global => "globalTokens",
        }
    }

    /// Durable-storage key under which this channel's state is persisted.
    ///
    /// These match the cache keys written by earlier deployments so their
    /// state is still recovered on cold start.
    pub fn storage_key(self) -> &'static str {
        match self {
            Channel::Watchlist => "desiredTickDataCache",
            Channel::Marquee => "marqueeTickDataCache",
            Channel::Global => "globalTickDataCache",
        }
    }
}
