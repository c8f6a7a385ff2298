//! Notifications delivered to Channel Views.
//!
//! Views register a `crossbeam_channel` sender and receive every notification from
//! then on. Broadcast is best-effort: a subscriber whose receiver is gone is dropped
//! on the next publish.
use std::sync::Arc;

use crossbeam_channel::Sender;
use log::debug;
use tick_common::{Channel, SyncError};

use crate::connection::ConnectionHealth;
use crate::store::ChannelState;

/// Message sent to every subscribed view.
#[derive(Debug, Clone)]
pub enum Notification {
    /// A channel's state changed (or is being replayed to a new subscriber).
    ChannelChanged {
        /// Which channel.
        channel: Channel,
        /// Read-only state after the change.
        snapshot: Arc<ChannelState>,
    },
    /// Connection health changed.
    HealthChanged(ConnectionHealth),
    /// A non-fatal failure worth showing.
    Error(Arc<SyncError>),
}

/// Registered view senders.
#[derive(Default)]
pub struct Observers {
    subscribers: Vec<Sender<Notification>>,
}

impl Observers {
    /// No subscribers yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tx` after replaying `initial` to it.
    ///
    /// A subscriber that hangs up during the replay is not registered.
    pub fn subscribe(&mut self, tx: Sender<Notification>, initial: impl IntoIterator<Item = Notification>) {
        for notification in initial {
            if tx.send(notification).is_err() {
                return;
            }
        }
        self.subscribers.push(tx);
        debug!("View subscribed. Total views: {}", self.subscribers.len());
    }

    /// Send `notification` to every live subscriber.
    pub fn publish(&mut self, notification: Notification) {
        let before = self.subscribers.len();
        self.subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
        if self.subscribers.len() != before {
            debug!("Dropped {} closed views", before - self.subscribers.len());
        }
    }

    /// Report a failure to every subscriber.
    pub fn report(&mut self, error: SyncError) {
        self.publish(Notification::Error(Arc::new(error)));
    }

    /// Number of live subscribers as of the last publish.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// `true` if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Drop every subscriber, closing their receivers.
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}
