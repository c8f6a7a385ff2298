//! Push connection: transport, heartbeat, retry policy and the worker that ties
//! them together.
//!
//! - `transport` — blocking WebSocket transport behind the `Transport`/`Connector` seam.
//! - `heartbeat` — liveness deadline fed by every received frame.
//! - `retry` — bounded exponential backoff with jitter.
//! - `manager` — `ConnectionManager`, the worker thread and its `StreamEvent`s.
pub mod heartbeat;
pub mod manager;
pub mod retry;
pub mod transport;

pub use manager::{ConnectionManager, ConnectionState, StreamEvent, StreamOptions};
pub use retry::RetryPolicy;
pub use transport::{Connector, Incoming, Transport, WebSocketConnector};

/// Connection health as shown to views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// First attempt (or an externally triggered one) in progress.
    Connecting,
    /// Joined and receiving.
    Healthy,
    /// Not receiving. `terminal` means no automatic retry is pending.
    Degraded {
        /// Most recent failure.
        last_error: String,
        /// Only an external reconnect can recover.
        terminal: bool,
    },
}

impl ConnectionHealth {
    /// Health after `event`, or `None` if the event leaves it as is.
    ///
    /// Retries after a failure keep the health `Degraded`; protocol errors and
    /// tick batches never change it.
    pub fn after(&self, event: &StreamEvent) -> Option<ConnectionHealth> {
        let next = match event {
            StreamEvent::Connecting { attempt: 1 } => ConnectionHealth::Connecting,
            StreamEvent::Connecting { .. } => return None,
            StreamEvent::Connected => ConnectionHealth::Healthy,
            StreamEvent::ConnectionError(reason) => ConnectionHealth::Degraded {
                last_error: reason.clone(),
                terminal: false,
            },
            StreamEvent::Disconnected(reason) => ConnectionHealth::Degraded {
                last_error: format!("disconnected: {}", reason),
                terminal: true,
            },
            StreamEvent::ReconnectExhausted { attempts } => {
                let gave_up = format!("gave up after {} reconnection attempts", attempts);
                ConnectionHealth::Degraded {
                    last_error: match self {
                        ConnectionHealth::Degraded { last_error, .. } => format!("{} ({})", last_error, gave_up),
                        _ => gave_up,
                    },
                    terminal: true,
                }
            }
            StreamEvent::Ticks(_) | StreamEvent::ProtocolError(_) => return None,
        };
        (next != *self).then_some(next)
    }

    /// `true` while connected.
    pub fn is_healthy(&self) -> bool {
        matches!(self, ConnectionHealth::Healthy)
    }
}

impl std::fmt::Display for ConnectionHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionHealth::Connecting => write!(f, "connecting"),
            ConnectionHealth::Healthy => write!(f, "healthy"),
            ConnectionHealth::Degraded {
                last_error,
                terminal: false,
            } => write!(f, "degraded, retrying ({})", last_error),
            ConnectionHealth::Degraded {
                last_error,
                terminal: true,
            } => write!(f, "disconnected ({})", last_error),
        }
    }
}
