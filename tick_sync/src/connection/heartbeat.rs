//! Liveness tracking for the push connection.
//!
//! The server announces its ping interval and timeout in the open handshake. A
//! healthy connection delivers some frame (at least a ping) within
//! `ping_interval + ping_timeout`; when that deadline passes without traffic the
//! connection is considered dead even if the socket has not noticed yet.
//!
//! Time is measured with `std::time::Instant`, which is monotonic and immune to
//! system clock changes.
use std::time::{Duration, Instant};

/// Deadline of the next expected inbound frame.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    last_seen: Instant,
    timeout: Duration,
}

impl Heartbeat {
    /// Start tracking with the given allowance between frames.
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_seen: Instant::now(),
            timeout,
        }
    }

    /// Allowance derived from the server's handshake values (milliseconds).
    pub fn from_handshake(ping_interval_ms: u64, ping_timeout_ms: u64) -> Self {
        Self::new(Duration::from_millis(
            ping_interval_ms.saturating_add(ping_timeout_ms),
        ))
    }

    /// Record inbound traffic now.
    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    /// Record inbound traffic at `at`.
    pub fn record_at(&mut self, at: Instant) {
        self.last_seen = at;
    }

    /// `true` if the allowance has elapsed without traffic.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// `true` if, at `now`, the allowance has elapsed without traffic.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > self.timeout
    }

    /// Allowance between frames.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
