//! Fakes shared by the integration tests.
#![allow(dead_code)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use serde_json::Value;
use tick_common::{Channel, Result, SyncError};
use tick_sync::connection::{Connector, Incoming, RetryPolicy, Transport};
use tick_sync::store::ChannelState;
use tick_sync::{ConnectionHealth, Notification, SyncConfig};

pub const OPEN: &str = r#"0{"sid":"test","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;
pub const WAIT: Duration = Duration::from_secs(5);

/// Serves whatever documents the test put in, or fails when set to `None`.
pub struct CannedSource {
    pub config: Mutex<Option<Value>>,
    pub snapshot: Mutex<Option<Value>>,
    pub snapshot_calls: AtomicUsize,
}

impl CannedSource {
    pub fn new(config: Option<Value>, snapshot: Option<Value>) -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(config),
            snapshot: Mutex::new(snapshot),
            snapshot_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_config(&self, config: Option<Value>) {
        *self.config.lock().unwrap() = config;
    }
}

impl tick_sync::source::TickSource for CannedSource {
    fn fetch_config(&self) -> Result<Value> {
        self.config
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::Fetch("GET /config.json returned HTTP 503".into()))
    }

    fn fetch_snapshot(&self) -> Result<Value> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        self.snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::Fetch("GET /api/ticks returned HTTP 503".into()))
    }
}

/// Every connection reads the frames the test feeds through `frames`.
pub struct FeedConnector {
    frames: Receiver<String>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub connects: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
}

impl FeedConnector {
    pub fn new() -> (Arc<Self>, Sender<String>) {
        let (tx, rx) = unbounded();
        let connector = Arc::new(Self {
            frames: rx,
            sent: Arc::new(Mutex::new(Vec::new())),
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        });
        (connector, tx)
    }
}

impl Connector for FeedConnector {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FeedTransport {
            frames: self.frames.clone(),
            sent: Arc::clone(&self.sent),
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct FeedTransport {
    frames: Receiver<String>,
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl Transport for FeedTransport {
    fn recv(&mut self) -> Result<Incoming> {
        match self.frames.recv_timeout(Duration::from_millis(5)) {
            Ok(frame) => Ok(Incoming::Text(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(Incoming::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(Incoming::Closed(None)),
        }
    }

    fn send(&mut self, frame: &str) -> Result<()> {
        self.sent.lock().unwrap().push(frame.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Refuses every connection attempt.
#[derive(Default)]
pub struct RefusingConnector {
    pub attempts: AtomicUsize,
}

impl Connector for RefusingConnector {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SyncError::Connection("connection refused".into()))
    }
}

/// Config with millisecond retry delays.
pub fn fast_config(max_attempts: u32) -> SyncConfig {
    SyncConfig {
        retry: RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
        },
        poll_interval: Duration::from_millis(5),
        ..SyncConfig::default()
    }
}

pub fn spawn(engine: tick_sync::TickSync) -> JoinHandle<()> {
    thread::spawn(move || engine.run())
}

/// Skip notifications until `wanted` matches one, returning everything seen
/// (the match last).
pub fn collect_until(
    rx: &Receiver<Notification>,
    mut wanted: impl FnMut(&Notification) -> bool,
) -> Vec<Notification> {
    let deadline = Instant::now() + WAIT;
    let mut seen = Vec::new();
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let notification = rx.recv_timeout(left).expect("expected notification never arrived");
        let done = wanted(&notification);
        seen.push(notification);
        if done {
            return seen;
        }
    }
}

/// Wait for a change of `channel` whose state satisfies `wanted`.
pub fn wait_for_state(
    rx: &Receiver<Notification>,
    channel: Channel,
    wanted: impl Fn(&ChannelState) -> bool,
) -> Arc<ChannelState> {
    let seen = collect_until(rx, |n| {
        matches!(n, Notification::ChannelChanged { channel: c, snapshot } if *c == channel && wanted(snapshot))
    });
    match seen.last() {
        Some(Notification::ChannelChanged { snapshot, .. }) => Arc::clone(snapshot),
        _ => unreachable!(),
    }
}

pub fn wait_for_health(rx: &Receiver<Notification>, wanted: impl Fn(&ConnectionHealth) -> bool) -> ConnectionHealth {
    let seen = collect_until(rx, |n| matches!(n, Notification::HealthChanged(h) if wanted(h)));
    match seen.last() {
        Some(Notification::HealthChanged(health)) => health.clone(),
        _ => unreachable!(),
    }
}

pub fn changes_of(seen: &[Notification], channel: Channel) -> usize {
    seen.iter()
        .filter(|n| matches!(n, Notification::ChannelChanged { channel: c, .. } if *c == channel))
        .count()
}
