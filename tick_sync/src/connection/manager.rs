//! Stream Connection Manager.
//!
//! A dedicated worker thread owns the push connection and runs its state machine:
//!
//! ```text
//! Disconnected ─► Connecting ─► Connected ─► Disconnected   (server said goodbye)
//!                     ▲              │
//!                     │              └────► Failed ─► (backoff) ─► Connecting
//!                     └──────── external reconnect() ◄── retry budget exhausted
//! ```
//!
//! The worker answers heartbeats, joins the default namespace and forwards every
//! tick event batch, as received, on the event channel returned by `start`. It
//! never buffers or reorders batches. Connection trouble is reported as events and
//! never surfaces as a panic or an error return.
//!
//! Shutdown and reconnect requests travel over a control channel the worker checks
//! between reads, so they take effect within one transport poll interval.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use log::{debug, error, info, warn};
use tick_common::net::TICK_EVENT;
use tick_common::packet::{self, Packet, SocketPacket};
use tick_common::tick::batch_from_value;
use tick_common::{Result, TickBatch};

use super::heartbeat::Heartbeat;
use super::retry::RetryPolicy;
use super::transport::{Connector, Incoming, Transport};

/// Lifecycle state of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none being attempted.
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// Joined and receiving events.
    Connected,
    /// The last attempt or session failed.
    Failed,
}

/// Everything the worker reports to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Connection attempt `attempt` (1-based since the last success) started.
    Connecting {
        /// Attempt number.
        attempt: u32,
    },
    /// The namespace join was acknowledged.
    Connected,
    /// One tick event batch.
    Ticks(TickBatch),
    /// The connection failed to establish or dropped.
    ConnectionError(String),
    /// A frame or event payload could not be decoded; the connection stays up.
    ProtocolError(String),
    /// The server closed the session cleanly; no automatic reconnection follows.
    Disconnected(String),
    /// The retry budget is spent; only `reconnect()` restarts the connection.
    ReconnectExhausted {
        /// Reconnection attempts made before giving up.
        attempts: u32,
    },
}

/// Tunables of the connection.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Name of the event carrying tick batches.
    pub event_name: String,
    /// Reconnection policy.
    pub retry: RetryPolicy,
    /// How long to wait for the server handshake on a fresh transport.
    pub handshake_timeout: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            event_name: TICK_EVENT.to_string(),
            retry: RetryPolicy::default(),
            handshake_timeout: Duration::from_secs(20),
        }
    }
}

/// Longest time `shutdown` waits for the worker to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

enum Control {
    Reconnect,
    Shutdown,
}

/// Handle to the connection worker.
pub struct ConnectionManager {
    control: Sender<Control>,
    state: Arc<Mutex<ConnectionState>>,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Spawn the worker and return the manager with its event stream.
    pub fn start(
        connector: Arc<dyn Connector>,
        options: StreamOptions,
    ) -> Result<(Self, Receiver<StreamEvent>)> {
        let (event_tx, event_rx) = unbounded::<StreamEvent>();
        let (control_tx, control_rx) = unbounded::<Control>();
        let state = Arc::new(Mutex::new(ConnectionState::Disconnected));

        let worker = Worker {
            connector,
            options,
            events: event_tx,
            control: control_rx,
            state: Arc::clone(&state),
        };
        let handle = thread::Builder::new()
            .name("tick-stream".to_string())
            .spawn(move || worker.run())?;

        Ok((
            Self {
                control: control_tx,
                state,
                closed: AtomicBool::new(false),
                worker: Mutex::new(Some(handle)),
            },
            event_rx,
        ))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Drop the current session (if any) and connect again with a fresh retry budget.
    pub fn reconnect(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        info!("Reconnect requested");
        let _ = self.control.send(Control::Reconnect);
    }

    /// Close the connection and stop the worker. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Closing push connection");
        let _ = self.control.send(Control::Shutdown);

        let handle = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                // The worker is stuck in a bounded connect; it closes its transport
                // and exits on its own once that returns.
                warn!("Connection worker still busy after {:?}, detaching it", SHUTDOWN_GRACE);
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        if handle.join().is_err() {
            error!("Connection worker panicked");
        }
    }

    /// `true` once `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum SessionEnd {
    Shutdown,
    Restart,
    ServerDisconnect(String),
    Failed { reason: String, was_connected: bool },
}

struct Worker {
    connector: Arc<dyn Connector>,
    options: StreamOptions,
    events: Sender<StreamEvent>,
    control: Receiver<Control>,
    state: Arc<Mutex<ConnectionState>>,
}

impl Worker {
    fn run(self) {
        let mut failures: u32 = 0;
        loop {
            self.set_state(ConnectionState::Connecting);
            if !self.emit(StreamEvent::Connecting {
                attempt: failures + 1,
            }) {
                break;
            }

            match self.session() {
                SessionEnd::Shutdown => break,
                SessionEnd::Restart => failures = 0,
                SessionEnd::ServerDisconnect(reason) => {
                    self.set_state(ConnectionState::Disconnected);
                    info!("Server closed the session: {}", reason);
                    failures = 0;
                    if !self.emit(StreamEvent::Disconnected(reason)) || !self.wait_for_trigger() {
                        break;
                    }
                }
                SessionEnd::Failed {
                    reason,
                    was_connected,
                } => {
                    self.set_state(ConnectionState::Failed);
                    warn!("Push connection failed: {}", reason);
                    if !self.emit(StreamEvent::ConnectionError(reason)) {
                        break;
                    }
                    if was_connected {
                        failures = 0;
                    }
                    failures += 1;

                    if !self.options.retry.allows(failures) {
                        let attempts = failures - 1;
                        error!("Giving up on the push connection after {} reconnection attempts", attempts);
                        if !self.emit(StreamEvent::ReconnectExhausted { attempts })
                            || !self.wait_for_trigger()
                        {
                            break;
                        }
                        failures = 0;
                        continue;
                    }

                    let delay = self.options.retry.delay_for(failures);
                    debug!("Reconnection {} in {:?}", failures, delay);
                    match self.control.recv_timeout(delay) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(Control::Reconnect) => failures = 0,
                        Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            }
        }
        self.set_state(ConnectionState::Disconnected);
        debug!("Connection worker stopped");
    }

    /// One transport lifetime: connect, pump frames, close exactly once.
    fn session(&self) -> SessionEnd {
        let mut transport = match self.connector.connect() {
            Ok(transport) => transport,
            Err(e) => {
                return SessionEnd::Failed {
                    reason: e.to_string(),
                    was_connected: false,
                };
            }
        };

        let mut connected = false;
        let end = self.pump(transport.as_mut(), &mut connected);
        if connected && matches!(end, SessionEnd::Shutdown | SessionEnd::Restart) {
            let _ = send(transport.as_mut(), &Packet::Message(SocketPacket::Disconnect));
        }
        transport.close();
        end
    }

    fn pump(&self, transport: &mut dyn Transport, connected: &mut bool) -> SessionEnd {
        let mut heartbeat = Heartbeat::new(self.options.handshake_timeout);
        let failed = |reason: String, connected: bool| SessionEnd::Failed {
            reason,
            was_connected: connected,
        };

        loop {
            match self.control.try_recv() {
                Ok(Control::Shutdown) | Err(TryRecvError::Disconnected) => return SessionEnd::Shutdown,
                Ok(Control::Reconnect) => return SessionEnd::Restart,
                Err(TryRecvError::Empty) => {}
            }
            if heartbeat.is_expired() {
                return failed(
                    format!("ping timeout: no traffic for {:?}", heartbeat.timeout()),
                    *connected,
                );
            }

            let frame = match transport.recv() {
                Ok(Incoming::Text(frame)) => frame,
                Ok(Incoming::Idle) => continue,
                Ok(Incoming::Closed(reason)) => {
                    return failed(
                        format!("transport closed: {}", reason.unwrap_or_else(|| "no reason".to_string())),
                        *connected,
                    );
                }
                Err(e) => return failed(e.to_string(), *connected),
            };
            heartbeat.record();

            let packet = match packet::decode(&frame) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Undecodable frame: {}", e);
                    if !self.emit(StreamEvent::ProtocolError(e.to_string())) {
                        return SessionEnd::Shutdown;
                    }
                    continue;
                }
            };

            match packet {
                Packet::Open(handshake) => {
                    debug!(
                        "Session {} open (ping interval {} ms, timeout {} ms)",
                        handshake.sid, handshake.ping_interval, handshake.ping_timeout
                    );
                    heartbeat = Heartbeat::from_handshake(handshake.ping_interval, handshake.ping_timeout);
                    if let Err(e) = send(transport, &Packet::Message(SocketPacket::Connect(None))) {
                        return failed(e.to_string(), *connected);
                    }
                }
                Packet::Ping => {
                    if let Err(e) = send(transport, &Packet::Pong) {
                        return failed(e.to_string(), *connected);
                    }
                }
                Packet::Pong | Packet::Noop | Packet::Message(SocketPacket::Ack) => {}
                Packet::Close => return failed("server closed the transport".to_string(), *connected),
                Packet::Message(SocketPacket::Connect(_)) => {
                    *connected = true;
                    self.set_state(ConnectionState::Connected);
                    info!("Push connection established");
                    if !self.emit(StreamEvent::Connected) {
                        return SessionEnd::Shutdown;
                    }
                }
                Packet::Message(SocketPacket::ConnectError(detail)) => {
                    return failed(format!("namespace connection refused: {}", detail), *connected);
                }
                Packet::Message(SocketPacket::Disconnect) => {
                    return SessionEnd::ServerDisconnect("io server disconnect".to_string());
                }
                Packet::Message(SocketPacket::Event { name, payload }) => {
                    if name != self.options.event_name {
                        debug!("Ignoring event {}", name);
                        continue;
                    }
                    let event = match batch_from_value(payload) {
                        Ok(batch) => StreamEvent::Ticks(batch),
                        Err(e) => {
                            warn!("Malformed {} payload: {}", name, e);
                            StreamEvent::ProtocolError(e.to_string())
                        }
                    };
                    if !self.emit(event) {
                        return SessionEnd::Shutdown;
                    }
                }
            }
        }
    }

    /// Block until an external trigger. `true` means reconnect, `false` means stop.
    fn wait_for_trigger(&self) -> bool {
        matches!(self.control.recv(), Ok(Control::Reconnect))
    }

    /// Forward an event; `false` once nobody listens any more.
    fn emit(&self, event: StreamEvent) -> bool {
        self.events.send(event).is_ok()
    }

    fn set_state(&self, next: ConnectionState) {
        match self.state.lock() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

fn send(transport: &mut dyn Transport, packet: &Packet) -> Result<()> {
    let frame = packet::encode(packet)?;
    transport.send(&frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Read;
    use std::net::TcpListener;
    use tick_common::{InstrumentId, SyncError};

    const OPEN: &str = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

    #[derive(Default)]
    struct Log {
        sent: Vec<String>,
        closes: usize,
        connects: usize,
    }

    /// Each `connect` pops the next script: `Err` fails the attempt, `Ok` yields
    /// a transport replaying the frames and then idling.
    struct ScriptedConnector {
        scripts: Mutex<VecDeque<std::result::Result<Vec<Incoming>, String>>>,
        log: Arc<Mutex<Log>>,
    }

    impl ScriptedConnector {
        fn new(scripts: Vec<std::result::Result<Vec<Incoming>, String>>) -> (Arc<Self>, Arc<Mutex<Log>>) {
            let log = Arc::new(Mutex::new(Log::default()));
            let connector = Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                log: Arc::clone(&log),
            });
            (connector, log)
        }
    }

    impl Connector for ScriptedConnector {
        fn connect(&self) -> Result<Box<dyn Transport>> {
            self.log.lock().unwrap().connects += 1;
            match self.scripts.lock().unwrap().pop_front() {
                Some(Ok(frames)) => Ok(Box::new(ScriptedTransport {
                    frames: frames.into(),
                    log: Arc::clone(&self.log),
                })),
                Some(Err(reason)) => Err(SyncError::Connection(reason)),
                None => Err(SyncError::Connection("connection refused".to_string())),
            }
        }
    }

    struct ScriptedTransport {
        frames: VecDeque<Incoming>,
        log: Arc<Mutex<Log>>,
    }

    impl Transport for ScriptedTransport {
        fn recv(&mut self) -> Result<Incoming> {
            match self.frames.pop_front() {
                Some(frame) => Ok(frame),
                None => {
                    thread::sleep(Duration::from_millis(2));
                    Ok(Incoming::Idle)
                }
            }
        }

        fn send(&mut self, frame: &str) -> Result<()> {
            self.log.lock().unwrap().sent.push(frame.to_string());
            Ok(())
        }

        fn close(&mut self) {
            self.log.lock().unwrap().closes += 1;
        }
    }

    fn text(frame: &str) -> Incoming {
        Incoming::Text(frame.to_string())
    }

    fn fast_options(max_attempts: u32) -> StreamOptions {
        StreamOptions {
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                jitter: 0.0,
            },
            ..StreamOptions::default()
        }
    }

    fn next(events: &Receiver<StreamEvent>) -> StreamEvent {
        events
            .recv_timeout(Duration::from_secs(5))
            .expect("expected a stream event")
    }

    fn wait_for_state(manager: &ConnectionManager, wanted: ConnectionState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.state() != wanted {
            assert!(Instant::now() < deadline, "state stuck at {:?}", manager.state());
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn joins_answers_pings_and_forwards_tick_batches() {
        let (connector, log) = ScriptedConnector::new(vec![Ok(vec![
            text(OPEN),
            text("40"),
            text("2"),
            text(r#"42["FromAPI",{"1":{"last_price":10,"net_change":1,"change":1.0}}]"#),
            text(r#"42["chat",{"hello":1}]"#),
        ])]);
        let (manager, events) = ConnectionManager::start(connector, fast_options(5)).unwrap();

        assert_eq!(next(&events), StreamEvent::Connecting { attempt: 1 });
        assert_eq!(next(&events), StreamEvent::Connected);
        let StreamEvent::Ticks(batch) = next(&events) else {
            panic!("expected ticks");
        };
        assert!(batch.contains_key(&InstrumentId::from("1")));
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.shutdown();
        manager.shutdown();
        assert!(manager.is_shut_down());

        let log = log.lock().unwrap();
        assert_eq!(log.sent, vec!["40", "3", "41"]);
        assert_eq!(log.closes, 1);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn malformed_frames_are_reported_without_dropping_the_connection() {
        let (connector, _log) = ScriptedConnector::new(vec![Ok(vec![
            text(OPEN),
            text("40"),
            text("42[oops"),
            text(r#"42["FromAPI",[1,2]]"#),
            text(r#"42["FromAPI",{"2":{"change":-1}}]"#),
        ])]);
        let (manager, events) = ConnectionManager::start(connector, fast_options(5)).unwrap();

        assert_eq!(next(&events), StreamEvent::Connecting { attempt: 1 });
        assert_eq!(next(&events), StreamEvent::Connected);
        assert!(matches!(next(&events), StreamEvent::ProtocolError(_)));
        assert!(matches!(next(&events), StreamEvent::ProtocolError(_)));
        assert!(matches!(next(&events), StreamEvent::Ticks(_)));
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[test]
    fn gives_up_after_the_retry_budget() {
        let (connector, log) = ScriptedConnector::new(vec![]);
        let (manager, events) = ConnectionManager::start(connector, fast_options(2)).unwrap();

        for attempt in 1..=3 {
            assert_eq!(next(&events), StreamEvent::Connecting { attempt });
            assert!(matches!(next(&events), StreamEvent::ConnectionError(_)));
        }
        assert_eq!(next(&events), StreamEvent::ReconnectExhausted { attempts: 2 });
        wait_for_state(&manager, ConnectionState::Failed);

        thread::sleep(Duration::from_millis(30));
        assert!(events.try_recv().is_err());
        assert_eq!(log.lock().unwrap().connects, 3);
    }

    #[test]
    fn external_trigger_restarts_after_exhaustion() {
        let (connector, _log) = ScriptedConnector::new(vec![
            Err("refused".to_string()),
            Ok(vec![text(OPEN), text("40")]),
        ]);
        let (manager, events) = ConnectionManager::start(connector, fast_options(0)).unwrap();

        assert_eq!(next(&events), StreamEvent::Connecting { attempt: 1 });
        assert!(matches!(next(&events), StreamEvent::ConnectionError(_)));
        assert_eq!(next(&events), StreamEvent::ReconnectExhausted { attempts: 0 });

        manager.reconnect();
        assert_eq!(next(&events), StreamEvent::Connecting { attempt: 1 });
        assert_eq!(next(&events), StreamEvent::Connected);
    }

    #[test]
    fn dropped_transport_reconnects_with_a_fresh_budget() {
        let (connector, log) = ScriptedConnector::new(vec![
            Ok(vec![text(OPEN), text("40"), Incoming::Closed(Some("1006".to_string()))]),
            Ok(vec![text(OPEN), text("40")]),
        ]);
        let (_manager, events) = ConnectionManager::start(connector, fast_options(1)).unwrap();

        assert_eq!(next(&events), StreamEvent::Connecting { attempt: 1 });
        assert_eq!(next(&events), StreamEvent::Connected);
        assert!(matches!(next(&events), StreamEvent::ConnectionError(_)));
        assert_eq!(next(&events), StreamEvent::Connecting { attempt: 2 });
        assert_eq!(next(&events), StreamEvent::Connected);
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn server_disconnect_is_terminal_until_triggered() {
        let (connector, log) = ScriptedConnector::new(vec![Ok(vec![text(OPEN), text("40"), text("41")])]);
        let (manager, events) = ConnectionManager::start(connector, fast_options(5)).unwrap();

        assert_eq!(next(&events), StreamEvent::Connecting { attempt: 1 });
        assert_eq!(next(&events), StreamEvent::Connected);
        assert!(matches!(next(&events), StreamEvent::Disconnected(_)));
        wait_for_state(&manager, ConnectionState::Disconnected);

        thread::sleep(Duration::from_millis(30));
        assert!(events.try_recv().is_err());
        assert_eq!(log.lock().unwrap().connects, 1);
    }

    #[test]
    fn missing_handshake_times_out() {
        let (connector, _log) = ScriptedConnector::new(vec![Ok(vec![])]);
        let options = StreamOptions {
            handshake_timeout: Duration::from_millis(20),
            ..fast_options(0)
        };
        let (_manager, events) = ConnectionManager::start(connector, options).unwrap();

        assert_eq!(next(&events), StreamEvent::Connecting { attempt: 1 });
        let StreamEvent::ConnectionError(reason) = next(&events) else {
            panic!("expected a connection error");
        };
        assert!(reason.contains("ping timeout"), "{}", reason);
    }

    #[test]
    fn silent_server_is_a_connection_error_and_shutdown_stays_prompt() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("ws://{}/socket.io/?EIO=4&transport=websocket", listener.local_addr().unwrap());
        thread::spawn(move || {
            let mut held = Vec::new();
            for mut stream in listener.incoming().flatten() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                held.push(stream);
            }
        });
        let connector = Arc::new(super::super::transport::WebSocketConnector::new(
            url,
            Duration::from_millis(10),
            Duration::from_millis(200),
        ));
        let (manager, events) = ConnectionManager::start(connector, fast_options(0)).unwrap();

        assert_eq!(next(&events), StreamEvent::Connecting { attempt: 1 });
        assert!(matches!(next(&events), StreamEvent::ConnectionError(_)));
        assert_eq!(next(&events), StreamEvent::ReconnectExhausted { attempts: 0 });

        manager.reconnect();
        assert_eq!(next(&events), StreamEvent::Connecting { attempt: 1 });
        let started = Instant::now();
        manager.shutdown();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(manager.is_shut_down());
    }
}
