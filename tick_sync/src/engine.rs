//! `TickSync`: the service object wiring the pipeline together.
//!
//! All state (interest registry, channel stores, connection health, subscribers) is
//! owned by one event thread running `TickSync::run`. It multiplexes three inputs
//! with crossbeam `select!`:
//!
//! - commands from any number of `SyncHandle`s,
//! - completions of the configuration and snapshot fetches, which run on
//!   short-lived worker threads so the loop itself never blocks on the network,
//! - events from the push connection worker.
//!
//! Classification and merging of one batch run to completion inside one loop
//! iteration, so views never see a half-applied merge.
//!
//! Startup order: configuration fetch, then (whether it succeeded or not) the push
//! connection and, if some channel has interests, the one-shot snapshot fetch.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, never, select, unbounded};
use log::{debug, error, info, warn};
use tick_common::{Channel, Result, SyncError, TickBatch};

use crate::classifier::classify;
use crate::config::SyncConfig;
use crate::connection::{ConnectionHealth, ConnectionManager, Connector, StreamEvent};
use crate::interest::InterestRegistry;
use crate::observer::{Notification, Observers};
use crate::snapshot::{SnapshotLoader, fetch_snapshot};
use crate::source::TickSource;
use crate::storage::StateStorage;
use crate::store::{ChannelState, MergeOutcome, ReconciliationStore};

enum Command {
    Subscribe(Sender<Notification>),
    ReloadInterests,
    Reconnect,
    Shutdown,
}

enum FetchDone {
    Interests {
        result: Result<InterestRegistry>,
        reload: bool,
    },
    Snapshot(Result<TickBatch>),
}

/// Cloneable remote control of a running `TickSync`.
#[derive(Clone)]
pub struct SyncHandle {
    commands: Sender<Command>,
}

impl SyncHandle {
    /// Subscribe a view. The receiver first gets every channel's current state and
    /// the current health, then every change.
    pub fn subscribe(&self) -> Result<Receiver<Notification>> {
        let (tx, rx) = unbounded();
        self.send(Command::Subscribe(tx))?;
        Ok(rx)
    }

    /// Fetch the configuration again and replace the interest sets.
    pub fn reload_interests(&self) -> Result<()> {
        self.send(Command::ReloadInterests)
    }

    /// Restart the push connection with a fresh retry budget.
    pub fn reconnect(&self) -> Result<()> {
        self.send(Command::Reconnect)
    }

    /// Stop the engine. Calling it again, or after the engine stopped, does nothing.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::ChannelSend("tick sync engine has stopped".to_string()))
    }
}

/// The tick synchronization engine.
pub struct TickSync {
    config: SyncConfig,
    source: Arc<dyn TickSource>,
    connector: Arc<dyn Connector>,
    registry: InterestRegistry,
    stores: BTreeMap<Channel, ReconciliationStore>,
    snapshot_loader: SnapshotLoader,
    connection: Option<ConnectionManager>,
    stream_rx: Receiver<StreamEvent>,
    health: ConnectionHealth,
    observers: Observers,
    commands_tx: Sender<Command>,
    commands_rx: Receiver<Command>,
    fetch_tx: Sender<FetchDone>,
    fetch_rx: Receiver<FetchDone>,
    interests_loaded: bool,
    torn_down: bool,
}

impl TickSync {
    /// Build the engine and recover every channel's persisted state.
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn TickSource>,
        storage: Arc<dyn StateStorage>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let stores = Channel::ALL
            .iter()
            .map(|&channel| (channel, ReconciliationStore::open(channel, Arc::clone(&storage))))
            .collect();
        let (commands_tx, commands_rx) = unbounded();
        let (fetch_tx, fetch_rx) = unbounded();

        Self {
            config,
            source,
            connector,
            registry: InterestRegistry::empty(),
            stores,
            snapshot_loader: SnapshotLoader::new(),
            connection: None,
            stream_rx: never(),
            health: ConnectionHealth::Connecting,
            observers: Observers::new(),
            commands_tx,
            commands_rx,
            fetch_tx,
            fetch_rx,
            interests_loaded: false,
            torn_down: false,
        }
    }

    /// A handle for controlling the engine once `run` owns it.
    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            commands: self.commands_tx.clone(),
        }
    }

    /// Subscribe a view before the engine starts running.
    pub fn subscribe(&mut self) -> Receiver<Notification> {
        let (tx, rx) = unbounded();
        self.add_subscriber(tx);
        rx
    }

    /// Current state of `channel`.
    pub fn snapshot(&self, channel: Channel) -> Arc<ChannelState> {
        self.stores
            .get(&channel)
            .map(ReconciliationStore::snapshot)
            .unwrap_or_default()
    }

    /// Current connection health.
    pub fn health(&self) -> &ConnectionHealth {
        &self.health
    }

    /// Current interest registry.
    pub fn registry(&self) -> &InterestRegistry {
        &self.registry
    }

    /// Run the event loop until a handle requests shutdown.
    pub fn run(mut self) {
        info!("Tick sync starting against {}", self.config.server_url);
        let commands = self.commands_rx.clone();
        let fetches = self.fetch_rx.clone();

        self.spawn_interest_fetch(false);
        loop {
            let stream = self.stream_rx.clone();
            select! {
                recv(commands) -> msg => match msg {
                    Ok(Command::Subscribe(tx)) => self.add_subscriber(tx),
                    Ok(Command::ReloadInterests) => self.spawn_interest_fetch(true),
                    Ok(Command::Reconnect) => self.reconnect(),
                    Ok(Command::Shutdown) | Err(_) => break,
                },
                recv(fetches) -> msg => match msg {
                    Ok(FetchDone::Interests { result, reload }) => self.apply_interests(result, reload),
                    Ok(FetchDone::Snapshot(result)) => self.apply_snapshot(result),
                    Err(_) => break,
                },
                recv(stream) -> msg => match msg {
                    Ok(event) => self.apply_stream_event(event),
                    Err(_) => {
                        debug!("Connection worker hung up");
                        self.stream_rx = never();
                    }
                },
            }
        }
        self.teardown();
    }

    /// Install a freshly fetched registry, or report why it could not be fetched.
    ///
    /// On success every channel drops records it is no longer interested in. A
    /// failed reload keeps the previous registry. The first call, successful or not,
    /// starts the push connection.
    pub fn apply_interests(&mut self, result: Result<InterestRegistry>, reload: bool) {
        if self.torn_down {
            debug!("Ignoring interests fetched after teardown");
            return;
        }
        match result {
            Ok(registry) => {
                self.registry = registry;
                let pruned: Vec<(Channel, MergeOutcome)> = self
                    .stores
                    .iter_mut()
                    .map(|(&channel, store)| (channel, store.retain(&self.registry.interests(channel))))
                    .collect();
                for (channel, outcome) in pruned {
                    self.publish_outcome(channel, outcome);
                }
            }
            Err(e) if reload => {
                warn!("Interest reload failed, keeping the current interests: {}", e);
                self.observers.report(e);
            }
            Err(e) => {
                error!("Interest load failed, every channel stays empty: {}", e);
                self.observers.report(e);
            }
        }

        if !self.interests_loaded {
            self.interests_loaded = true;
            self.start_connection();
        }
        if self.snapshot_loader.try_begin(&self.registry) {
            self.spawn_snapshot_fetch();
        }
    }

    /// Seed the channels from the snapshot, or report its failure.
    pub fn apply_snapshot(&mut self, result: Result<TickBatch>) {
        if self.torn_down {
            debug!("Ignoring snapshot fetched after teardown");
            return;
        }
        match self.snapshot_loader.finish(result) {
            Ok(Some(batch)) => self.ingest(&batch),
            Ok(None) => {}
            Err(e) => self.observers.report(e),
        }
    }

    /// React to one event of the push connection.
    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        if self.torn_down {
            return;
        }
        if let Some(next) = self.health.after(&event) {
            info!("Connection health: {}", next);
            self.health = next.clone();
            self.observers.publish(Notification::HealthChanged(next));
        }
        match event {
            StreamEvent::Ticks(batch) => self.ingest(&batch),
            StreamEvent::ConnectionError(reason) => self.observers.report(SyncError::Connection(reason)),
            StreamEvent::ProtocolError(reason) => self.observers.report(SyncError::Protocol(reason)),
            StreamEvent::Connecting { .. }
            | StreamEvent::Connected
            | StreamEvent::Disconnected(_)
            | StreamEvent::ReconnectExhausted { .. } => {}
        }
    }

    /// Classify `batch` and merge each channel's share into its store.
    pub fn ingest(&mut self, batch: &TickBatch) {
        let classified = classify(batch, &self.registry);
        for (channel, subset) in classified {
            let Some(store) = self.stores.get_mut(&channel) else {
                continue;
            };
            let outcome = store.merge(&subset);
            self.publish_outcome(channel, outcome);
        }
    }

    fn publish_outcome(&mut self, channel: Channel, outcome: MergeOutcome) {
        if outcome.changed {
            let snapshot = self.snapshot(channel);
            self.observers
                .publish(Notification::ChannelChanged { channel, snapshot });
        }
        if let Some(e) = outcome.storage_error {
            self.observers.report(e);
        }
    }

    fn add_subscriber(&mut self, tx: Sender<Notification>) {
        let mut initial: Vec<Notification> = self
            .stores
            .iter()
            .map(|(&channel, store)| Notification::ChannelChanged {
                channel,
                snapshot: store.snapshot(),
            })
            .collect();
        initial.push(Notification::HealthChanged(self.health.clone()));
        self.observers.subscribe(tx, initial);
    }

    fn start_connection(&mut self) {
        match ConnectionManager::start(Arc::clone(&self.connector), self.config.stream_options()) {
            Ok((manager, events)) => {
                self.connection = Some(manager);
                self.stream_rx = events;
            }
            Err(e) => {
                error!("Could not start the push connection: {}", e);
                self.health = ConnectionHealth::Degraded {
                    last_error: e.to_string(),
                    terminal: true,
                };
                self.observers
                    .publish(Notification::HealthChanged(self.health.clone()));
                self.observers.report(e);
            }
        }
    }

    fn reconnect(&mut self) {
        match &self.connection {
            Some(connection) => connection.reconnect(),
            None if self.interests_loaded => self.start_connection(),
            None => debug!("Reconnect ignored: the connection has not started yet"),
        }
    }

    fn spawn_interest_fetch(&mut self, reload: bool) {
        let source = Arc::clone(&self.source);
        let done = self.fetch_tx.clone();
        self.spawn_fetch("tick-config", move || {
            let result = InterestRegistry::load(source.as_ref());
            let _ = done.send(FetchDone::Interests { result, reload });
        });
    }

    fn spawn_snapshot_fetch(&mut self) {
        let source = Arc::clone(&self.source);
        let done = self.fetch_tx.clone();
        self.spawn_fetch("tick-snapshot", move || {
            let _ = done.send(FetchDone::Snapshot(fetch_snapshot(source.as_ref())));
        });
    }

    fn spawn_fetch(&mut self, name: &str, job: impl FnOnce() + Send + 'static) {
        if let Err(e) = thread::Builder::new().name(name.to_string()).spawn(job) {
            error!("Could not spawn {} worker: {}", name, e);
            self.observers.report(SyncError::Io(e));
        }
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Some(connection) = self.connection.take() {
            connection.shutdown();
        }
        self.stream_rx = never();
        self.observers.clear();
        info!("Tick sync stopped");
    }
}

impl Drop for TickSync {
    fn drop(&mut self) {
        self.teardown();
    }
}
