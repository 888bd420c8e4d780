//! Polling session: keeps a local picture of one daemon up to date.
//!
//! The session runs as a single task that owns every piece of mutable state.
//! Public calls become [`Command`]s; scheduler ticks and request completions
//! come back as [`Internal`] messages, so state is only ever touched from
//! that one task.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::IntervalConfig;
use crate::scheduler::BackoffScheduler;
use crate::types::{FailureKind, MonitorError};

use super::api::{ConnectionsResponse, FolderConfig, FolderStatus, SystemConfig};
use super::core::{DaemonApi, Endpoint, RequestOutcome, RequestSlot, Ticket};
use super::events::SessionEvent;
use super::models::{
    ConnectionState, Folder, FolderChange, FolderView, ThroughputClassifier, ThroughputReading,
    TotalsSample,
};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub minimum: Duration,
    pub maximum: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        let (minimum, maximum) = IntervalConfig::normal().bounds();
        Self { minimum, maximum }
    }
}

/// Point-in-time copy of the session state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub uri: Option<String>,
    pub has_api_key: bool,
    pub connection: ConnectionState,
    pub throughput: ThroughputReading,
    /// Sorted by folder id.
    pub folders: Vec<FolderView>,
    pub polling: bool,
    pub interval: (Duration, Duration),
    pub pending_requests: usize,
}

enum Command {
    SetParameters {
        uri: Option<String>,
        api_key: Option<String>,
    },
    Start,
    Stop,
    Update,
    SetUpdateInterval {
        minimum: Duration,
        maximum: Duration,
    },
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

enum Internal {
    Tick,
    Config {
        ticket: Ticket,
        outcome: RequestOutcome<SystemConfig>,
    },
    Connections {
        ticket: Ticket,
        outcome: RequestOutcome<ConnectionsResponse>,
    },
    FolderStatus {
        id: String,
        ticket: Ticket,
        outcome: RequestOutcome<FolderStatus>,
    },
}

/// Handle to a running session. Cheap to clone; the session stops once every
/// handle is dropped or [`Session::shutdown`] is called.
#[derive(Clone)]
pub struct Session {
    commands: mpsc::UnboundedSender<Command>,
}

impl Session {
    /// Spawns the session task. It starts without parameters and disarmed.
    pub fn spawn<A: DaemonApi>(
        api: Arc<A>,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let actor = SessionActor::new(api, options, events_tx, internal_tx);
        tokio::spawn(actor.run(commands_rx, internal_rx));

        (
            Self {
                commands: commands_tx,
            },
            events_rx,
        )
    }

    /// Replaces the daemon address and key. Outstanding requests are
    /// cancelled and the session counts as disconnected until the next
    /// successful poll. The polling interval is left alone.
    pub fn set_parameters(&self, uri: Option<String>, api_key: Option<String>) {
        self.send(Command::SetParameters { uri, api_key });
    }

    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Stops polling, cancels outstanding requests and removes every folder.
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Runs one poll cycle now, independent of the scheduler.
    pub fn update(&self) {
        self.send(Command::Update);
    }

    pub fn set_update_interval(&self, minimum: Duration, maximum: Duration) {
        self.send(Command::SetUpdateInterval { minimum, maximum });
    }

    /// `None` once the session has shut down.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx));
        rx.await.ok()
    }

    /// Cancels all outstanding work and ends the session task.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx));
        let _ = rx.await;
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Session already shut down, dropping command");
        }
    }
}

struct SessionActor<A: DaemonApi> {
    api: Arc<A>,
    endpoint: Option<Endpoint>,
    connection: ConnectionState,
    throughput: ThroughputReading,
    classifier: ThroughputClassifier,
    folders: BTreeMap<String, Folder>,
    config_request: RequestSlot,
    connections_request: RequestSlot,
    scheduler: BackoffScheduler,
    events: mpsc::UnboundedSender<SessionEvent>,
    internal: mpsc::UnboundedSender<Internal>,
    next_ticket: Ticket,
}

impl<A: DaemonApi> SessionActor<A> {
    fn new(
        api: Arc<A>,
        options: SessionOptions,
        events: mpsc::UnboundedSender<SessionEvent>,
        internal: mpsc::UnboundedSender<Internal>,
    ) -> Self {
        let tick = internal.clone();
        let scheduler = BackoffScheduler::new(options.minimum, options.maximum, move || {
            let _ = tick.send(Internal::Tick);
        });
        Self {
            api,
            endpoint: None,
            connection: ConnectionState::Disconnected,
            throughput: ThroughputReading::IDLE,
            classifier: ThroughputClassifier::new(options.maximum),
            folders: BTreeMap::new(),
            config_request: RequestSlot::default(),
            connections_request: RequestSlot::default(),
            scheduler,
            events,
            internal,
            next_ticket: 0,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown(ack)) => {
                        self.shutdown();
                        let _ = ack.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some(message) = internal.recv() => self.handle_internal(message),
            }
        }
        debug!("Session task finished");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetParameters { uri, api_key } => self.set_parameters(uri, api_key),
            Command::Start => {
                info!("Starting daemon polling");
                self.scheduler.start();
            }
            Command::Stop => self.stop(),
            Command::Update => self.poll(),
            Command::SetUpdateInterval { minimum, maximum } => {
                debug!(
                    minimum_secs = minimum.as_secs(),
                    maximum_secs = maximum.as_secs(),
                    "Changing update interval"
                );
                self.scheduler.change_interval(minimum, maximum);
                let (_, maximum) = self.scheduler.bounds();
                self.classifier.set_max_interval(maximum);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown(_) => {}
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            // A tick can still be queued when polling is stopped.
            Internal::Tick if self.scheduler.is_armed() => self.poll(),
            Internal::Tick => debug!("Polling stopped, dropping queued tick"),
            Internal::Config { ticket, outcome } => self.on_config(ticket, outcome),
            Internal::Connections { ticket, outcome } => self.on_connections(ticket, outcome),
            Internal::FolderStatus {
                id,
                ticket,
                outcome,
            } => self.on_folder_status(id, ticket, outcome),
        }
    }

    fn set_parameters(&mut self, uri: Option<String>, api_key: Option<String>) {
        self.cancel_requests();
        self.endpoint = uri
            .filter(|uri| !uri.trim().is_empty())
            .map(|uri| Endpoint::new(uri, api_key));
        match &self.endpoint {
            Some(endpoint) => info!(
                uri = %endpoint.uri(),
                api_key = endpoint.api_key().is_some(),
                "Daemon parameters changed"
            ),
            None => info!("Daemon parameters cleared"),
        }
        self.set_connection(ConnectionState::Disconnected);
        self.classifier.reset();
        self.set_throughput(ThroughputReading::IDLE);
    }

    fn stop(&mut self) {
        info!("Stopping daemon polling");
        self.scheduler.stop();
        self.cancel_requests();
        self.remove_all_folders();
    }

    fn shutdown(&mut self) {
        self.scheduler.stop();
        self.cancel_requests();
        self.folders.clear();
    }

    fn poll(&mut self) {
        let Some(endpoint) = self.endpoint.clone() else {
            debug!("No daemon URI set, skipping poll");
            return;
        };
        let ticket = self.ticket();
        let api = Arc::clone(&self.api);
        let internal = self.internal.clone();
        debug!(uri = %endpoint.uri(), ticket, "Requesting daemon configuration");
        self.config_request.issue(
            ticket,
            async move { api.system_config(&endpoint).await },
            move |outcome| {
                let _ = internal.send(Internal::Config { ticket, outcome });
            },
        );
    }

    fn on_config(&mut self, ticket: Ticket, outcome: RequestOutcome<SystemConfig>) {
        if !self.config_request.settle(ticket) {
            debug!(ticket, "Discarding superseded configuration response");
            return;
        }
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        match outcome {
            RequestOutcome::Cancelled => {}
            RequestOutcome::Completed(Err(err)) => {
                log_failure("configuration", &endpoint, &err);
                self.set_connection(ConnectionState::Disconnected);
                self.remove_all_folders();
            }
            RequestOutcome::Completed(Ok(config)) => {
                self.set_connection(ConnectionState::Connected);
                let order = self.reconcile(config.folders);
                for id in &order {
                    self.poll_folder(id, &endpoint);
                }
                self.poll_connections(endpoint);
            }
        }
    }

    /// Brings the folder map in line with `configs` and returns the folder
    /// ids in configuration order.
    fn reconcile(&mut self, configs: Vec<FolderConfig>) -> Vec<String> {
        let mut seen = HashSet::new();
        let configs: Vec<FolderConfig> = configs
            .into_iter()
            .filter(|config| {
                if config.id.is_empty() {
                    warn!("Ignoring folder without id");
                    return false;
                }
                if !seen.insert(config.id.clone()) {
                    warn!(folder = %config.id, "Duplicate folder id in configuration");
                    return false;
                }
                true
            })
            .collect();

        let removed: Vec<String> = self
            .folders
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for id in removed {
            self.remove_folder(&id);
        }

        let mut order = Vec::with_capacity(configs.len());
        for config in &configs {
            match self.folders.get_mut(&config.id) {
                Some(folder) => {
                    let changes = folder.apply_config(config);
                    self.emit_folder_changes(&config.id, changes);
                }
                None => {
                    debug!(folder = %config.id, "Folder added");
                    let folder = Folder::new(config);
                    self.emit(SessionEvent::FolderAdded(folder.handle()));
                    self.folders.insert(config.id.clone(), folder);
                }
            }
            order.push(config.id.clone());
        }
        order
    }

    fn poll_folder(&mut self, id: &str, endpoint: &Endpoint) {
        let ticket = self.ticket();
        let Some(folder) = self.folders.get_mut(id) else {
            return;
        };
        let api = Arc::clone(&self.api);
        let endpoint = endpoint.clone();
        let internal = self.internal.clone();
        let folder_id = id.to_string();
        let reply_id = folder_id.clone();
        folder.poll_status(
            ticket,
            async move { api.folder_status(&endpoint, &folder_id).await },
            move |outcome| {
                let _ = internal.send(Internal::FolderStatus {
                    id: reply_id,
                    ticket,
                    outcome,
                });
            },
        );
    }

    fn on_folder_status(&mut self, id: String, ticket: Ticket, outcome: RequestOutcome<FolderStatus>) {
        let Some(folder) = self.folders.get_mut(&id) else {
            debug!(folder = %id, "Discarding status of removed folder");
            return;
        };
        if !folder.settle(ticket) {
            debug!(folder = %id, ticket, "Discarding superseded folder status");
            return;
        }
        let changes = match outcome {
            RequestOutcome::Cancelled => return,
            RequestOutcome::Completed(Ok(status)) => {
                folder.apply_status(&status).into_iter().collect()
            }
            RequestOutcome::Completed(Err(err)) => {
                if let Some(endpoint) = &self.endpoint {
                    log_failure("folder status", endpoint, &err);
                }
                folder.mark_unknown()
            }
        };
        self.emit_folder_changes(&id, changes);
    }

    fn poll_connections(&mut self, endpoint: Endpoint) {
        let ticket = self.ticket();
        let api = Arc::clone(&self.api);
        let internal = self.internal.clone();
        self.connections_request.issue(
            ticket,
            async move { api.connections(&endpoint).await },
            move |outcome| {
                let _ = internal.send(Internal::Connections { ticket, outcome });
            },
        );
    }

    fn on_connections(&mut self, ticket: Ticket, outcome: RequestOutcome<ConnectionsResponse>) {
        if !self.connections_request.settle(ticket) {
            debug!(ticket, "Discarding superseded connections response");
            return;
        }
        match outcome {
            RequestOutcome::Cancelled => {}
            RequestOutcome::Completed(Ok(response)) => {
                let reading = self.classifier.push(TotalsSample::from(&response.total));
                self.set_throughput(reading);
            }
            RequestOutcome::Completed(Err(err)) => {
                if let Some(endpoint) = &self.endpoint {
                    log_failure("connections", endpoint, &err);
                }
                self.set_throughput(ThroughputReading::IDLE);
            }
        }
    }

    fn cancel_requests(&mut self) {
        self.config_request.cancel();
        self.connections_request.cancel();
        for folder in self.folders.values_mut() {
            folder.cancel();
        }
    }

    fn remove_folder(&mut self, id: &str) {
        if let Some(mut folder) = self.folders.remove(id) {
            debug!(folder = %id, "Folder removed");
            folder.cancel();
            self.emit(SessionEvent::FolderRemoved(folder.view().clone()));
        }
    }

    fn remove_all_folders(&mut self) {
        let ids: Vec<String> = self.folders.keys().cloned().collect();
        for id in ids {
            self.remove_folder(&id);
        }
    }

    fn set_connection(&mut self, state: ConnectionState) {
        if self.connection == state {
            return;
        }
        info!(state = state.as_str(), "Daemon connection changed");
        self.connection = state;
        self.emit(SessionEvent::ConnectionStateChanged(state));
    }

    fn set_throughput(&mut self, reading: ThroughputReading) {
        let previous = self.throughput.state;
        self.throughput = reading;
        if previous != reading.state {
            debug!(
                state = reading.state.as_str(),
                in_rate = reading.in_rate,
                out_rate = reading.out_rate,
                "Throughput changed"
            );
            self.emit(SessionEvent::ThroughputStateChanged(reading.state));
        }
    }

    fn emit_folder_changes(&self, id: &str, changes: Vec<FolderChange>) {
        for change in changes {
            let event = match change {
                FolderChange::Label(label) => SessionEvent::FolderLabelChanged {
                    id: id.to_string(),
                    label,
                },
                FolderChange::Path(path) => SessionEvent::FolderPathChanged {
                    id: id.to_string(),
                    path,
                },
                FolderChange::State { state, percent } => SessionEvent::FolderStateChanged {
                    id: id.to_string(),
                    state,
                    percent,
                },
            };
            self.emit(event);
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn snapshot(&self) -> SessionSnapshot {
        let pending_requests = usize::from(self.config_request.is_pending())
            + usize::from(self.connections_request.is_pending())
            + self.folders.values().filter(|folder| folder.is_pending()).count();
        SessionSnapshot {
            uri: self.endpoint.as_ref().map(|endpoint| endpoint.uri().to_string()),
            has_api_key: self
                .endpoint
                .as_ref()
                .and_then(Endpoint::api_key)
                .is_some(),
            connection: self.connection,
            throughput: self.throughput,
            folders: self.folders.values().map(|folder| folder.view().clone()).collect(),
            polling: self.scheduler.is_armed(),
            interval: self.scheduler.bounds(),
            pending_requests,
        }
    }
}

fn log_failure(request: &str, endpoint: &Endpoint, err: &MonitorError) {
    let uri = endpoint.uri();
    match err.kind() {
        FailureKind::Tls => {
            warn!(request, uri = %uri, error = %err, "TLS connection to Syncthing failed")
        }
        FailureKind::Csrf => {
            warn!(request, uri = %uri, "Syncthing rejected the API key (CSRF error)")
        }
        FailureKind::Status => {
            warn!(request, uri = %uri, error = %err, "Syncthing returned an error status")
        }
        FailureKind::Protocol => {
            warn!(request, uri = %uri, error = %err, "Unexpected response from Syncthing")
        }
        FailureKind::Transport | FailureKind::Local => {
            warn!(request, uri = %uri, error = %err, "Syncthing request failed")
        }
    }
}
