//! Connection manager.
//!
//! A single actor task owns the [`ConnectionMachine`], the live client and
//! every timer. [`ConnectionManager`] is the cheap, cloneable handle the
//! rest of the crate uses: commands go in over an mpsc channel, state and
//! the current client come back through watch channels.

mod backoff;
mod machine;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use xorion_core::{ConnectionSettings, ConnectionState, ConnectionStatus};

use crate::deadline::{Deadline, with_deadline};
use crate::rpc::{ChainRpc, Connector};

pub use backoff::Backoff;
pub use machine::{Candidate, ConnectionMachine, MachineCommand, MachineEvent};

/// The client currently in use, tagged so readers can tell whether it was
/// replaced while they were working with it.
#[derive(Clone)]
pub struct LiveClient {
    pub id: u64,
    pub rpc: Arc<dyn ChainRpc>,
}

enum Command {
    Connect {
        endpoint: Option<String>,
        reply: oneshot::Sender<ConnectionState>,
    },
    Disconnect {
        /// Receives the endpoint of the last live client.
        reply: oneshot::Sender<Option<String>>,
    },
}

/// Handle to the connection actor.
#[derive(Clone)]
pub struct ConnectionManager {
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    client_rx: watch::Receiver<Option<LiveClient>>,
    reconnect_pause: Duration,
}

impl ConnectionManager {
    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(
        endpoints: Vec<String>,
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());
        let (client_tx, client_rx) = watch::channel(None);

        let actor = ConnectionActor {
            machine: ConnectionMachine::new(endpoints, &settings),
            connector,
            connect_timeout: settings.connect_timeout(),
            probe_interval: settings.health_check_interval(),
            command_rx,
            state_tx,
            client_tx,
            attempt: None,
            probe: None,
            reconnect_timer: None,
            health: None,
            waiters: Vec::new(),
            next_client_id: 1,
        };
        tokio::spawn(actor.run());

        Self {
            command_tx,
            state_rx,
            client_rx,
            reconnect_pause: settings.reconnect_pause(),
        }
    }

    /// Connect, preferring `endpoint` if given. Resolves once the attempt
    /// cycle settles; a call made while already connecting returns at once.
    pub async fn connect(&self, endpoint: Option<&str>) -> ConnectionState {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = Command::Connect {
            endpoint: endpoint.map(str::to_string),
            reply: reply_tx,
        };
        if self.command_tx.send(command).await.is_err() {
            tracing::error!("Connection actor is gone");
            return self.state();
        }
        reply_rx.await.unwrap_or_else(|_| self.state())
    }

    /// Close the client and cancel timers and in-flight work.
    pub async fn disconnect(&self) {
        self.disconnect_inner().await;
    }

    async fn disconnect_inner(&self) -> Option<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::Disconnect { reply: reply_tx })
            .await
            .is_err()
        {
            return None;
        }
        reply_rx.await.ok().flatten()
    }

    /// Disconnect, pause briefly, then connect to the last endpoint.
    pub async fn reconnect(&self) -> ConnectionState {
        let last = self.disconnect_inner().await;
        tokio::time::sleep(self.reconnect_pause).await;
        self.connect(last.as_deref()).await
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state_rx.borrow().status
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// The live client, if any. Read this per request; never cache it.
    pub fn client(&self) -> Option<LiveClient> {
        self.client_rx.borrow().clone()
    }

    /// Whether `id` still names the live client.
    pub fn is_current(&self, id: u64) -> bool {
        self.client_rx
            .borrow()
            .as_ref()
            .is_some_and(|live| live.id == id)
    }
}

enum AttemptOutcome {
    Connected {
        client: Arc<dyn ChainRpc>,
        candidate: Candidate,
    },
    Failed(String),
}

struct ConnectionActor {
    machine: ConnectionMachine,
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    probe_interval: Duration,
    command_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    client_tx: watch::Sender<Option<LiveClient>>,
    attempt: Option<BoxFuture<'static, AttemptOutcome>>,
    probe: Option<BoxFuture<'static, Result<Duration, String>>>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    health: Option<Interval>,
    waiters: Vec<oneshot::Sender<ConnectionState>>,
    next_client_id: u64,
}

async fn next_of<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    match slot.as_mut() {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn close_in_background(client: Arc<dyn ChainRpc>) {
    tokio::spawn(async move {
        client.close().await;
    });
}

impl ConnectionActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                outcome = next_of(&mut self.attempt) => {
                    self.attempt = None;
                    self.on_attempt(outcome);
                }
                result = next_of(&mut self.probe) => {
                    self.probe = None;
                    self.on_probe(result);
                }
                () = fire(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    tracing::info!("Reconnect timer fired");
                    self.apply(MachineEvent::ReconnectTimerFired, None);
                }
                () = tick(&mut self.health) => self.start_probe(),
            }
        }

        self.tear_down();
        tracing::debug!("Connection actor stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect { endpoint, reply } => {
                if self.machine.status() == ConnectionStatus::Connecting {
                    tracing::debug!("Connect requested while already connecting; ignoring");
                    let _ = reply.send(self.machine.state().clone());
                    return;
                }
                self.apply(MachineEvent::ConnectRequested { endpoint }, None);
                if self.machine.status() == ConnectionStatus::Connecting {
                    self.waiters.push(reply);
                } else {
                    let _ = reply.send(self.machine.state().clone());
                }
            }
            Command::Disconnect { reply } => {
                tracing::info!("Disconnecting");
                self.apply(MachineEvent::DisconnectRequested, None);
                let _ = reply.send(self.machine.last_endpoint().map(str::to_string));
            }
        }
    }

    fn on_attempt(&mut self, outcome: AttemptOutcome) {
        match outcome {
            AttemptOutcome::Connected { client, candidate } => {
                let event = MachineEvent::Connected {
                    endpoint: candidate.endpoint,
                    list_index: candidate.list_index,
                    at_ms: xorion_core::now_ms(),
                };
                self.apply(event, Some(client));
            }
            AttemptOutcome::Failed(error) => {
                tracing::warn!("Connection attempt failed: {}", error);
                self.apply(MachineEvent::AttemptFailed { error }, None);
            }
        }
    }

    fn on_probe(&mut self, result: Result<Duration, String>) {
        match result {
            Ok(latency) => {
                tracing::debug!("Health check ok in {:?}", latency);
                self.apply(MachineEvent::ProbeSucceeded { latency }, None);
            }
            Err(error) => {
                tracing::warn!("Health check failed: {}", error);
                self.apply(MachineEvent::ProbeFailed { error }, None);
            }
        }
    }

    /// Feed an event to the machine and carry out what it asks for.
    fn apply(&mut self, event: MachineEvent, mut fresh: Option<Arc<dyn ChainRpc>>) {
        for command in self.machine.handle(event) {
            match command {
                MachineCommand::TearDown => self.tear_down(),
                MachineCommand::StartAttempt(candidates) => {
                    self.attempt = Some(attempt_cycle(
                        Arc::clone(&self.connector),
                        candidates,
                        self.connect_timeout,
                    ));
                }
                MachineCommand::InstallClient => {
                    if let Some(rpc) = fresh.take() {
                        self.install(rpc);
                    }
                }
                MachineCommand::DiscardClient => {
                    if let Some(rpc) = fresh.take() {
                        tracing::debug!("Discarding late client for {}", rpc.endpoint());
                        close_in_background(rpc);
                    }
                }
                MachineCommand::ScheduleReconnect(delay) => {
                    tracing::info!("Reconnecting in {:?}", delay);
                    self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
                }
            }
        }
        if let Some(rpc) = fresh {
            close_in_background(rpc);
        }
        self.publish();
    }

    fn install(&mut self, rpc: Arc<dyn ChainRpc>) {
        let id = self.next_client_id;
        self.next_client_id += 1;
        tracing::info!("Connected via {}", rpc.endpoint());

        if let Some(old) = self.client_tx.send_replace(Some(LiveClient { id, rpc })) {
            close_in_background(old.rpc);
        }

        let mut interval =
            tokio::time::interval_at(Instant::now() + self.probe_interval, self.probe_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.health = Some(interval);
    }

    fn tear_down(&mut self) {
        self.attempt = None;
        self.probe = None;
        self.reconnect_timer = None;
        self.health = None;
        if let Some(old) = self.client_tx.send_replace(None) {
            close_in_background(old.rpc);
        }
    }

    fn start_probe(&mut self) {
        if self.probe.is_some() {
            return;
        }
        let Some(live) = self.client_tx.borrow().clone() else {
            return;
        };
        // A probe that outlasts the interval counts as failed.
        let limit = self.probe_interval;
        self.probe = Some(Box::pin(async move {
            let started = Instant::now();
            match with_deadline(limit, live.rpc.ping()).await {
                Deadline::Completed(Ok(())) => Ok(started.elapsed()),
                Deadline::Completed(Err(e)) => Err(e.to_string()),
                Deadline::TimedOut => Err(format!("Health check timed out after {:?}", limit)),
            }
        }));
    }

    fn publish(&mut self) {
        let state = self.machine.state().clone();
        if state.status != ConnectionStatus::Connecting {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(state.clone());
            }
        }
        self.state_tx.send_replace(state);
    }
}

/// Try each candidate in order, each bounded by `limit`.
fn attempt_cycle(
    connector: Arc<dyn Connector>,
    candidates: Vec<Candidate>,
    limit: Duration,
) -> BoxFuture<'static, AttemptOutcome> {
    Box::pin(async move {
        if candidates.is_empty() {
            return AttemptOutcome::Failed("No RPC endpoints configured".to_string());
        }

        let mut last_error = None;
        for candidate in candidates {
            tracing::info!("Trying {}", candidate.endpoint);
            match with_deadline(limit, connector.connect(&candidate.endpoint)).await {
                Deadline::Completed(Ok(client)) => {
                    return AttemptOutcome::Connected { client, candidate };
                }
                Deadline::Completed(Err(e)) => {
                    tracing::warn!("Failed to connect to {}: {}", candidate.endpoint, e);
                    last_error = Some(e.to_string());
                }
                Deadline::TimedOut => {
                    tracing::warn!("Connecting to {} timed out", candidate.endpoint);
                    last_error = Some(format!(
                        "Connection to {} timed out after {:?}",
                        candidate.endpoint, limit
                    ));
                }
            }
        }

        AttemptOutcome::Failed(last_error.unwrap_or_else(|| "All endpoints failed".to_string()))
    })
}
