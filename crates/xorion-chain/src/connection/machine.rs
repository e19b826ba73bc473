//! Connection lifecycle as a pure state machine.
//!
//! The machine owns the [`ConnectionState`] and decides what should happen
//! next; it never touches the network or the clock. The actor in
//! `connection/mod.rs` feeds it events and carries out the commands.

use std::time::Duration;

use xorion_core::{ConnectionSettings, ConnectionState, ConnectionStatus};

use super::backoff::Backoff;

/// Something that happened to the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineEvent {
    ConnectRequested { endpoint: Option<String> },
    /// An attempt cycle produced a client for `endpoint`.
    Connected {
        endpoint: String,
        list_index: Option<usize>,
        at_ms: u64,
    },
    /// Every endpoint of the cycle failed.
    AttemptFailed { error: String },
    ProbeSucceeded { latency: Duration },
    ProbeFailed { error: String },
    ReconnectTimerFired,
    DisconnectRequested,
}

/// What the driver must do in response to an event.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineCommand {
    /// Close the live client and drop timers and in-flight work.
    TearDown,
    /// Try these endpoints in order; stop at the first success.
    StartAttempt(Vec<Candidate>),
    /// Publish the new client and begin periodic probes.
    InstallClient,
    /// The attempt result arrived after the state moved on.
    DiscardClient,
    ScheduleReconnect(Duration),
}

/// One endpoint of an attempt cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub endpoint: String,
    /// Position in the configured list, if it came from there.
    pub list_index: Option<usize>,
}

pub struct ConnectionMachine {
    endpoints: Vec<String>,
    state: ConnectionState,
    /// Where the next rotation starts.
    start_index: usize,
    backoff: Backoff,
    latency_threshold: Duration,
    max_reconnect_attempts: u32,
    reconnect_pending: bool,
    /// Endpoint of the most recent live client, kept across disconnects.
    last_endpoint: Option<String>,
}

impl ConnectionMachine {
    pub fn new(endpoints: Vec<String>, settings: &ConnectionSettings) -> Self {
        Self {
            endpoints,
            state: ConnectionState::default(),
            start_index: 0,
            backoff: Backoff::new(settings.backoff_floor(), settings.backoff_ceiling()),
            latency_threshold: settings.latency_threshold(),
            max_reconnect_attempts: settings.max_reconnect_attempts,
            reconnect_pending: false,
            last_endpoint: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status
    }

    pub fn last_endpoint(&self) -> Option<&str> {
        self.last_endpoint.as_deref()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn handle(&mut self, event: MachineEvent) -> Vec<MachineCommand> {
        match event {
            MachineEvent::ConnectRequested { endpoint } => {
                if self.state.status == ConnectionStatus::Connecting {
                    return Vec::new();
                }
                // An explicit request starts a fresh retry budget.
                self.state.consecutive_attempts = 0;
                self.backoff.reset();
                self.begin_cycle(endpoint.as_deref())
            }
            MachineEvent::ReconnectTimerFired => {
                if !self.reconnect_pending || self.state.status != ConnectionStatus::Error {
                    return Vec::new();
                }
                self.begin_cycle(None)
            }
            MachineEvent::Connected {
                endpoint,
                list_index,
                at_ms,
            } => {
                if self.state.status != ConnectionStatus::Connecting {
                    return vec![MachineCommand::DiscardClient];
                }
                if let Some(index) = list_index {
                    self.start_index = index;
                }
                self.backoff.reset();
                self.last_endpoint = Some(endpoint.clone());
                self.state = ConnectionState {
                    status: ConnectionStatus::Connected,
                    current_endpoint: Some(endpoint),
                    last_error: None,
                    latency: None,
                    consecutive_attempts: 0,
                    last_connected_at_ms: Some(at_ms),
                };
                vec![MachineCommand::InstallClient]
            }
            MachineEvent::AttemptFailed { error } => {
                if self.state.status != ConnectionStatus::Connecting {
                    return Vec::new();
                }
                self.state.consecutive_attempts = self.state.consecutive_attempts.saturating_add(1);
                self.enter_error(error);
                if self.state.consecutive_attempts < self.max_reconnect_attempts {
                    self.reconnect_pending = true;
                    vec![MachineCommand::ScheduleReconnect(self.backoff.next_delay())]
                } else {
                    tracing::warn!(
                        "Giving up after {} failed connection cycles",
                        self.state.consecutive_attempts
                    );
                    Vec::new()
                }
            }
            MachineEvent::ProbeSucceeded { latency } => {
                if !self.state.status.is_live() {
                    return Vec::new();
                }
                self.state.latency = Some(latency);
                self.state.status = if latency > self.latency_threshold {
                    ConnectionStatus::Degraded
                } else {
                    ConnectionStatus::Connected
                };
                Vec::new()
            }
            MachineEvent::ProbeFailed { error } => {
                if !self.state.status.is_live() {
                    return Vec::new();
                }
                self.enter_error(error);
                self.reconnect_pending = true;
                vec![
                    MachineCommand::TearDown,
                    MachineCommand::ScheduleReconnect(self.backoff.next_delay()),
                ]
            }
            MachineEvent::DisconnectRequested => {
                self.state = ConnectionState::default();
                self.reconnect_pending = false;
                self.backoff.reset();
                vec![MachineCommand::TearDown]
            }
        }
    }

    fn begin_cycle(&mut self, explicit: Option<&str>) -> Vec<MachineCommand> {
        self.state.status = ConnectionStatus::Connecting;
        self.reconnect_pending = false;
        let candidates = self.candidates(explicit);
        vec![MachineCommand::TearDown, MachineCommand::StartAttempt(candidates)]
    }

    fn enter_error(&mut self, error: String) {
        self.state.status = ConnectionStatus::Error;
        self.state.last_error = Some(error);
        self.state.latency = None;
        if !self.endpoints.is_empty() {
            self.start_index = (self.start_index + 1) % self.endpoints.len();
        }
    }

    /// Attempt order: an explicit endpoint first, then the configured list
    /// rotated to the current start index.
    fn candidates(&self, explicit: Option<&str>) -> Vec<Candidate> {
        let mut start = self.start_index;
        let mut out = Vec::with_capacity(self.endpoints.len() + 1);

        if let Some(endpoint) = explicit {
            match self.endpoints.iter().position(|e| e == endpoint) {
                Some(index) => start = index,
                None => out.push(Candidate {
                    endpoint: endpoint.to_string(),
                    list_index: None,
                }),
            }
        }

        let len = self.endpoints.len();
        for offset in 0..len {
            let index = (start + offset) % len;
            out.push(Candidate {
                endpoint: self.endpoints[index].clone(),
                list_index: Some(index),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            max_reconnect_attempts: 3,
            backoff_floor_ms: 1000,
            backoff_ceiling_ms: 4000,
            latency_threshold_ms: 2000,
            ..Default::default()
        }
    }

    fn machine() -> ConnectionMachine {
        ConnectionMachine::new(
            vec!["wss://a".into(), "wss://b".into(), "wss://c".into()],
            &settings(),
        )
    }

    fn order(commands: &[MachineCommand]) -> Vec<String> {
        commands
            .iter()
            .find_map(|c| match c {
                MachineCommand::StartAttempt(candidates) => {
                    Some(candidates.iter().map(|c| c.endpoint.clone()).collect())
                }
                _ => None,
            })
            .unwrap_or_default()
    }

    fn connected(m: &mut ConnectionMachine, endpoint: &str, index: usize) {
        m.handle(MachineEvent::Connected {
            endpoint: endpoint.into(),
            list_index: Some(index),
            at_ms: 1,
        });
    }

    #[test]
    fn test_connect_from_disconnected() {
        let mut m = machine();
        let commands = m.handle(MachineEvent::ConnectRequested { endpoint: None });
        assert_eq!(m.status(), ConnectionStatus::Connecting);
        assert_eq!(order(&commands), vec!["wss://a", "wss://b", "wss://c"]);
    }

    #[test]
    fn test_connect_while_connecting_is_noop() {
        let mut m = machine();
        m.handle(MachineEvent::ConnectRequested { endpoint: None });
        let commands = m.handle(MachineEvent::ConnectRequested {
            endpoint: Some("wss://b".into()),
        });
        assert!(commands.is_empty());
        assert_eq!(m.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_explicit_endpoint_goes_first() {
        let mut m = machine();
        let commands = m.handle(MachineEvent::ConnectRequested {
            endpoint: Some("wss://other".into()),
        });
        assert_eq!(
            order(&commands),
            vec!["wss://other", "wss://a", "wss://b", "wss://c"]
        );

        let mut m = machine();
        let commands = m.handle(MachineEvent::ConnectRequested {
            endpoint: Some("wss://b".into()),
        });
        assert_eq!(order(&commands), vec!["wss://b", "wss://c", "wss://a"]);
    }

    #[test]
    fn test_success_resets_attempts() {
        let mut m = machine();
        m.handle(MachineEvent::ConnectRequested { endpoint: None });
        m.handle(MachineEvent::AttemptFailed { error: "down".into() });
        m.handle(MachineEvent::ReconnectTimerFired);
        let commands = m.handle(MachineEvent::Connected {
            endpoint: "wss://c".into(),
            list_index: Some(2),
            at_ms: 42,
        });
        assert_eq!(commands, vec![MachineCommand::InstallClient]);
        let state = m.state();
        assert_eq!(state.status, ConnectionStatus::Connected);
        assert_eq!(state.consecutive_attempts, 0);
        assert_eq!(state.current_endpoint.as_deref(), Some("wss://c"));
        assert_eq!(state.last_connected_at_ms, Some(42));
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_failure_schedules_backoff_and_rotates() {
        let mut m = machine();
        m.handle(MachineEvent::ConnectRequested { endpoint: None });
        let commands = m.handle(MachineEvent::AttemptFailed { error: "down".into() });
        assert_eq!(
            commands,
            vec![MachineCommand::ScheduleReconnect(Duration::from_secs(1))]
        );
        assert_eq!(m.status(), ConnectionStatus::Error);
        assert_eq!(m.state().last_error.as_deref(), Some("down"));
        assert_eq!(m.state().consecutive_attempts, 1);

        let commands = m.handle(MachineEvent::ReconnectTimerFired);
        assert_eq!(order(&commands), vec!["wss://b", "wss://c", "wss://a"]);

        let commands = m.handle(MachineEvent::AttemptFailed { error: "down".into() });
        assert_eq!(
            commands,
            vec![MachineCommand::ScheduleReconnect(Duration::from_secs(2))]
        );
    }

    #[test]
    fn test_stops_at_attempt_ceiling() {
        let mut m = machine();
        m.handle(MachineEvent::ConnectRequested { endpoint: None });
        let mut scheduled = 0;
        loop {
            let commands = m.handle(MachineEvent::AttemptFailed { error: "down".into() });
            if commands.is_empty() {
                break;
            }
            scheduled += 1;
            m.handle(MachineEvent::ReconnectTimerFired);
        }
        assert_eq!(scheduled, 2);
        assert_eq!(m.state().consecutive_attempts, 3);
        assert!(!m.reconnect_pending());

        // A stray timer does nothing once the budget is spent.
        assert!(m.handle(MachineEvent::ReconnectTimerFired).is_empty());

        // A manual connect gets a fresh budget.
        let commands = m.handle(MachineEvent::ConnectRequested { endpoint: None });
        assert!(!order(&commands).is_empty());
        assert_eq!(m.state().consecutive_attempts, 0);
    }

    #[test]
    fn test_probe_latency_degrades_and_recovers() {
        let mut m = machine();
        m.handle(MachineEvent::ConnectRequested { endpoint: None });
        connected(&mut m, "wss://a", 0);

        m.handle(MachineEvent::ProbeSucceeded {
            latency: Duration::from_millis(2500),
        });
        assert_eq!(m.status(), ConnectionStatus::Degraded);
        assert_eq!(m.state().latency, Some(Duration::from_millis(2500)));

        m.handle(MachineEvent::ProbeSucceeded {
            latency: Duration::from_millis(40),
        });
        assert_eq!(m.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_probe_failure_tears_down_and_schedules() {
        let mut m = machine();
        m.handle(MachineEvent::ConnectRequested { endpoint: None });
        connected(&mut m, "wss://a", 0);

        let commands = m.handle(MachineEvent::ProbeFailed { error: "ws closed".into() });
        assert_eq!(
            commands,
            vec![
                MachineCommand::TearDown,
                MachineCommand::ScheduleReconnect(Duration::from_secs(1))
            ]
        );
        assert_eq!(m.status(), ConnectionStatus::Error);

        let commands = m.handle(MachineEvent::ReconnectTimerFired);
        assert_eq!(order(&commands), vec!["wss://b", "wss://c", "wss://a"]);
    }

    #[test]
    fn test_disconnect_resets_everything() {
        let mut m = machine();
        m.handle(MachineEvent::ConnectRequested { endpoint: None });
        m.handle(MachineEvent::AttemptFailed { error: "down".into() });

        let commands = m.handle(MachineEvent::DisconnectRequested);
        assert_eq!(commands, vec![MachineCommand::TearDown]);
        assert_eq!(m.state(), &ConnectionState::default());
        assert!(!m.reconnect_pending());
        assert!(m.handle(MachineEvent::ReconnectTimerFired).is_empty());
    }

    #[test]
    fn test_disconnect_keeps_last_endpoint() {
        let mut m = machine();
        m.handle(MachineEvent::ConnectRequested { endpoint: None });
        connected(&mut m, "wss://b", 1);
        m.handle(MachineEvent::DisconnectRequested);
        assert_eq!(m.last_endpoint(), Some("wss://b"));
    }

    #[test]
    fn test_late_success_after_disconnect_is_discarded() {
        let mut m = machine();
        m.handle(MachineEvent::ConnectRequested { endpoint: None });
        m.handle(MachineEvent::DisconnectRequested);
        let commands = m.handle(MachineEvent::Connected {
            endpoint: "wss://a".into(),
            list_index: Some(0),
            at_ms: 5,
        });
        assert_eq!(commands, vec![MachineCommand::DiscardClient]);
        assert_eq!(m.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_probe_results_ignored_when_not_live() {
        let mut m = machine();
        assert!(m
            .handle(MachineEvent::ProbeFailed { error: "x".into() })
            .is_empty());
        assert_eq!(m.status(), ConnectionStatus::Disconnected);
    }
}
