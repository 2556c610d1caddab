use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle states of a broker handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection; the initial state and the state after a close
    Disconnected,
    /// Connect call or topology setup in progress
    Connecting,
    /// Topology complete and consumer attached
    Ready,
    /// Connect or topology setup failed; terminal for this handler
    Errored,
}

impl ConnectionState {
    /// Check if messages can be consumed and replies published
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Errored)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Ready => write!(f, "ready"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

impl std::str::FromStr for ConnectionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "ready" => Ok(Self::Ready),
            "errored" => Ok(Self::Errored),
            _ => Err(format!("Invalid connection state: {s}")),
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Events that drive connection state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The connect call was issued
    Connect,
    /// Topology setup finished and the consumer is attached
    TopologyReady,
    /// Connect or topology setup failed
    SetupFailed,
    /// The established connection errored or closed
    ConnectionLost,
}

impl LifecycleEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::TopologyReady => "topology_ready",
            Self::SetupFailed => "setup_failed",
            Self::ConnectionLost => "connection_lost",
        }
    }
}

/// Determine the target state for an event, or `None` if the transition is invalid
pub fn transition(current: ConnectionState, event: &LifecycleEvent) -> Option<ConnectionState> {
    use ConnectionState::*;

    match (current, event) {
        (Disconnected, LifecycleEvent::Connect) => Some(Connecting),
        (Connecting, LifecycleEvent::TopologyReady) => Some(Ready),
        (Connecting, LifecycleEvent::SetupFailed) => Some(Errored),
        (Ready, LifecycleEvent::ConnectionLost) => Some(Disconnected),
        // A connection lost mid-setup surfaces as a setup failure
        (Connecting, LifecycleEvent::ConnectionLost) => Some(Errored),
        _ => None,
    }
}
