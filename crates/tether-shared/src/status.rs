//! Connectivity lifecycle state machine.
//!
//! The machine has no background activity: callers drive every transition
//! and the machine enforces the allowed-edge table. Each successful
//! transition is announced on the bus as `session.status_changed`.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::error::TransitionError;
use crate::events::{Event, EventPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Booting,
    AuthRequired,
    Connecting,
    Syncing,
    Ready,
    Reconnecting,
    Degraded,
    Error,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booting => "BOOTING",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::Connecting => "CONNECTING",
            Self::Syncing => "SYNCING",
            Self::Ready => "READY",
            Self::Reconnecting => "RECONNECTING",
            Self::Degraded => "DEGRADED",
            Self::Error => "ERROR",
        }
    }

    /// States reachable in one step from `self`.
    ///
    /// `AuthRequired` deliberately cannot reach `Syncing`: a freshly
    /// authenticated session must pass through `Connecting` first.
    pub fn allowed_next(&self) -> &'static [State] {
        use State::*;
        match self {
            Booting => &[AuthRequired, Connecting, Error],
            AuthRequired => &[Connecting, Error],
            Connecting => &[Syncing, AuthRequired, Reconnecting, Error],
            Syncing => &[Ready, Reconnecting, Degraded, Error],
            Ready => &[Reconnecting, Degraded, AuthRequired, Error],
            Reconnecting => &[Connecting, Degraded, Error],
            Degraded => &[Connecting, Reconnecting, Ready, Error],
            Error => &[Booting],
        }
    }

    pub fn can_transition_to(&self, to: State) -> bool {
        self.allowed_next().contains(&to)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `session.status_changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub from: State,
    pub to: State,
}

/// Tracks and enforces the daemon's current [`State`].
pub struct StatusMachine {
    current: RwLock<State>,
    bus: Bus,
}

impl StatusMachine {
    /// Create a machine in [`State::Booting`].
    pub fn new(bus: Bus) -> Self {
        Self {
            current: RwLock::new(State::Booting),
            bus,
        }
    }

    pub fn current(&self) -> State {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically move to `to` if the edge is allowed.
    ///
    /// On failure the state is left unchanged. The change event is
    /// published after the state lock is released.
    pub fn transition(&self, to: State) -> Result<StatusChange, TransitionError> {
        let change = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let from = *current;
            if !from.can_transition_to(to) {
                return Err(TransitionError { from, to });
            }
            *current = to;
            StatusChange { from, to }
        };

        tracing::info!(from = %change.from, to = %change.to, "status changed");
        self.bus
            .publish(Event::new(EventPayload::StatusChanged(change)));
        Ok(change)
    }
}
