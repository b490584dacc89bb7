// SPDX-License-Identifier: MIT OR Apache-2.0
//! Server lifecycle state machine: tracks and enforces valid transitions.

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle state of the HTTP server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// Configuration is loaded; the listener is not accepting yet.
    Starting,
    /// Accepting and handling requests.
    Serving,
    /// No longer accepting; in-flight requests are finishing.
    ShuttingDown,
    /// The server has stopped.
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Serving => "serving",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Record of a single state transition.
#[derive(Clone, Debug)]
pub struct LifecycleTransition {
    /// State before the transition.
    pub from: ServerState,
    /// State after the transition.
    pub to: ServerState,
    /// When the transition happened.
    pub at: Instant,
    /// Optional human-readable reason.
    pub reason: Option<String>,
}

/// Rejected transition.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// The state machine does not allow this edge.
    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: ServerState,
        /// Requested state.
        to: ServerState,
    },
    /// Already in the requested state.
    #[error("already in state {0}")]
    AlreadyInState(ServerState),
}

/// Tracks the server's lifecycle and its transition history.
#[derive(Debug)]
pub struct ServerLifecycle {
    state: ServerState,
    history: Vec<LifecycleTransition>,
    serving_since: Option<Instant>,
}

impl ServerLifecycle {
    /// A lifecycle in [`ServerState::Starting`].
    pub fn new() -> Self {
        Self {
            state: ServerState::Starting,
            history: Vec::new(),
            serving_since: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Move to `to`, recording the transition.
    pub fn transition(
        &mut self,
        to: ServerState,
        reason: Option<String>,
    ) -> Result<(), LifecycleError> {
        if self.state == to {
            return Err(LifecycleError::AlreadyInState(to));
        }
        if !self.can_transition(to) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        let from = self.state;
        self.state = to;
        if to == ServerState::Serving {
            self.serving_since = Some(Instant::now());
        }
        self.history.push(LifecycleTransition {
            from,
            to,
            at: Instant::now(),
            reason,
        });
        Ok(())
    }

    /// Whether moving from the current state to `to` is allowed.
    pub fn can_transition(&self, to: ServerState) -> bool {
        use ServerState::*;
        matches!(
            (self.state, to),
            (Starting, Serving) | (Starting, Stopped) | (Serving, ShuttingDown) | (ShuttingDown, Stopped)
        )
    }

    /// All transitions so far, oldest first.
    pub fn history(&self) -> &[LifecycleTransition] {
        &self.history
    }

    /// Time spent serving, if the server ever started serving.
    pub fn uptime(&self) -> Option<Duration> {
        self.serving_since.map(|t| t.elapsed())
    }
}

impl Default for ServerLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
