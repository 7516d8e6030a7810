//! Session Lifecycle
//!
//! Every session, on either side of a connection, moves through the same
//! states: `Unconnected`, `Initializing`, `Ready`, `Closing`, `Closed`.
//! Transitions only move forward, and `Closed` is terminal.

use std::fmt;

use tokio::sync::watch;
use tracing::debug;

use crate::errors::Error;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport not yet in use
    Unconnected,
    /// Waiting for the initialize handshake to finish
    Initializing,
    /// Handshake done; feature requests are served
    Ready,
    /// Shutting down; pending work is being abandoned
    Closing,
    /// Terminal state
    Closed,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            SessionState::Unconnected => 0,
            SessionState::Initializing => 1,
            SessionState::Ready => 2,
            SessionState::Closing => 3,
            SessionState::Closed => 4,
        }
    }

    /// Whether a session may move from `self` to `next`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        match (self, next) {
            (SessionState::Closed, _) => false,
            // Failures may skip straight to shutdown from anywhere
            (_, SessionState::Closing) => self.rank() < SessionState::Closing.rank(),
            (SessionState::Closing, SessionState::Closed) => true,
            (from, to) => to.rank() == from.rank() + 1 && to != SessionState::Closed,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unconnected => write!(f, "Unconnected"),
            SessionState::Initializing => write!(f, "Initializing"),
            SessionState::Ready => write!(f, "Ready"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Tracks the state of one session and lets others observe it
#[derive(Debug)]
pub struct Lifecycle {
    label: String,
    state: watch::Sender<SessionState>,
}

impl Lifecycle {
    pub fn new(label: impl Into<String>) -> Self {
        let (state, _) = watch::channel(SessionState::Unconnected);
        Self {
            label: label.into(),
            state,
        }
    }

    pub fn current(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move to `next`, rejecting transitions that go backwards
    pub fn transition(&self, next: SessionState) -> Result<(), Error> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(
                Error::InvalidState(format!("{}: cannot move from {} to {}", self.label, current, next))
            );
        }
        debug!("{}: {} -> {}", self.label, current, next);
        self.state.send_replace(next);
        Ok(())
    }

    /// Move towards shutdown from wherever the session is, ignoring repeats
    pub fn close(&self) {
        if self.current().can_transition_to(SessionState::Closing) {
            let _ = self.transition(SessionState::Closing);
        }
        if self.current() == SessionState::Closing {
            let _ = self.transition(SessionState::Closed);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}
