//! Connection state machine for a reconnecting control connection.
//!
//! [`ConnectionTracker`] owns the state of one peer connection together
//! with its backoff. A driving loop reports what happened to the transport
//! and the tracker decides whether that is a legal step:
//!
//! 1. [`connecting()`](ConnectionTracker::connecting) before dialing
//! 2. [`connected()`](ConnectionTracker::connected) once the socket is open
//! 3. [`synced()`](ConnectionTracker::synced) after the full state was exchanged
//! 4. [`disconnected()`](ConnectionTracker::disconnected) on error or close, which
//!    returns how long to wait before step 1 again
//!
//! [`close()`](ConnectionTracker::close) ends the cycle for good.

use crate::backoff::{Backoff, ReconnectPolicy};
use crate::error::{Error, Result};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// State of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Transport open, full state not yet exchanged.
    Connected,
    /// Full state exchanged; incremental traffic may flow.
    Synced,
    /// Shut down explicitly. Terminal.
    Closed,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal step.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Synced)
                | (Connected, Disconnected)
                | (Synced, Disconnected)
                | (Disconnected | Connecting | Connected | Synced, Closed)
        )
    }

    pub fn is_open(self) -> bool {
        matches!(self, Self::Connected | Self::Synced)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Synced => write!(f, "Synced"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Tracks one connection's state and reconnect backoff.
#[derive(Debug)]
pub struct ConnectionTracker {
    state: ConnectionState,
    backoff: Backoff,
    /// When the current state was entered.
    since: Instant,
}

impl ConnectionTracker {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            backoff: Backoff::new(policy),
            since: Instant::now(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Time spent in the current state.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.since.elapsed()
    }

    /// Failed attempts since the last successful connection.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.backoff.attempt()
    }

    pub fn connecting(&mut self) -> Result<()> {
        self.transition(ConnectionState::Connecting)
    }

    /// Transport is open. Resets the backoff.
    pub fn connected(&mut self) -> Result<()> {
        self.transition(ConnectionState::Connected)?;
        self.backoff.reset();
        Ok(())
    }

    pub fn synced(&mut self) -> Result<()> {
        self.transition(ConnectionState::Synced)
    }

    /// The transport failed or closed. Returns the delay before reconnecting.
    pub fn disconnected(&mut self) -> Result<Duration> {
        self.transition(ConnectionState::Disconnected)?;
        let delay = self.backoff.next_delay();
        debug!(attempt = self.backoff.attempt(), delay = ?delay, "scheduling reconnect");
        Ok(delay)
    }

    /// Shut down for good. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            self.set(ConnectionState::Closed);
        }
    }

    fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(Error::Closed);
        }
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.set(next);
        Ok(())
    }

    fn set(&mut self, next: ConnectionState) {
        trace!(from = %self.state, to = %next, "connection state change");
        self.state = next;
        self.since = Instant::now();
    }
}
