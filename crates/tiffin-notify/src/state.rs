//! Connection lifecycle state machine.
//!
//! All transition logic lives in [`Lifecycle::apply`], a pure function from
//! (state, event) to an [`Effect`] the manager executes. Timers and tasks stay
//! outside; the machine itself never touches the clock.

use std::time::Duration;

use crate::config::{DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// A retry timer is pending for the given attempt number (1-based).
    ReconnectScheduled { attempt: u32 },
    /// The attempt budget is spent; only an explicit `connect()` restarts.
    ReconnectExhausted,
}

/// Inputs to the machine: user intent, dial results, link loss, timer firings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSignal {
    ConnectRequested,
    Established,
    ConnectFailed,
    TransportLost,
    RetryDue,
    DisconnectRequested,
}

/// What the manager must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Cancel any pending retry and dial the broker.
    StartConnect,
    /// Drop the link, clear subscriptions, arm the retry timer.
    ScheduleRetry { delay: Duration, attempt: u32 },
    /// Drop the link, clear subscriptions, surface the terminal failure.
    Exhausted,
    /// Cancel retries, clear subscriptions, then tear the link down.
    TearDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectPolicy,
}

impl Lifecycle {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn apply(&mut self, signal: LinkSignal) -> Effect {
        use ConnectionState::*;
        use LinkSignal::*;

        match (self.state, signal) {
            // connect() is idempotent while a dial is live or done.
            (Connected | Connecting, ConnectRequested) => Effect::None,
            (_, ConnectRequested) => {
                self.attempts = 0;
                self.state = Connecting;
                Effect::StartConnect
            }
            (Connecting, Established) => {
                self.attempts = 0;
                self.state = Connected;
                Effect::None
            }
            (Connecting, ConnectFailed) | (Connected, TransportLost) => self.fail(),
            (ReconnectScheduled { .. }, RetryDue) => {
                self.state = Connecting;
                Effect::StartConnect
            }
            (_, DisconnectRequested) => {
                self.attempts = 0;
                self.state = Disconnected;
                Effect::TearDown
            }
            // Stale timer firings, duplicate loss reports and the like.
            _ => Effect::None,
        }
    }

    fn fail(&mut self) -> Effect {
        if self.attempts >= self.policy.max_attempts {
            self.state = ConnectionState::ReconnectExhausted;
            Effect::Exhausted
        } else {
            self.attempts += 1;
            self.state = ConnectionState::ReconnectScheduled {
                attempt: self.attempts,
            };
            Effect::ScheduleRetry {
                delay: self.policy.delay,
                attempt: self.attempts,
            }
        }
    }
}
