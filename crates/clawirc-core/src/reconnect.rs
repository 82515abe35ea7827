//! Reconnection supervisor.
//!
//! Pure state machine: the controller feeds it registrations and closes and
//! acts on the returned decision (schedule a retry or give up).

use std::time::Duration;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5_000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Linear backoff: attempt `n` waits `n` base intervals.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Retrying,
    GivenUp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Retry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

#[derive(Clone, Debug)]
pub struct Supervisor {
    policy: ReconnectPolicy,
    attempts: u32,
    state: LinkState,
}

impl Supervisor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            state: LinkState::Connected,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// The handshake completed: the failure streak is over.
    pub fn on_registered(&mut self) {
        if self.state == LinkState::GivenUp {
            return;
        }
        self.attempts = 0;
        self.state = LinkState::Connected;
    }

    /// A connection closed without a shutdown request.
    pub fn on_close(&mut self) -> Decision {
        if self.state == LinkState::GivenUp {
            return Decision::GiveUp {
                attempts: self.attempts,
            };
        }

        self.attempts = self.attempts.saturating_add(1);
        if self.attempts > self.policy.max_attempts {
            self.state = LinkState::GivenUp;
            return Decision::GiveUp {
                attempts: self.attempts,
            };
        }

        self.state = LinkState::Retrying;
        Decision::Retry {
            attempt: self.attempts,
            delay: self.policy.delay_for(self.attempts),
        }
    }
}
