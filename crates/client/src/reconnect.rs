//! What happens after a stream break that was not an expired session.

use std::cmp;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

const BACKOFF_STEP_SECS: u64 = 10;
const BACKOFF_MAX_SECS: u64 = 60;

pub trait ReconnectPolicy: Send + 'static {
    /// Delay before the next attempt, or `None` to stay disconnected.
    fn next_delay(&mut self) -> Option<Duration>;

    /// Called once a snapshot arrives on a new connection.
    fn reset(&mut self);
}

/// Stop after a break and surface nothing further.
#[derive(Debug, Default)]
pub struct NeverReconnect;

impl ReconnectPolicy for NeverReconnect {
    fn next_delay(&mut self) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}

/// 10s, 20s, ... capped at 60s.
#[derive(Debug)]
pub struct LinearBackoff {
    step: Duration,
    max: Duration,
    attempts: u32,
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(BACKOFF_STEP_SECS),
            Duration::from_secs(BACKOFF_MAX_SECS),
        )
    }
}

impl LinearBackoff {
    pub fn new(step: Duration, max: Duration) -> Self {
        Self {
            step,
            max,
            attempts: 0,
        }
    }
}

impl ReconnectPolicy for LinearBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        let delay = self.step.saturating_mul(self.attempts);
        Some(cmp::min(delay, self.max))
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectMode {
    #[default]
    Never,
    Backoff,
}

impl ReconnectMode {
    pub fn policy(self) -> Box<dyn ReconnectPolicy> {
        match self {
            ReconnectMode::Never => Box::new(NeverReconnect),
            ReconnectMode::Backoff => Box::new(LinearBackoff::default()),
        }
    }
}
