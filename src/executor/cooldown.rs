use std::time::{Duration, Instant};

use crate::clock::Clock;

/// Minimum spacing between the start times of consecutive actions.
#[derive(Debug, Clone)]
pub struct Cooldown {
    last_action: Option<Instant>,
    minimum_interval: Duration,
}

impl Cooldown {
    pub fn new(minimum_interval: Duration) -> Self {
        Self {
            last_action: None,
            minimum_interval,
        }
    }

    pub fn minimum_interval(&self) -> Duration {
        self.minimum_interval
    }

    pub fn last_action(&self) -> Option<Instant> {
        self.last_action
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_action {
            None => Duration::ZERO,
            Some(last) => self
                .minimum_interval
                .saturating_sub(now.saturating_duration_since(last)),
        }
    }

    /// Sleep out whatever is left of the interval, then record the action
    /// start. Returns the recorded start time.
    pub fn wait_and_stamp(&mut self, clock: &dyn Clock) -> Instant {
        let remaining = self.remaining(clock.now());
        if !remaining.is_zero() {
            tracing::trace!(wait_ms = remaining.as_millis() as u64, "cooldown wait");
            clock.sleep(remaining);
        }
        let start = clock.now();
        self.last_action = Some(start);
        start
    }
}
