//! Element locator: "where is element N" and "wait until N appears".
//!
//! Lookups reuse the cached snapshot while it is fresh and trigger one
//! capture+inference pass otherwise. Perception failures are logged by the
//! cache and show up here as "absent" for that single call.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::perception::cache::{CacheSnapshot, DetectionCache};
use crate::perception::poller::BackgroundPoller;
use crate::perception::types::DetectionRecord;

const MIN_POLL: Duration = Duration::from_millis(1);

/// How long to sleep between polling attempts.
pub trait PollStrategy: Send + Sync {
    fn delay(&self, attempt: u32, poll_interval: Duration) -> Duration;
}

/// Always sleeps exactly the requested poll interval.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedInterval;

impl PollStrategy for FixedInterval {
    fn delay(&self, _attempt: u32, poll_interval: Duration) -> Duration {
        poll_interval
    }
}

enum Lookup {
    Snapshot(Arc<CacheSnapshot>),
    Failed,
}

pub struct ElementLocator {
    cache: Arc<DetectionCache>,
    poller: Arc<BackgroundPoller>,
    staleness: Duration,
    strategy: Box<dyn PollStrategy>,
}

impl ElementLocator {
    pub fn new(
        cache: Arc<DetectionCache>,
        poller: Arc<BackgroundPoller>,
        staleness: Duration,
        strategy: Box<dyn PollStrategy>,
    ) -> Self {
        Self {
            cache,
            poller,
            staleness,
            strategy,
        }
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    fn clock(&self) -> &dyn Clock {
        self.cache.clock().as_ref()
    }

    /// With a poller refreshing at least as often as our staleness
    /// tolerance, the cache is trusted until it actually goes stale.
    fn poller_covers_staleness(&self) -> bool {
        self.poller
            .active_interval()
            .is_some_and(|interval| interval <= self.staleness)
    }

    fn lookup(&self, name: &str, force_refresh: bool) -> Lookup {
        let snapshot = self.cache.snapshot();
        let stale = snapshot.is_stale(self.clock().now(), self.staleness);
        let refresh = if self.poller_covers_staleness() {
            stale
        } else {
            force_refresh || stale || !snapshot.contains(name)
        };
        if !refresh {
            return Lookup::Snapshot(snapshot);
        }
        match self.cache.refresh() {
            Ok(fresh) => Lookup::Snapshot(fresh),
            Err(_) => {
                tracing::debug!(element = %name, "lookup failed; reporting absent");
                Lookup::Failed
            }
        }
    }

    /// Highest-confidence record for `name`. Ties go to the first record in
    /// detector output order.
    pub fn find(&self, name: &str, force_refresh: bool) -> Option<DetectionRecord> {
        match self.lookup(name, force_refresh) {
            Lookup::Snapshot(snapshot) => best_of(snapshot.get(name)).cloned(),
            Lookup::Failed => None,
        }
    }

    /// All records for `name`, confidence descending; ties keep detector order.
    pub fn find_all(&self, name: &str, force_refresh: bool) -> Vec<DetectionRecord> {
        match self.lookup(name, force_refresh) {
            Lookup::Snapshot(snapshot) => {
                let mut records = snapshot.get(name).to_vec();
                records.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
                records
            }
            Lookup::Failed => Vec::new(),
        }
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.find(name, false).is_some()
    }

    /// Poll with forced refreshes until `name` shows up or `timeout` elapses.
    pub fn wait_for(
        &self,
        name: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Option<DetectionRecord> {
        let clock = self.clock();
        let start = clock.now();
        let deadline = start + timeout;
        let mut attempt = 0u32;

        while clock.now() < deadline {
            attempt += 1;
            if let Some(record) = self.find(name, true) {
                tracing::info!(
                    element = %name,
                    elapsed_ms = (clock.now() - start).as_millis() as u64,
                    attempts = attempt,
                    "element appeared"
                );
                return Some(record);
            }
            if !self.pause(attempt, poll_interval, deadline) {
                break;
            }
        }

        tracing::warn!(
            element = %name,
            timeout_ms = timeout.as_millis() as u64,
            attempts = attempt,
            "timed out waiting for element"
        );
        None
    }

    /// Poll with forced refreshes until `name` is confirmed gone.
    /// A failed refresh never counts as confirmation.
    pub fn wait_until_absent(&self, name: &str, timeout: Duration, poll_interval: Duration) -> bool {
        let clock = self.clock();
        let deadline = clock.now() + timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if let Lookup::Snapshot(snapshot) = self.lookup(name, true) {
                if !snapshot.contains(name) {
                    return true;
                }
            }
            if clock.now() >= deadline || !self.pause(attempt, poll_interval, deadline) {
                break;
            }
        }

        tracing::info!(
            element = %name,
            timeout_ms = timeout.as_millis() as u64,
            attempts = attempt,
            "element still present"
        );
        false
    }

    /// Sleep for the strategy's delay, never past `deadline`.
    fn pause(&self, attempt: u32, poll_interval: Duration, deadline: std::time::Instant) -> bool {
        let clock = self.clock();
        let remaining = deadline.saturating_duration_since(clock.now());
        if remaining.is_zero() {
            return false;
        }
        let delay = self.strategy.delay(attempt, poll_interval).max(MIN_POLL);
        clock.sleep(delay.min(remaining));
        true
    }
}

fn best_of(records: &[DetectionRecord]) -> Option<&DetectionRecord> {
    records.iter().fold(None, |best: Option<&DetectionRecord>, rec| match best {
        Some(b) if rec.confidence <= b.confidence => Some(b),
        _ => Some(rec),
    })
}
