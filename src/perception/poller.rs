//! Background poller: keeps the detection cache warm from a second thread.
//!
//! Stopping is cooperative. The stop flag also wakes the inter-refresh
//! sleep, and a refresh that is in flight when stop is requested runs to
//! completion but is never committed.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crate::errors::{PilotError, PilotResult};
use crate::perception::cache::DetectionCache;

/// Run flag plus a condvar so a sleeping loop wakes as soon as it is cleared.
pub(crate) struct StopSignal {
    running: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    pub(crate) fn new() -> Self {
        Self {
            running: Mutex::new(true),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn stop(&self) {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.cv.notify_all();
    }

    /// Sleep up to `interval`; returns whether polling should continue.
    pub(crate) fn pause(&self, interval: Duration) -> bool {
        let guard = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .cv
            .wait_timeout_while(guard, interval, |running| *running)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

struct Worker {
    handle: JoinHandle<()>,
    signal: Arc<StopSignal>,
    // Never sent on; disconnects when the thread exits.
    exited: mpsc::Receiver<()>,
    interval: Duration,
}

impl Worker {
    fn is_live(&self) -> bool {
        self.signal.is_running() && !self.handle.is_finished()
    }
}

pub struct BackgroundPoller {
    cache: Arc<DetectionCache>,
    worker: Mutex<Option<Worker>>,
}

impl BackgroundPoller {
    pub fn new(cache: Arc<DetectionCache>) -> Self {
        Self {
            cache,
            worker: Mutex::new(None),
        }
    }

    /// Spawn the polling thread. Calling this while already running is a no-op.
    pub fn start(&self, interval: Duration) -> PilotResult<()> {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = slot.as_ref() {
            if worker.is_live() {
                tracing::debug!("background poller already running");
                return Ok(());
            }
            if !worker.handle.is_finished() {
                return Err(PilotError::Poller(
                    "previous poller thread is still shutting down".into(),
                ));
            }
        }
        if let Some(old) = slot.take() {
            let _ = old.handle.join();
        }

        let signal = Arc::new(StopSignal::new());
        let (exit_tx, exited) = mpsc::channel::<()>();
        let cache = self.cache.clone();
        let thread_signal = signal.clone();
        let handle = thread::Builder::new()
            .name("arkpilot-poller".into())
            .spawn(move || {
                let _exit = exit_tx;
                poll_loop(&cache, &thread_signal, interval);
            })?;

        tracing::info!(interval_ms = interval.as_millis() as u64, "background poller started");
        *slot = Some(Worker {
            handle,
            signal,
            exited,
            interval,
        });
        Ok(())
    }

    /// Signal the thread and wait up to `join_timeout` for it to exit.
    /// A no-op when nothing is running. A thread that outlives the timeout
    /// is reported and left to finish on its own.
    pub fn stop(&self, join_timeout: Duration) -> PilotResult<()> {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(worker) = slot.take() else {
            tracing::debug!("background poller not running");
            return Ok(());
        };

        worker.signal.stop();
        match worker.exited.recv_timeout(join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                worker
                    .handle
                    .join()
                    .map_err(|_| PilotError::Poller("poller thread panicked".into()))?;
                tracing::info!("background poller stopped");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = join_timeout.as_millis() as u64,
                    "background poller did not exit in time"
                );
                *slot = Some(worker);
                Err(PilotError::Poller(format!(
                    "poller thread did not exit within {join_timeout:?}"
                )))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Worker::is_live)
    }

    /// The refresh interval while running.
    pub fn active_interval(&self) -> Option<Duration> {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|w| w.is_live())
            .map(|w| w.interval)
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|w| w.handle.thread().id())
    }
}

impl Drop for BackgroundPoller {
    fn drop(&mut self) {
        if let Some(worker) = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            worker.signal.stop();
        }
    }
}

fn poll_loop(cache: &DetectionCache, signal: &StopSignal, interval: Duration) {
    while signal.is_running() {
        match cache.refresh_guarded(&|| signal.is_running()) {
            Ok(Some(_)) => {}
            Ok(None) => break,
            // already logged by the cache; keep polling
            Err(_) => {}
        }
        if !signal.pause(interval) {
            break;
        }
    }
    tracing::debug!("poller loop exited");
}
