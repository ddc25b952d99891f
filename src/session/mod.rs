//! Automation session: one cache, locator, executor and optional poller,
//! wired together from plain settings.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::SessionSettings;
use crate::errors::PilotResult;
use crate::executor::actions::ActionExecutor;
use crate::executor::input::{InputBackend, KeyCode};
use crate::perception::cache::{CacheSnapshot, DetectionCache};
use crate::perception::locator::{ElementLocator, FixedInterval, PollStrategy};
use crate::perception::poller::BackgroundPoller;
use crate::perception::traits::{Detector, FrameSource};
use crate::perception::types::{DetectionRecord, Frame};
use crate::sequences::runner::{SequenceRunner, WaitTiming};
use crate::sequences::status::{check_player_status, PlayerStatus};
use crate::sequences::{Action, Sequence, SequenceOutcome};

pub struct SessionBuilder {
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    strategy: Box<dyn PollStrategy>,
}

impl SessionBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn poll_strategy(mut self, strategy: Box<dyn PollStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn build(
        self,
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        input: Box<dyn InputBackend>,
    ) -> AutomationSession {
        let s = self.settings;
        let cache = Arc::new(DetectionCache::new(
            source,
            detector,
            self.clock.clone(),
            s.confidence,
            s.capture_region,
        ));
        let poller = Arc::new(BackgroundPoller::new(cache.clone()));
        let locator = ElementLocator::new(cache.clone(), poller.clone(), s.staleness, self.strategy);
        let executor = ActionExecutor::new(input, self.clock, s.cooldown, s.drag);

        let id = Uuid::new_v4();
        let span = tracing::info_span!("session", id = %id);
        span.in_scope(|| {
            tracing::info!(
                cooldown_ms = s.cooldown.as_millis() as u64,
                staleness_ms = s.staleness.as_millis() as u64,
                confidence = s.confidence,
                "automation session created"
            )
        });

        AutomationSession {
            id,
            span,
            settings: s,
            cache,
            poller,
            locator,
            executor,
        }
    }
}

pub struct AutomationSession {
    id: Uuid,
    span: tracing::Span,
    settings: SessionSettings,
    cache: Arc<DetectionCache>,
    poller: Arc<BackgroundPoller>,
    locator: ElementLocator,
    executor: ActionExecutor,
}

impl AutomationSession {
    pub fn builder(settings: SessionSettings) -> SessionBuilder {
        SessionBuilder {
            settings,
            clock: Arc::new(SystemClock),
            strategy: Box::new(FixedInterval),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Enter this to tag log lines with the session id.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<DetectionCache> {
        &self.cache
    }

    pub fn locator(&self) -> &ElementLocator {
        &self.locator
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    // ── perception ──────────────────────────────────────────────────────────

    pub fn refresh(&self) -> PilotResult<Arc<CacheSnapshot>> {
        self.cache.refresh()
    }

    /// Capture a frame and run detection on exactly that frame.
    pub fn capture_and_detect(&self) -> PilotResult<(Frame, Arc<CacheSnapshot>)> {
        let frame = self.cache.capture()?;
        let snapshot = self.cache.refresh_with_frame(&frame)?;
        Ok((frame, snapshot))
    }

    pub fn find(&self, name: &str) -> Option<DetectionRecord> {
        self.locator.find(name, false)
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.locator.is_present(name)
    }

    /// `wait_for` with the configured timeout and poll interval.
    pub fn wait_for(&self, name: &str) -> Option<DetectionRecord> {
        self.locator
            .wait_for(name, self.settings.wait_timeout, self.settings.wait_poll)
    }

    pub fn player_status(&self) -> PlayerStatus {
        check_player_status(&self.locator)
    }

    // ── poller ──────────────────────────────────────────────────────────────

    pub fn start_poller(&self) -> PilotResult<()> {
        self.poller.start(self.settings.poll_interval)
    }

    pub fn stop_poller(&self) -> PilotResult<()> {
        self.poller.stop(self.settings.poller_join_timeout)
    }

    pub fn poller_running(&self) -> bool {
        self.poller.is_running()
    }

    // ── actions ─────────────────────────────────────────────────────────────

    pub fn runner(&self) -> SequenceRunner<'_> {
        SequenceRunner::new(
            &self.locator,
            &self.executor,
            WaitTiming {
                timeout: self.settings.wait_timeout,
                poll: self.settings.wait_poll,
                settle: self.settings.settle,
            },
        )
    }

    pub fn run(&self, sequence: &Sequence) -> SequenceOutcome {
        let _enter = self.span.enter();
        self.runner().run(sequence)
    }

    pub fn click_element(&self, name: &str, offset: (i32, i32)) -> bool {
        self.act(Action::Click {
            element: name.to_string(),
            offset,
        })
    }

    pub fn double_click_element(&self, name: &str) -> bool {
        self.act(Action::DoubleClick(name.to_string()))
    }

    pub fn right_click_element(&self, name: &str) -> bool {
        self.act(Action::RightClick(name.to_string()))
    }

    pub fn drag_element(&self, source: &str, target: &str) -> bool {
        self.act(Action::drag(source, target))
    }

    pub fn press_key(&self, key: KeyCode) -> bool {
        self.act(Action::PressKey(key))
    }

    pub fn hold_key(&self, key: KeyCode, duration: Duration) -> bool {
        self.act(Action::HoldKey(key, duration))
    }

    fn act(&self, action: Action) -> bool {
        let _enter = self.span.enter();
        self.runner().perform(&action).is_ok()
    }

    /// Stop the poller, waiting up to the configured join timeout.
    pub fn shutdown(self) -> PilotResult<()> {
        self.stop_poller()
    }
}

impl Drop for AutomationSession {
    fn drop(&mut self) {
        if let Err(e) = self.poller.stop(self.settings.poller_join_timeout) {
            tracing::warn!(session = %self.id, error = %e, "poller still running at teardown");
        }
        tracing::debug!(session = %self.id, "automation session closed");
    }
}
