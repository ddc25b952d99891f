//! Taming helpers: feed a knocked-out creature, keep it sedated, level up,
//! and a [`TamingMonitor`] that tops up food and narcotics on a schedule.
use std::fmt;
use std::sync::Arc;
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::errors::{PilotError, PilotResult};
use crate::perception::poller::StopSignal;
use crate::sequences::{Action, GameProfile, Sequence, Step};
use crate::session::AutomationSession;

pub const CREATURE_INVENTORY: &str = "creature_inventory";
pub const TAMING_BAR: &str = "taming_bar";
pub const NARCOTIC: &str = "inventory_item_narcotic";

const LEVEL_UP_SETTLE: Duration = Duration::from_secs(1);

fn food_element(food: &str) -> String {
    format!("inventory_item_{food}")
}

impl GameProfile {
    /// Drag the first preferred food that is actually in the inventory onto
    /// the creature.
    pub fn feed_creature(&self, creature: &str) -> Sequence {
        let reason = format!("no suitable food for {creature}");
        let pick = self
            .foods_for(creature)
            .iter()
            .rev()
            .fold(vec![Step::fail(reason)], |otherwise, food| {
                let element = food_element(food);
                vec![Step::branch(
                    element.clone(),
                    vec![Step::Act(Action::drag(element, CREATURE_INVENTORY))],
                    otherwise,
                )]
            });

        let mut steps = vec![Step::run(self.open_inventory()), Step::locate(TAMING_BAR)];
        steps.extend(pick);
        Sequence::new(format!("feed {creature}"), steps)
    }

    pub fn apply_narcotic(&self) -> Sequence {
        Sequence::new(
            "apply narcotic",
            vec![
                Step::run(self.open_inventory()),
                Step::locate(TAMING_BAR),
                Step::branch(
                    NARCOTIC,
                    vec![Step::Act(Action::drag(NARCOTIC, CREATURE_INVENTORY))],
                    vec![Step::fail("no narcotics in inventory")],
                ),
            ],
        )
    }

    /// Spend a pending level point on health.
    pub fn level_up(&self) -> Sequence {
        let no_level = Step::branch("level_icon", vec![], vec![Step::fail("no level-up available")]);
        Sequence::new(
            "level up",
            vec![
                Step::branch("level_alert", vec![], vec![no_level]),
                Step::run(self.open_inventory()),
                Step::wait_for("level_button"),
                Step::click("level_button"),
                Step::Settle(LEVEL_UP_SETTLE),
                Step::click("health_stat"),
            ],
        )
    }
}

/// How often the monitor looks at the taming screen and how long it lets
/// pass between narcotic and food top-ups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TamingSchedule {
    pub check_interval: Duration,
    pub narcotic_every: Duration,
    pub food_every: Duration,
}

impl Default for TamingSchedule {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            narcotic_every: Duration::from_secs(600),
            food_every: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TamingSummary {
    pub creature: String,
    pub elapsed: Duration,
    pub food_added: u32,
    pub narcotics_added: u32,
    /// What the creature's narcotics-per-hour rate calls for over `elapsed`.
    pub narcotics_expected: u32,
}

impl fmt::Display for TamingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.elapsed.as_secs_f64();
        write!(
            f,
            "{}: {secs:.1}s ({:.2}h), {} food, {} narcotics (rate calls for {})",
            self.creature,
            secs / 3600.0,
            self.food_added,
            self.narcotics_added,
            self.narcotics_expected
        )
    }
}

/// Time-based taming upkeep. Bar levels are not read; narcotics and food
/// are added whenever their interval has run out and the taming screen is up.
pub struct TamingMonitor {
    creature: String,
    profile: GameProfile,
    schedule: TamingSchedule,
    started_at: Instant,
    last_narcotic: Instant,
    last_food: Instant,
    food_added: u32,
    narcotics_added: u32,
}

impl TamingMonitor {
    pub fn new(profile: GameProfile, creature: &str, schedule: TamingSchedule, now: Instant) -> Self {
        Self {
            creature: creature.to_ascii_lowercase(),
            profile,
            schedule,
            started_at: now,
            last_narcotic: now,
            last_food: now,
            food_added: 0,
            narcotics_added: 0,
        }
    }

    /// One monitoring pass. A top-up that fails keeps its timer expired, so
    /// the next pass tries again.
    pub fn tick(&mut self, session: &AutomationSession) {
        if !session.is_present(TAMING_BAR) {
            tracing::warn!(creature = %self.creature, "taming screen not visible");
            return;
        }
        let clock = session.executor().clock().clone();

        let since_narcotic = clock.now().saturating_duration_since(self.last_narcotic);
        if since_narcotic > self.schedule.narcotic_every {
            tracing::info!(creature = %self.creature, "torpidity due; adding narcotic");
            if session.run(&self.profile.apply_narcotic()).succeeded() {
                self.last_narcotic = clock.now();
                self.narcotics_added += 1;
            }
        } else {
            let next = self.schedule.narcotic_every - since_narcotic;
            tracing::debug!(next_in_s = next.as_secs(), "torpidity ok");
        }

        if clock.now().saturating_duration_since(self.last_food) > self.schedule.food_every {
            tracing::info!(creature = %self.creature, "adding food");
            if session.run(&self.profile.feed_creature(&self.creature)).succeeded() {
                self.last_food = clock.now();
                self.food_added += 1;
            }
        }
    }

    pub fn summary(&self, now: Instant) -> TamingSummary {
        let elapsed = now.saturating_duration_since(self.started_at);
        let rate = self.profile.narcotics_for(&self.creature);
        let expected = (f64::from(rate) * elapsed.as_secs_f64() / 3600.0).ceil() as u32;
        TamingSummary {
            creature: self.creature.clone(),
            elapsed,
            food_added: self.food_added,
            narcotics_added: self.narcotics_added,
            narcotics_expected: expected,
        }
    }

    /// Run the monitor on a scoped thread until [`MonitorHandle::stop`].
    pub fn spawn<'scope, 'env>(
        mut self,
        scope: &'scope Scope<'scope, 'env>,
        session: &'env AutomationSession,
    ) -> PilotResult<MonitorHandle<'scope>> {
        let signal = Arc::new(StopSignal::new());
        let thread_signal = signal.clone();
        let interval = self.schedule.check_interval;
        let span = session.span().clone();
        let handle = thread::Builder::new()
            .name("arkpilot-taming".into())
            .spawn_scoped(scope, move || {
                span.in_scope(|| {
                    tracing::info!(creature = %self.creature, "taming monitor started");
                    while thread_signal.is_running() {
                        self.tick(session);
                        if !thread_signal.pause(interval) {
                            break;
                        }
                    }
                    let summary = self.summary(session.executor().clock().now());
                    tracing::info!(
                        creature = %summary.creature,
                        elapsed_s = summary.elapsed.as_secs(),
                        food = summary.food_added,
                        narcotics = summary.narcotics_added,
                        narcotics_expected = summary.narcotics_expected,
                        "taming session summary"
                    );
                    summary
                })
            })?;
        Ok(MonitorHandle { signal, handle })
    }
}

pub struct MonitorHandle<'scope> {
    signal: Arc<StopSignal>,
    handle: ScopedJoinHandle<'scope, TamingSummary>,
}

impl MonitorHandle<'_> {
    pub fn is_running(&self) -> bool {
        self.signal.is_running() && !self.handle.is_finished()
    }

    /// Wake the monitor and wait for its current pass to finish.
    pub fn stop(self) -> PilotResult<TamingSummary> {
        self.signal.stop();
        self.handle
            .join()
            .map_err(|_| PilotError::Poller("taming monitor panicked".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::input::{ButtonAction, MouseButton};
    use crate::perception::types::{Point, RawDetection};
    use crate::sequences::{SequenceOutcome, INVENTORY_TAB};
    use crate::testing::{harness, raw, InputEvent};

    fn at(name: &str, x: f32) -> RawDetection {
        raw(name, 0.9, [x, 0.0, x + 10.0, 10.0])
    }

    fn drag_source(events: &[InputEvent]) -> Option<Point> {
        events.windows(2).find_map(|w| match (&w[0], &w[1]) {
            (InputEvent::Move(p), InputEvent::Button(MouseButton::Left, ButtonAction::Press)) => Some(*p),
            _ => None,
        })
    }

    #[test]
    fn feeds_first_available_preferred_food() {
        let h = harness();
        // raptor prefers raw_meat, then cooked_meat; only cooked is carried
        h.detector.set_default(vec![
            at(INVENTORY_TAB, 0.0),
            at(TAMING_BAR, 20.0),
            at("inventory_item_cooked_meat", 40.0),
            at(CREATURE_INVENTORY, 200.0),
        ]);
        let outcome = h.session.run(&GameProfile::default().feed_creature("raptor"));

        assert_eq!(outcome, SequenceOutcome::Completed);
        let events = h.input.events();
        assert_eq!(drag_source(&events), Some(Point::new(45, 5)));
        assert_eq!(events[events.len() - 2], InputEvent::Move(Point::new(205, 5)));
    }

    #[test]
    fn feeding_without_taming_bar_fails() {
        let h = harness();
        h.detector.set_default(vec![
            at(INVENTORY_TAB, 0.0),
            at("inventory_item_raw_meat", 40.0),
            at(CREATURE_INVENTORY, 200.0),
        ]);
        let outcome = h.session.run(&GameProfile::default().feed_creature("raptor"));

        assert!(matches!(outcome, SequenceOutcome::Failed { ref reason } if reason.contains(TAMING_BAR)));
        assert!(h.input.events().is_empty());
    }

    #[test]
    fn feeding_with_no_food_reports_creature() {
        let h = harness();
        h.detector
            .set_default(vec![at(INVENTORY_TAB, 0.0), at(TAMING_BAR, 20.0)]);
        let outcome = h.session.run(&GameProfile::default().feed_creature("dodo"));
        assert_eq!(
            outcome,
            SequenceOutcome::Failed {
                reason: "no suitable food for dodo".into()
            }
        );
    }

    #[test]
    fn narcotic_is_dragged_to_creature() {
        let h = harness();
        h.detector.set_default(vec![
            at(INVENTORY_TAB, 0.0),
            at(TAMING_BAR, 20.0),
            at(NARCOTIC, 60.0),
            at(CREATURE_INVENTORY, 200.0),
        ]);
        let outcome = h.session.run(&GameProfile::default().apply_narcotic());

        assert_eq!(outcome, SequenceOutcome::Completed);
        assert_eq!(drag_source(&h.input.events()), Some(Point::new(65, 5)));
    }

    #[test]
    fn level_up_without_alert_does_nothing() {
        let h = harness();
        h.detector.set_default(vec![at(INVENTORY_TAB, 0.0)]);
        let outcome = h.session.run(&GameProfile::default().level_up());
        assert_eq!(
            outcome,
            SequenceOutcome::Failed {
                reason: "no level-up available".into()
            }
        );
        assert!(h.input.events().is_empty());
    }

    #[test]
    fn level_up_puts_point_into_health() {
        let h = harness();
        h.detector.set_default(vec![
            at("level_icon", 0.0),
            at(INVENTORY_TAB, 20.0),
            at("level_button", 40.0),
            at("health_stat", 60.0),
        ]);
        let outcome = h.session.run(&GameProfile::default().level_up());

        assert_eq!(outcome, SequenceOutcome::Completed);
        assert_eq!(h.input.clicks(), vec![Point::new(45, 5), Point::new(65, 5)]);
    }

    fn taming_screen() -> Vec<RawDetection> {
        vec![
            at(INVENTORY_TAB, 0.0),
            at(TAMING_BAR, 20.0),
            at(NARCOTIC, 60.0),
            at("inventory_item_raw_meat", 80.0),
            at(CREATURE_INVENTORY, 200.0),
        ]
    }

    #[test]
    fn monitor_tops_up_when_intervals_run_out() {
        let h = harness();
        h.detector.set_default(taming_screen());
        let mut monitor =
            TamingMonitor::new(GameProfile::default(), "Raptor", TamingSchedule::default(), h.clock.now());

        monitor.tick(&h.session);
        assert!(h.input.events().is_empty());

        h.clock.advance(Duration::from_secs(301));
        monitor.tick(&h.session);
        let first = monitor.summary(h.clock.now());
        assert_eq!((first.food_added, first.narcotics_added), (1, 0));
        assert_eq!(drag_source(&h.input.events()), Some(Point::new(85, 5)));

        h.clock.advance(Duration::from_secs(700));
        monitor.tick(&h.session);
        let second = monitor.summary(h.clock.now());
        assert_eq!(second.creature, "raptor");
        assert_eq!((second.food_added, second.narcotics_added), (2, 1));
    }

    #[test]
    fn monitor_idles_without_taming_screen() {
        let h = harness();
        h.detector.set_default(vec![at(INVENTORY_TAB, 0.0), at(NARCOTIC, 60.0)]);
        let mut monitor =
            TamingMonitor::new(GameProfile::default(), "rex", TamingSchedule::default(), h.clock.now());

        h.clock.advance(Duration::from_secs(3600));
        monitor.tick(&h.session);
        assert!(h.input.events().is_empty());
        assert_eq!(monitor.summary(h.clock.now()).narcotics_added, 0);
    }

    #[test]
    fn failed_top_up_is_retried_next_pass() {
        let h = harness();
        // taming screen up, but nothing to give the creature
        h.detector
            .set_default(vec![at(INVENTORY_TAB, 0.0), at(TAMING_BAR, 20.0), at(CREATURE_INVENTORY, 200.0)]);
        let mut monitor =
            TamingMonitor::new(GameProfile::default(), "dodo", TamingSchedule::default(), h.clock.now());

        h.clock.advance(Duration::from_secs(601));
        monitor.tick(&h.session);
        assert_eq!(monitor.summary(h.clock.now()).narcotics_added, 0);

        h.detector.set_default(taming_screen());
        monitor.tick(&h.session);
        assert_eq!(monitor.summary(h.clock.now()).narcotics_added, 1);
    }

    #[test]
    fn summary_scales_rate_by_elapsed_time() {
        let profile = GameProfile::default();
        let start = Instant::now();
        let monitor = TamingMonitor::new(profile, "rex", TamingSchedule::default(), start);
        let summary = monitor.summary(start + Duration::from_secs(5400));
        assert_eq!(summary.narcotics_expected, 60);
        assert_eq!(summary.elapsed, Duration::from_secs(5400));
    }

    #[test]
    fn spawned_monitor_stops_with_a_summary() {
        let h = harness();
        h.detector.set_default(taming_screen());
        let schedule = TamingSchedule {
            check_interval: Duration::from_millis(10),
            ..TamingSchedule::default()
        };
        let monitor = TamingMonitor::new(GameProfile::default(), "parasaur", schedule, h.clock.now());

        let summary = thread::scope(|scope| {
            let handle = monitor.spawn(scope, &h.session).unwrap();
            thread::sleep(Duration::from_millis(60));
            assert!(handle.is_running());
            handle.stop().unwrap()
        });

        assert_eq!(summary.creature, "parasaur");
        assert_eq!((summary.food_added, summary.narcotics_added), (0, 0));
        assert!(h.detector.calls() >= 1);
    }
}
