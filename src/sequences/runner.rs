// The one interpreter for `Sequence` data. Infrastructure errors never
// escape: they are logged where they happen and surface here as a failed
// step, which the sequence turns into its fallback or a `Failed` outcome.
use std::time::Duration;

use crate::executor::actions::ActionExecutor;
use crate::perception::locator::ElementLocator;
use crate::perception::types::Point;
use crate::sequences::{Action, Goal, Sequence, SequenceOutcome, Step};

type StepResult = Result<(), String>;

/// Waits used when verifying goals and running `WaitFor` steps.
#[derive(Debug, Clone, Copy)]
pub struct WaitTiming {
    pub timeout: Duration,
    pub poll: Duration,
    /// Pause before checking that something went away.
    pub settle: Duration,
}

pub struct SequenceRunner<'a> {
    locator: &'a ElementLocator,
    executor: &'a ActionExecutor,
    timing: WaitTiming,
}

impl<'a> SequenceRunner<'a> {
    pub fn new(locator: &'a ElementLocator, executor: &'a ActionExecutor, timing: WaitTiming) -> Self {
        Self {
            locator,
            executor,
            timing,
        }
    }

    pub fn run(&self, sequence: &Sequence) -> SequenceOutcome {
        let span = tracing::info_span!("sequence", name = %sequence.name);
        let _enter = span.enter();

        if let Some(goal) = &sequence.goal {
            if self.holds_now(goal) {
                tracing::info!(goal = %goal, "goal already holds");
                return SequenceOutcome::AlreadySatisfied;
            }
        }
        if let Some(pre) = &sequence.precondition {
            if !self.holds_now(pre) {
                let reason = format!("precondition not met: {pre}");
                tracing::warn!(reason = %reason, "sequence not started");
                return SequenceOutcome::Failed { reason };
            }
        }

        let goal = sequence.goal.as_ref();
        let outcome = match self.attempt(&sequence.primary, goal) {
            Ok(()) => SequenceOutcome::Completed,
            Err(reason) => match &sequence.fallback {
                None => SequenceOutcome::Failed { reason },
                Some(fallback) => {
                    tracing::info!(reason = %reason, "primary path failed; trying fallback");
                    match self.attempt(fallback, goal) {
                        Ok(()) => SequenceOutcome::CompletedViaFallback,
                        Err(reason) => SequenceOutcome::Failed { reason },
                    }
                }
            },
        };

        match &outcome {
            SequenceOutcome::Failed { reason } => tracing::warn!(reason = %reason, "sequence failed"),
            other => tracing::info!(outcome = %other, "sequence finished"),
        }
        outcome
    }

    /// Locate the element(s) an action needs and synthesize the input.
    pub fn perform(&self, action: &Action) -> StepResult {
        let result = match action {
            Action::Click { element, offset } => {
                let at = self.target(element)?;
                self.executor.click(at, *offset)
            }
            Action::DoubleClick(element) => {
                let at = self.target(element)?;
                self.executor.double_click(at)
            }
            Action::RightClick(element) => {
                let at = self.target(element)?;
                self.executor.right_click(at)
            }
            Action::Drag { source, target } => {
                let from = self.target(source)?;
                let to = self.target(target)?;
                self.executor.drag(from, to)
            }
            Action::PressKey(key) => self.executor.press_key(*key),
            Action::HoldKey(key, duration) => self.executor.hold_key(*key, *duration),
        };
        result.map_err(|e| format!("{action} failed: {e}"))
    }

    fn target(&self, element: &str) -> Result<Point, String> {
        match self.locator.find(element, false) {
            Some(record) => Ok(record.center()),
            None => {
                tracing::warn!(element = %element, "element not found");
                Err(format!("{element} not found"))
            }
        }
    }

    fn attempt(&self, steps: &[Step], goal: Option<&Goal>) -> StepResult {
        self.run_steps(steps)?;
        match goal {
            Some(goal) => self.verify(goal),
            None => Ok(()),
        }
    }

    fn run_steps(&self, steps: &[Step]) -> StepResult {
        steps.iter().try_for_each(|step| self.run_step(step))
    }

    fn run_step(&self, step: &Step) -> StepResult {
        match step {
            Step::Locate(element) => self.target(element).map(|_| ()),
            Step::WaitFor(element) => self
                .locator
                .wait_for(element, self.timing.timeout, self.timing.poll)
                .map(|_| ())
                .ok_or_else(|| format!("timed out waiting for {element}")),
            Step::Act(action) => self.perform(action),
            Step::Branch {
                element,
                if_present,
                if_absent,
            } => {
                if self.locator.is_present(element) {
                    self.run_steps(if_present)
                } else {
                    self.run_steps(if_absent)
                }
            }
            Step::Settle(duration) => {
                self.executor.wait_for_animation(*duration);
                Ok(())
            }
            Step::Run(child) => match self.run(child) {
                SequenceOutcome::Failed { reason } => Err(format!("{}: {reason}", child.name)),
                _ => Ok(()),
            },
            Step::Try(child) => {
                if let SequenceOutcome::Failed { reason } = self.run(child) {
                    tracing::warn!(child = %child.name, reason = %reason, "best-effort step failed; continuing");
                }
                Ok(())
            }
            Step::Fail(reason) => Err(reason.clone()),
        }
    }

    fn holds_now(&self, goal: &Goal) -> bool {
        match goal {
            Goal::Present(element) => self.locator.is_present(element),
            Goal::Absent(element) => !self.locator.is_present(element),
        }
    }

    fn verify(&self, goal: &Goal) -> StepResult {
        match goal {
            Goal::Present(element) => self
                .locator
                .wait_for(element, self.timing.timeout, self.timing.poll)
                .map(|_| ())
                .ok_or_else(|| format!("{element} did not appear")),
            Goal::Absent(element) => {
                self.executor.wait_for_animation(self.timing.settle);
                if self
                    .locator
                    .wait_until_absent(element, self.timing.timeout, self.timing.poll)
                {
                    Ok(())
                } else {
                    Err(format!("{element} still visible"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::input::{ButtonAction, KeyCode, MouseButton};
    use crate::testing::{harness, raw, InputEvent};

    fn at(name: &str, x: f32) -> crate::perception::types::RawDetection {
        raw(name, 0.9, [x, 0.0, x + 10.0, 10.0])
    }

    #[test]
    fn goal_already_holding_skips_everything() {
        let h = harness();
        h.detector.set_default(vec![at("panel", 0.0)]);
        let seq = Sequence::new("open panel", vec![Step::press(KeyCode::Char('p'))])
            .until(Goal::Present("panel".into()));

        assert_eq!(h.session.run(&seq), SequenceOutcome::AlreadySatisfied);
        assert!(h.input.events().is_empty());
    }

    #[test]
    fn failed_precondition_runs_nothing() {
        let h = harness();
        let seq = Sequence::new("transfer", vec![Step::press(KeyCode::Right)])
            .requires(Goal::Present("inventory_tab".into()));

        let outcome = h.session.run(&seq);
        assert!(matches!(outcome, SequenceOutcome::Failed { reason } if reason.contains("inventory_tab")));
        assert!(h.input.events().is_empty());
    }

    #[test]
    fn fallback_runs_once_after_primary_step_fails() {
        let h = harness();
        let seq = Sequence::new("confirm", vec![Step::click("ok_button")])
            .or_else(vec![Step::press(KeyCode::Enter)]);

        assert_eq!(h.session.run(&seq), SequenceOutcome::CompletedViaFallback);
        assert_eq!(h.input.keys(), vec![KeyCode::Enter]);
    }

    #[test]
    fn failing_fallback_fails_without_retrying() {
        let h = harness();
        let seq = Sequence::new("confirm", vec![Step::click("ok_button")])
            .or_else(vec![Step::click("yes_button")]);

        let outcome = h.session.run(&seq);
        assert_eq!(
            outcome,
            SequenceOutcome::Failed {
                reason: "yes_button not found".into()
            }
        );
        assert!(h.input.events().is_empty());
    }

    #[test]
    fn unverified_goal_triggers_fallback() {
        let h = harness();
        h.detector.push(vec![at("panel", 0.0), at("close_button", 40.0)]);
        h.detector.set_default(vec![at("panel", 0.0), at("close_button", 40.0)]);
        let seq = Sequence::new("close panel", vec![Step::click("close_button")])
            .until(Goal::Absent("panel".into()))
            .or_else(vec![Step::press(KeyCode::Escape)]);

        let outcome = h.session.run(&seq);
        assert!(matches!(outcome, SequenceOutcome::Failed { reason } if reason == "panel still visible"));
        assert_eq!(h.input.clicks(), vec![Point::new(45, 5)]);
        assert_eq!(h.input.keys(), vec![KeyCode::Escape]);
    }

    #[test]
    fn branch_picks_path_by_presence() {
        let h = harness();
        h.detector.set_default(vec![at("drop_item", 20.0)]);
        let seq = Sequence::new(
            "drop",
            vec![Step::branch(
                "drop_item",
                vec![Step::click("drop_item")],
                vec![Step::press(KeyCode::Char('o'))],
            )],
        );

        assert_eq!(h.session.run(&seq), SequenceOutcome::Completed);
        assert_eq!(h.input.clicks(), vec![Point::new(25, 5)]);
        assert!(h.input.keys().is_empty());
    }

    #[test]
    fn nested_failure_names_the_child() {
        let h = harness();
        let child = Sequence::new("inner", vec![Step::fail("nope")]);
        let parent = Sequence::new("outer", vec![Step::run(child)]);

        assert_eq!(
            h.session.run(&parent),
            SequenceOutcome::Failed {
                reason: "inner: nope".into()
            }
        );
    }

    #[test]
    fn best_effort_child_failure_does_not_fail_parent() {
        let h = harness();
        h.detector.set_default(vec![at("ok_button", 0.0)]);
        let child = Sequence::new("tidy up", vec![Step::fail("nothing to tidy")]);
        let parent = Sequence::new(
            "outer",
            vec![Step::best_effort(child), Step::click("ok_button")],
        );

        assert_eq!(h.session.run(&parent), SequenceOutcome::Completed);
        assert_eq!(h.input.clicks(), vec![Point::new(5, 5)]);
    }

    #[test]
    fn drag_action_uses_both_centers() {
        let h = harness();
        h.detector
            .set_default(vec![at("inventory_item_berry", 0.0), at("creature_inventory", 100.0)]);

        h.session
            .runner()
            .perform(&Action::drag("inventory_item_berry", "creature_inventory"))
            .unwrap();

        let events = h.input.events();
        assert_eq!(events[0], InputEvent::Move(Point::new(5, 5)));
        assert_eq!(events[1], InputEvent::Button(MouseButton::Left, ButtonAction::Press));
        assert_eq!(
            events[events.len() - 2],
            InputEvent::Move(Point::new(105, 5))
        );
        assert_eq!(
            events.last(),
            Some(&InputEvent::Button(MouseButton::Left, ButtonAction::Release))
        );
    }

    #[test]
    fn wait_for_step_times_out_into_failure() {
        let h = harness();
        let seq = Sequence::new("level", vec![Step::wait_for("level_button")]);
        let outcome = h.session.run(&seq);
        assert!(matches!(outcome, SequenceOutcome::Failed { reason } if reason.contains("level_button")));
    }
}
