/// Action executor: turns target points into synthesized input while
/// honouring the cooldown and the game's timing quirks.
///
/// The cooldown wait, the start stamp and the input calls all happen under
/// one lock, so concurrent callers are serialised and the spacing between
/// action starts holds across threads.
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::errors::PilotResult;
use crate::executor::cooldown::Cooldown;
use crate::executor::input::{ButtonAction, InputBackend, KeyCode, MouseButton};
use crate::perception::types::Point;

/// Drags must look like a human drag: button down, a pause, a visible move,
/// a pause, button up. Instant teleport-drags are ignored by the game.
#[derive(Debug, Clone, Copy)]
pub struct DragTiming {
    pub press_delay: Duration,
    pub move_duration: Duration,
    pub release_delay: Duration,
    pub steps: u32,
}

impl Default for DragTiming {
    fn default() -> Self {
        Self {
            press_delay: Duration::from_millis(200),
            move_duration: Duration::from_millis(300),
            release_delay: Duration::from_millis(100),
            steps: 15,
        }
    }
}

struct ExecutorState {
    input: Box<dyn InputBackend>,
    cooldown: Cooldown,
}

pub struct ActionExecutor {
    state: Mutex<ExecutorState>,
    clock: Arc<dyn Clock>,
    drag: DragTiming,
}

impl ActionExecutor {
    pub fn new(
        input: Box<dyn InputBackend>,
        clock: Arc<dyn Clock>,
        minimum_interval: Duration,
        drag: DragTiming,
    ) -> Self {
        Self {
            state: Mutex::new(ExecutorState {
                input,
                cooldown: Cooldown::new(minimum_interval),
            }),
            clock,
            drag,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn last_action_time(&self) -> Option<Instant> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cooldown
            .last_action()
    }

    pub fn click(&self, point: Point, offset: (i32, i32)) -> PilotResult<()> {
        let target = point.offset(offset.0, offset.1);
        self.perform("click", Some(target), |input, _| {
            input.move_to(target)?;
            input.button(MouseButton::Left, ButtonAction::Click)
        })
    }

    pub fn double_click(&self, point: Point) -> PilotResult<()> {
        self.perform("double_click", Some(point), |input, _| {
            input.move_to(point)?;
            input.button(MouseButton::Left, ButtonAction::Click)?;
            input.button(MouseButton::Left, ButtonAction::Click)
        })
    }

    pub fn right_click(&self, point: Point) -> PilotResult<()> {
        self.perform("right_click", Some(point), |input, _| {
            input.move_to(point)?;
            input.button(MouseButton::Right, ButtonAction::Click)
        })
    }

    pub fn move_to(&self, point: Point) -> PilotResult<()> {
        self.perform("move", Some(point), |input, _| input.move_to(point))
    }

    pub fn drag(&self, source: Point, target: Point) -> PilotResult<()> {
        let timing = self.drag;
        self.perform("drag", Some(target), |input, clock| {
            input.move_to(source)?;
            input.button(MouseButton::Left, ButtonAction::Press)?;
            let moved = drag_path(input, clock, source, target, timing);
            // Always let go of the button, even if the move failed midway.
            let released = input.button(MouseButton::Left, ButtonAction::Release);
            moved.and(released)
        })
    }

    pub fn press_key(&self, key: KeyCode) -> PilotResult<()> {
        self.perform("press_key", None, |input, _| input.key(key, ButtonAction::Click))
    }

    /// Blocks the calling thread for `duration` while the key is held.
    pub fn hold_key(&self, key: KeyCode, duration: Duration) -> PilotResult<()> {
        self.perform("hold_key", None, |input, clock| {
            input.key(key, ButtonAction::Press)?;
            clock.sleep(duration);
            input.key(key, ButtonAction::Release)
        })
    }

    /// Scripted settle delay for in-game animations. Not an action, so it
    /// neither waits for nor resets the cooldown.
    pub fn wait_for_animation(&self, duration: Duration) {
        self.clock.sleep(duration);
    }

    fn perform<F>(&self, action: &str, target: Option<Point>, f: F) -> PilotResult<()>
    where
        F: FnOnce(&mut dyn InputBackend, &dyn Clock) -> PilotResult<()>,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.cooldown.wait_and_stamp(self.clock.as_ref());
        let result = f(state.input.as_mut(), self.clock.as_ref());
        drop(state);

        match (&result, target) {
            (Ok(()), Some(p)) => tracing::info!(action, x = p.x, y = p.y, "input sent"),
            (Ok(()), None) => tracing::info!(action, "input sent"),
            (Err(e), Some(p)) => {
                tracing::error!(action, x = p.x, y = p.y, error = %e, "input synthesis failed")
            }
            (Err(e), None) => tracing::error!(action, error = %e, "input synthesis failed"),
        }
        result
    }
}

fn drag_path(
    input: &mut dyn InputBackend,
    clock: &dyn Clock,
    source: Point,
    target: Point,
    timing: DragTiming,
) -> PilotResult<()> {
    clock.sleep(timing.press_delay);
    let steps = timing.steps.max(1);
    let step_delay = timing.move_duration / steps;
    for i in 1..=steps {
        let t = i as f32 / steps as f32;
        let p = Point::new(
            source.x + ((target.x - source.x) as f32 * t).round() as i32,
            source.y + ((target.y - source.y) as f32 * t).round() as i32,
        );
        input.move_to(p)?;
        clock.sleep(step_delay);
    }
    clock.sleep(timing.release_delay);
    Ok(())
}
