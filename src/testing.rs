//! Fakes shared by the unit tests: scripted perception, recorded input.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::{Clock, ManualClock};
use crate::config::SessionSettings;
use crate::errors::{PilotError, PilotResult};
use crate::executor::input::{ButtonAction, InputBackend, KeyCode, MouseButton};
use crate::perception::traits::{Detector, FrameSource};
use crate::perception::types::{CaptureRegion, Frame, Point, RawDetection};
use crate::session::AutomationSession;

pub fn raw(label: &str, confidence: f32, bbox: [f32; 4]) -> RawDetection {
    RawDetection {
        label: label.to_string(),
        confidence,
        bbox,
    }
}

#[derive(Default)]
struct SourceState {
    captures: AtomicUsize,
    fail_next: Mutex<Option<String>>,
}

/// Hands out a tiny blank frame at the screen origin.
#[derive(Clone, Default)]
pub struct BlankFrameSource {
    state: Arc<SourceState>,
}

impl BlankFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, msg: &str) {
        *self.state.fail_next.lock().unwrap() = Some(msg.to_string());
    }

    pub fn captures(&self) -> usize {
        self.state.captures.load(Ordering::SeqCst)
    }
}

impl FrameSource for BlankFrameSource {
    fn capture(&self, _region: Option<CaptureRegion>) -> PilotResult<Frame> {
        self.state.captures.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.state.fail_next.lock().unwrap().take() {
            return Err(PilotError::Capture(msg));
        }
        Ok(Frame::new(image::RgbaImage::new(16, 16), Point::new(0, 0)))
    }
}

#[derive(Default)]
struct DetectorState {
    queue: Mutex<VecDeque<Result<Vec<RawDetection>, String>>>,
    default: Mutex<Vec<RawDetection>>,
    calls: AtomicUsize,
    delay: Mutex<Duration>,
    tag_count: Mutex<Option<usize>>,
}

/// Returns queued responses first, then the default detection list.
#[derive(Clone, Default)]
pub struct ScriptedDetector {
    state: Arc<DetectorState>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default(&self, detections: Vec<RawDetection>) {
        *self.state.default.lock().unwrap() = detections;
    }

    pub fn push(&self, detections: Vec<RawDetection>) {
        self.state.queue.lock().unwrap().push_back(Ok(detections));
    }

    pub fn push_error(&self, msg: &str) {
        self.state.queue.lock().unwrap().push_back(Err(msg.to_string()));
    }

    /// Real sleep inside every `detect` call, to widen race windows.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }

    /// Every call returns `count` boxes labelled `gen_<call number>`.
    pub fn tag_with_call_number(&self, count: usize) {
        *self.state.tag_count.lock().unwrap() = Some(count);
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame, _confidence: f32) -> PilotResult<Vec<RawDetection>> {
        let call = self.state.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.state.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(count) = *self.state.tag_count.lock().unwrap() {
            let label = format!("gen_{call}");
            return Ok((0..count)
                .map(|i| raw(&label, 0.5, [i as f32, 0.0, i as f32 + 2.0, 2.0]))
                .collect());
        }
        match self.state.queue.lock().unwrap().pop_front() {
            Some(Ok(dets)) => Ok(dets),
            Some(Err(msg)) => Err(PilotError::Detector(msg)),
            None => Ok(self.state.default.lock().unwrap().clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Move(Point),
    Button(MouseButton, ButtonAction),
    Key(KeyCode, ButtonAction),
}

#[derive(Default)]
struct InputState {
    events: Mutex<Vec<(Instant, InputEvent)>>,
    /// (events still allowed to succeed, failure message)
    fail_after: Mutex<Option<(usize, String)>>,
}

/// Records every synthesized event with the clock's timestamp.
#[derive(Clone)]
pub struct RecordingInput {
    state: Arc<InputState>,
    clock: Arc<dyn Clock>,
}

impl RecordingInput {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::default(),
            clock,
        }
    }

    pub fn fail_next(&self, msg: &str) {
        self.fail_after(0, msg);
    }

    /// Let `ok` more events through, then fail exactly one.
    pub fn fail_after(&self, ok: usize, msg: &str) {
        *self.state.fail_after.lock().unwrap() = Some((ok, msg.to_string()));
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.state.events.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn timed_events(&self) -> Vec<(Instant, InputEvent)> {
        self.state.events.lock().unwrap().clone()
    }

    /// Points of every primary-button click, in order.
    pub fn clicks(&self) -> Vec<Point> {
        let mut last = Point::new(0, 0);
        let mut out = Vec::new();
        for e in self.events() {
            match e {
                InputEvent::Move(p) => last = p,
                InputEvent::Button(MouseButton::Left, ButtonAction::Click) => out.push(last),
                _ => {}
            }
        }
        out
    }

    pub fn keys(&self) -> Vec<KeyCode> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Key(k, ButtonAction::Click) => Some(k),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: InputEvent) -> PilotResult<()> {
        {
            let mut pending = self.state.fail_after.lock().unwrap();
            match pending.as_mut() {
                Some((0, _)) => {
                    let (_, msg) = pending.take().unwrap();
                    return Err(PilotError::Input(msg));
                }
                Some((ok, _)) => *ok -= 1,
                None => {}
            }
        }
        self.state.events.lock().unwrap().push((self.clock.now(), event));
        Ok(())
    }
}

impl InputBackend for RecordingInput {
    fn move_to(&mut self, point: Point) -> PilotResult<()> {
        self.record(InputEvent::Move(point))
    }

    fn button(&mut self, button: MouseButton, action: ButtonAction) -> PilotResult<()> {
        self.record(InputEvent::Button(button, action))
    }

    fn key(&mut self, key: KeyCode, action: ButtonAction) -> PilotResult<()> {
        self.record(InputEvent::Key(key, action))
    }
}

/// A session wired to fakes and a manual clock.
pub struct Harness {
    pub session: AutomationSession,
    pub detector: ScriptedDetector,
    pub source: BlankFrameSource,
    pub input: RecordingInput,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    harness_with(SessionSettings::default())
}

pub fn harness_with(settings: SessionSettings) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let detector = ScriptedDetector::new();
    let source = BlankFrameSource::new();
    let input = RecordingInput::new(clock.clone());
    let session = AutomationSession::builder(settings)
        .clock(clock.clone())
        .build(
            Box::new(source.clone()),
            Box::new(detector.clone()),
            Box::new(input.clone()),
        );
    Harness {
        session,
        detector,
        source,
        input,
        clock,
    }
}
