use crate::errors::PilotResult;
use crate::perception::types::{CaptureRegion, Frame, RawDetection};

/// Produces screen frames on demand.
pub trait FrameSource: Send + Sync {
    fn capture(&self, region: Option<CaptureRegion>) -> PilotResult<Frame>;
}

/// Runs an object-detection model over a frame.
/// Any implementation returning label/confidence/box triples is substitutable.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame, confidence: f32) -> PilotResult<Vec<RawDetection>>;
}
