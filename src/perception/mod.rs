pub mod annotator;
pub mod cache;
pub mod locator;
pub mod poller;
pub mod screenshot;
pub mod traits;
pub mod types;
pub mod yolo_detector;
