/// Screen capture through `xcap`.
///
/// The monitor list is re-enumerated on every capture so display changes
/// (resolution switch, game moving monitors) are picked up without restart.
use crate::errors::{PilotError, PilotResult};
use crate::perception::traits::FrameSource;
use crate::perception::types::{CaptureRegion, Frame, Point};

pub struct XcapFrameSource {
    monitor_index: Option<usize>,
}

impl XcapFrameSource {
    /// `None` captures the primary monitor.
    pub fn new(monitor_index: Option<usize>) -> Self {
        Self { monitor_index }
    }

    fn pick_monitor(&self) -> PilotResult<xcap::Monitor> {
        let monitors =
            xcap::Monitor::all().map_err(|e| PilotError::Capture(format!("enumerate monitors: {e}")))?;
        if monitors.is_empty() {
            return Err(PilotError::Capture("no monitors found".into()));
        }

        match self.monitor_index {
            Some(idx) => {
                let count = monitors.len();
                monitors.into_iter().nth(idx).ok_or_else(|| {
                    PilotError::Capture(format!("monitor index {idx} out of range ({count} available)"))
                })
            }
            None => {
                let mut fallback = None;
                for monitor in monitors {
                    if monitor.is_primary().unwrap_or(false) {
                        return Ok(monitor);
                    }
                    fallback.get_or_insert(monitor);
                }
                fallback.ok_or_else(|| PilotError::Capture("no monitors found".into()))
            }
        }
    }
}

impl FrameSource for XcapFrameSource {
    fn capture(&self, region: Option<CaptureRegion>) -> PilotResult<Frame> {
        let monitor = self.pick_monitor()?;
        let mon_x = monitor
            .x()
            .map_err(|e| PilotError::Capture(format!("monitor x: {e}")))?;
        let mon_y = monitor
            .y()
            .map_err(|e| PilotError::Capture(format!("monitor y: {e}")))?;
        let image = monitor
            .capture_image()
            .map_err(|e| PilotError::Capture(format!("capture: {e}")))?;

        let monitor_origin = Point::new(mon_x, mon_y);
        let frame = match region {
            None => Frame::new(image, monitor_origin),
            Some(region) => crop_to_region(image, monitor_origin, region)?,
        };
        tracing::trace!(
            width = frame.width(),
            height = frame.height(),
            x = frame.origin.x,
            y = frame.origin.y,
            "frame captured"
        );
        Ok(frame)
    }
}

/// Cut `region` (screen coordinates) out of a monitor image whose top-left
/// sits at `monitor_origin`, clamped to the monitor bounds.
pub(crate) fn crop_to_region(
    image: image::RgbaImage,
    monitor_origin: Point,
    region: CaptureRegion,
) -> PilotResult<Frame> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let rx1 = (region.x - monitor_origin.x) as i64;
    let ry1 = (region.y - monitor_origin.y) as i64;
    let rx2 = rx1 + region.width as i64;
    let ry2 = ry1 + region.height as i64;

    let cx1 = rx1.clamp(0, w);
    let cy1 = ry1.clamp(0, h);
    let cx2 = rx2.clamp(0, w);
    let cy2 = ry2.clamp(0, h);
    if cx2 <= cx1 || cy2 <= cy1 {
        return Err(PilotError::Capture(format!(
            "capture region {region:?} does not overlap the monitor"
        )));
    }

    let cropped = image::imageops::crop_imm(
        &image,
        cx1 as u32,
        cy1 as u32,
        (cx2 - cx1) as u32,
        (cy2 - cy1) as u32,
    )
    .to_image();
    let origin = Point::new(
        monitor_origin.x + cx1 as i32,
        monitor_origin.y + cy1 as i32,
    );
    Ok(Frame::new(cropped, origin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_is_cropped_and_origin_kept_in_screen_space() {
        let img = image::RgbaImage::new(1920, 1080);
        let frame = crop_to_region(
            img,
            Point::new(1920, 0),
            CaptureRegion { x: 2000, y: 100, width: 300, height: 200 },
        )
        .unwrap();
        assert_eq!((frame.width(), frame.height()), (300, 200));
        assert_eq!(frame.origin, Point::new(2000, 100));
    }

    #[test]
    fn region_overhanging_the_monitor_is_clamped() {
        let img = image::RgbaImage::new(800, 600);
        let frame = crop_to_region(
            img,
            Point::new(0, 0),
            CaptureRegion { x: -50, y: 500, width: 200, height: 400 },
        )
        .unwrap();
        assert_eq!((frame.width(), frame.height()), (150, 100));
        assert_eq!(frame.origin, Point::new(0, 500));
    }

    #[test]
    fn disjoint_region_is_an_error() {
        let img = image::RgbaImage::new(800, 600);
        let err = crop_to_region(
            img,
            Point::new(0, 0),
            CaptureRegion { x: 900, y: 0, width: 10, height: 10 },
        )
        .unwrap_err();
        assert!(err.is_perception());
    }
}
