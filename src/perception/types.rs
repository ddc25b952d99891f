use serde::{Deserialize, Serialize};

/// A screen position in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Axis-aligned box in screen pixels. Always `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

impl BoundingBox {
    /// Returns `None` for empty or inverted boxes.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Option<Self> {
        (x1 < x2 && y1 < y2).then_some(Self { x1, y1, x2, y2 })
    }

    pub fn corners(&self) -> (i32, i32, i32, i32) {
        (self.x1, self.y1, self.x2, self.y2)
    }

    /// Integer midpoint, rounded towards the top-left like the detector's pixel grid.
    pub fn center(&self) -> Point {
        Point::new(
            self.x1 + (self.x2 - self.x1) / 2,
            self.y1 + (self.y2 - self.y1) / 2,
        )
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x1 && p.x < self.x2 && p.y >= self.y1 && p.y < self.y2
    }
}

/// One detector hit as produced by a [`Detector`](super::traits::Detector),
/// in frame-relative pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` relative to the frame's top-left corner.
    pub bbox: [f32; 4],
}

/// One observed instance of a named UI element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub element_name: String,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
}

impl DetectionRecord {
    pub fn new(element_name: impl Into<String>, bounding_box: BoundingBox, confidence: f32) -> Self {
        Self {
            element_name: element_name.into(),
            bounding_box,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Translate a raw detection from frame space into screen space.
    /// Degenerate boxes (after rounding) yield `None`.
    pub fn from_raw(raw: &RawDetection, origin: Point) -> Option<Self> {
        let [x1, y1, x2, y2] = raw.bbox;
        let bbox = BoundingBox::new(
            x1.round() as i32 + origin.x,
            y1.round() as i32 + origin.y,
            x2.round() as i32 + origin.x,
            y2.round() as i32 + origin.y,
        )?;
        Some(Self::new(raw.label.clone(), bbox, raw.confidence))
    }

    pub fn center(&self) -> Point {
        self.bounding_box.center()
    }

    pub fn width(&self) -> i32 {
        self.bounding_box.width()
    }

    pub fn height(&self) -> i32 {
        self.bounding_box.height()
    }

    pub fn area(&self) -> i64 {
        self.bounding_box.area()
    }
}

/// Screen rectangle to capture instead of the whole monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// A captured raster plus where its top-left pixel sits on screen.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: image::RgbaImage,
    pub origin: Point,
}

impl Frame {
    pub fn new(image: image::RgbaImage, origin: Point) -> Self {
        Self { image, origin }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_geometry_follows_box() {
        let rec = DetectionRecord::new("craft_button", BoundingBox::new(10, 10, 30, 30).unwrap(), 0.9);
        assert_eq!(rec.center(), Point::new(20, 20));
        assert_eq!(rec.width(), 20);
        assert_eq!(rec.height(), 20);
        assert_eq!(rec.area(), 400);
    }

    #[test]
    fn odd_sized_box_center_rounds_down() {
        let b = BoundingBox::new(0, 0, 5, 3).unwrap();
        assert_eq!(b.center(), Point::new(2, 1));
    }

    #[test]
    fn degenerate_boxes_are_rejected() {
        assert!(BoundingBox::new(10, 10, 10, 20).is_none());
        assert!(BoundingBox::new(10, 20, 30, 5).is_none());
    }

    #[test]
    fn raw_detection_is_translated_by_frame_origin() {
        let raw = RawDetection {
            label: "health_bar".into(),
            confidence: 0.8,
            bbox: [1.4, 2.6, 11.0, 13.0],
        };
        let rec = DetectionRecord::from_raw(&raw, Point::new(100, 200)).unwrap();
        assert_eq!(rec.bounding_box.corners(), (101, 203, 111, 213));
    }

    #[test]
    fn raw_detection_collapsing_to_zero_width_is_dropped() {
        let raw = RawDetection {
            label: "slot".into(),
            confidence: 0.5,
            bbox: [4.2, 0.0, 4.4, 9.0],
        };
        assert!(DetectionRecord::from_raw(&raw, Point::new(0, 0)).is_none());
    }
}
