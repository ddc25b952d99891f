/// ONNX YOLOv8 inference for ARK UI element detection.
///
/// Loads the exported detector and runs it on captured frames. Boxes come
/// back in frame pixel coordinates, labelled with the model's class names.
use crate::errors::{PilotError, PilotResult};
use crate::perception::traits::Detector;
use crate::perception::types::{Frame, RawDetection};

use ndarray::{Array4, ArrayViewD};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use regex::Regex;
use std::path::Path;

/// Custom metadata key under which Ultralytics exports store class names.
const NAMES_METADATA_KEY: &str = "names";

/// Letterbox geometry needed to map model space back to the frame.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    pad_x: f32,
    pad_y: f32,
    scale: f32,
    frame_w: u32,
    frame_h: u32,
}

#[derive(Debug, Clone)]
struct Candidate {
    bbox: [f32; 4],
    confidence: f32,
    class_id: usize,
}

/// Holds the ONNX Runtime session and inference configuration.
pub struct YoloDetector {
    session: Session,
    input_size: u32,
    iou_threshold: f32,
    class_names: Vec<String>,
}

impl YoloDetector {
    /// Load the model. An empty `class_names` means "use the names embedded
    /// in the model"; a model without any is rejected, since every lookup by
    /// element name would miss.
    pub fn load(
        model_path: &str,
        input_size: u32,
        iou_threshold: f32,
        class_names: Vec<String>,
    ) -> PilotResult<Self> {
        if !Path::new(model_path).exists() {
            return Err(PilotError::Detector(format!("model not found: {model_path}")));
        }
        let session = Session::builder()
            .map_err(|e| PilotError::Detector(format!("ort session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PilotError::Detector(format!("ort opt-level: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| PilotError::Detector(format!("ort load model: {e}")))?;

        let class_names = if class_names.is_empty() {
            embedded_class_names(&session)?
        } else {
            class_names
        };
        if class_names.iter().all(|n| n.is_empty()) {
            return Err(PilotError::Config(format!(
                "{model_path} carries no class names; set detector.class_names_file"
            )));
        }

        tracing::info!(
            path = %model_path,
            classes = class_names.len(),
            input_size,
            "YOLO detector loaded"
        );
        Ok(Self {
            session,
            input_size,
            iou_threshold,
            class_names,
        })
    }

    // ── Pre-processing ──────────────────────────────────────────────────────

    /// Resize + letterbox + normalise → NCHW f32 tensor.
    fn preprocess(&self, frame: &Frame) -> (Array4<f32>, Letterbox) {
        let sz = self.input_size;
        let (fw, fh) = (frame.width(), frame.height());
        let scale = (sz as f32 / fw as f32).min(sz as f32 / fh as f32);
        let nw = ((fw as f32 * scale).round() as u32).clamp(1, sz);
        let nh = ((fh as f32 * scale).round() as u32).clamp(1, sz);
        let pad_x = (sz - nw) as f32 / 2.0;
        let pad_y = (sz - nh) as f32 / 2.0;

        let resized = image::imageops::resize(
            &frame.image,
            nw,
            nh,
            image::imageops::FilterType::Triangle,
        );

        let mut tensor = Array4::<f32>::from_elem((1, 3, sz as usize, sz as usize), 114.0 / 255.0);
        let (ox, oy) = (pad_x.round() as u32, pad_y.round() as u32);
        for (x, y, p) in resized.enumerate_pixels() {
            let (tx, ty) = ((x + ox) as usize, (y + oy) as usize);
            if tx >= sz as usize || ty >= sz as usize {
                continue;
            }
            tensor[[0, 0, ty, tx]] = p[0] as f32 / 255.0;
            tensor[[0, 1, ty, tx]] = p[1] as f32 / 255.0;
            tensor[[0, 2, ty, tx]] = p[2] as f32 / 255.0;
        }

        let letterbox = Letterbox {
            pad_x,
            pad_y,
            scale,
            frame_w: fw,
            frame_h: fh,
        };
        (tensor, letterbox)
    }

    fn label_for(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &Frame, confidence: f32) -> PilotResult<Vec<RawDetection>> {
        let (input, letterbox) = self.preprocess(frame);
        let input_value = Tensor::from_array(input)
            .map_err(|e| PilotError::Detector(format!("ort tensor: {e}")))?;

        let output = {
            let outputs = self
                .session
                .run(ort::inputs![input_value])
                .map_err(|e| PilotError::Detector(format!("ort run: {e}")))?;
            outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| PilotError::Detector(format!("extract tensor: {e}")))?
                .to_owned()
        };

        let candidates = decode_output(&output.view(), confidence, letterbox)?;
        let kept = nms(&candidates, self.iou_threshold);
        let detections: Vec<RawDetection> = kept
            .into_iter()
            .map(|i| {
                let c = &candidates[i];
                RawDetection {
                    label: self.label_for(c.class_id),
                    confidence: c.confidence,
                    bbox: c.bbox,
                }
            })
            .collect();
        tracing::debug!(count = detections.len(), "YOLO detections");
        Ok(detections)
    }
}

// ── Post-processing ─────────────────────────────────────────────────────────

/// YOLOv8 output is `[1, 4 + num_classes, num_proposals]` with centre-size
/// boxes in letterboxed model space.
fn decode_output(
    output: &ArrayViewD<f32>,
    conf_threshold: f32,
    lb: Letterbox,
) -> PilotResult<Vec<Candidate>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[1] < 5 {
        return Err(PilotError::Detector(format!(
            "unexpected output shape: {shape:?}"
        )));
    }
    let num_classes = shape[1] - 4;
    let num_preds = shape[2];
    let (fw, fh) = (lb.frame_w as f32, lb.frame_h as f32);

    let mut out = Vec::new();
    for i in 0..num_preds {
        let mut best = 0.0f32;
        let mut best_class = 0usize;
        for c in 0..num_classes {
            let s = output[[0, 4 + c, i]];
            if s > best {
                best = s;
                best_class = c;
            }
        }
        if best < conf_threshold {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];
        let x1 = ((cx - w / 2.0 - lb.pad_x) / lb.scale).clamp(0.0, fw);
        let y1 = ((cy - h / 2.0 - lb.pad_y) / lb.scale).clamp(0.0, fh);
        let x2 = ((cx + w / 2.0 - lb.pad_x) / lb.scale).clamp(0.0, fw);
        let y2 = ((cy + h / 2.0 - lb.pad_y) / lb.scale).clamp(0.0, fh);

        out.push(Candidate {
            bbox: [x1, y1, x2, y2],
            confidence: best.min(1.0),
            class_id: best_class,
        });
    }
    Ok(out)
}

/// Greedy per-class NMS. Returns kept indices, highest confidence first.
fn nms(dets: &[Candidate], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..dets.len()).collect();
    order.sort_by(|&a, &b| dets[b].confidence.total_cmp(&dets[a].confidence));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];
    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);
        for &j in &order[pos + 1..] {
            if !suppressed[j]
                && dets[i].class_id == dets[j].class_id
                && iou(&dets[i].bbox, &dets[j].bbox) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

fn embedded_class_names(session: &Session) -> PilotResult<Vec<String>> {
    let metadata = session
        .metadata()
        .map_err(|e| PilotError::Detector(format!("ort metadata: {e}")))?;
    // ort 2.0.0-rc.13 reports lookup failures as `None`.
    let raw = metadata.custom(NAMES_METADATA_KEY);
    match raw {
        Some(raw) => {
            let names = parse_names_metadata(&raw);
            tracing::debug!(classes = names.len(), "class names read from model metadata");
            Ok(names)
        }
        None => Ok(Vec::new()),
    }
}

/// Parse the `{0: 'inventory_tab', 1: 'craft_button'}` dict literal that
/// YOLO exports embed. Ids missing from the dict keep an empty slot.
fn parse_names_metadata(raw: &str) -> Vec<String> {
    let Ok(entry) = Regex::new(r#"(\d+)\s*:\s*(?:'([^']*)'|"([^"]*)")"#) else {
        return Vec::new();
    };
    let mut names: Vec<String> = Vec::new();
    for caps in entry.captures_iter(raw) {
        let Ok(id) = caps[1].parse::<usize>() else {
            continue;
        };
        let Some(name) = caps.get(2).or_else(|| caps.get(3)) else {
            continue;
        };
        if names.len() <= id {
            names.resize(id + 1, String::new());
        }
        names[id] = name.as_str().trim().to_string();
    }
    names
}

/// Read class names, one per line; line index is the class id.
/// Blank lines keep their slot so ids stay aligned with training.
pub fn load_class_names(path: &Path) -> PilotResult<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let names: Vec<String> = content.lines().map(|l| l.trim().to_string()).collect();
    if names.iter().all(|n| n.is_empty()) {
        return Err(PilotError::Config(format!(
            "class names file {} is empty",
            path.display()
        )));
    }
    Ok(names)
}
