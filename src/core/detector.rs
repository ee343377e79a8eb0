use crate::common::{Config, FaceAttendError, Result};
use crate::common::config::DetectorConfig;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::sync::Arc;

const NMS_IOU_THRESHOLD: f32 = 0.45;
const MIN_BOX_SIDE: f32 = 10.0;
const MAX_FACES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

/// Local, lightweight "is there a usable face here" check. It only decides
/// when to snap a photo; identity is verified by the backend.
pub trait FacePresence {
    /// Best face in the frame, if any.
    fn detect_best(&self, frame: &DynamicImage) -> Result<Option<FaceBox>>;
}

pub struct FaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    config: DetectorConfig,
}

impl FaceDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = &config.models.detector_path;
        if !model_path.exists() {
            return Err(FaceAttendError::Model(
                format!("Detector model not found at: {:?}", model_path)
            ));
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .build()
                .map_err(|e| FaceAttendError::Model(format!("Failed to create environment: {}", e)))?
        );

        let opt_level = match config.performance.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };

        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(opt_level)?
            .with_model_from_file(model_path)?;

        tracing::info!("Face detector loaded from {}", model_path.display());

        Ok(Self {
            session,
            _environment: environment,
            config: config.detector.clone(),
        })
    }

    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;
        let (input_w, input_h) = (self.config.input_width, self.config.input_height);

        let img_array = if image.width() == input_w && image.height() == input_h {
            image_to_array(image)
        } else {
            let resized = image.resize_exact(input_w, input_h, FilterType::Nearest);
            image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let Some(first) = outputs.first() else {
            tracing::warn!("Detector produced no outputs");
            return Ok(Vec::new());
        };
        let tensor = first.try_extract::<f32>()?;
        let view = tensor.view();
        let shape = view.shape().to_vec();
        let data: Vec<f32> = view.iter().copied().collect();

        let mut faces = decode_predictions(&data, &shape, input_w as f32, input_h as f32);
        faces = apply_nms(faces, NMS_IOU_THRESHOLD);
        faces.retain(|face| face.confidence >= self.config.score_threshold);
        faces.truncate(MAX_FACES);

        let scale_x = orig_width / input_w as f32;
        let scale_y = orig_height / input_h as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        Ok(faces)
    }
}

impl FacePresence for FaceDetector {
    fn detect_best(&self, frame: &DynamicImage) -> Result<Option<FaceBox>> {
        Ok(self.detect(frame)?.into_iter().next())
    }
}

fn image_to_array(img: &DynamicImage) -> Array4<f32> {
    // Grayscale replicated across the three input channels
    let gray = img.to_luma8();
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let mut array = Array4::<f32>::zeros((1, 3, height, width));
    let norm_factor = 1.0 / 255.0;

    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = pixel[0] as f32 * norm_factor;
        let (x, y) = (x as usize, y as usize);
        array[[0, 0, y, x]] = value;
        array[[0, 1, y, x]] = value;
        array[[0, 2, y, x]] = value;
    }

    array
}

/// Decode YOLO-style output, either `[1, N, 5+]` or transposed `[1, 5+, N]`,
/// into corner boxes in detector input coordinates. Boxes are returned
/// sorted by confidence, unfiltered apart from degenerate geometry.
pub fn decode_predictions(data: &[f32], shape: &[usize], input_w: f32, input_h: f32) -> Vec<FaceBox> {
    let (num_predictions, prediction_length, is_transposed) = match shape {
        // A transposed layout needs at least box plus score rows
        [_, a, b] if b > a && (5..=10).contains(a) => (*b, *a, true),
        [_, a, b] => (*a, *b, false),
        [a, b] => (*a, *b, false),
        _ => {
            tracing::warn!("Unexpected output shape: {:?}", shape);
            return Vec::new();
        }
    };

    if prediction_length < 4 || data.len() < num_predictions * prediction_length {
        tracing::warn!("Detector output too short for shape {:?}", shape);
        return Vec::new();
    }

    let at = |i: usize, field: usize| -> f32 {
        if is_transposed {
            data[field * num_predictions + i]
        } else {
            data[i * prediction_length + field]
        }
    };

    let mut faces = Vec::new();
    for i in 0..num_predictions {
        let confidence = if prediction_length > 4 { at(i, 4) } else { 0.0 };
        if confidence <= 0.001 {
            continue;
        }

        let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));

        // Normalised coordinates get scaled up to input pixels
        let normalised = cx <= 1.0 && cy <= 1.0 && w <= 1.0 && h <= 1.0;
        let (scale_x, scale_y) = if normalised { (input_w, input_h) } else { (1.0, 1.0) };
        let (cx, cy, w, h) = (cx * scale_x, cy * scale_y, w * scale_x, h * scale_y);

        let x1 = (cx - w / 2.0).max(0.0);
        let y1 = (cy - h / 2.0).max(0.0);
        let x2 = (cx + w / 2.0).min(input_w);
        let y2 = (cy + h / 2.0).min(input_h);

        if x2 - x1 > MIN_BOX_SIDE && y2 - y1 > MIN_BOX_SIDE {
            faces.push(FaceBox { x1, y1, x2, y2, confidence });
        }
    }

    faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    faces
}

pub fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| calculate_iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn calculate_iou(box1: &FaceBox, box2: &FaceBox) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1.x2 - box1.x1) * (box1.y2 - box1.y1);
    let area2 = (box2.x2 - box2.x1) * (box2.y2 - box2.y1);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
