use crate::common::Result;
use crate::core::detector::{FaceBox, FacePresence};
use image::DynamicImage;
use std::time::{Duration, Instant};

/// Minimum face-presence confidence before a frame may be kept.
pub const ACCEPT_THRESHOLD: f32 = 0.7;

/// One detector reading. Lives for a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionSample {
    pub confidence: f32,
}

impl DetectionSample {
    pub fn new(confidence: f32) -> Self {
        Self { confidence: confidence.clamp(0.0, 1.0) }
    }

    pub fn accepted(&self) -> bool {
        self.confidence >= ACCEPT_THRESHOLD
    }

    /// Whole percent, truncated so a rejected reading never shows the
    /// threshold value and an accepted one never shows less.
    pub fn percent(&self) -> u32 {
        let threshold = (ACCEPT_THRESHOLD * 100.0).round() as u32;
        let percent = (self.confidence * 100.0).floor() as u32;
        if self.accepted() {
            percent.max(threshold)
        } else {
            percent.min(threshold - 1)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Skip,
    Capture(f32),
}

/// Decides without user action when the live frame is good enough to keep.
/// Ticks are independent apart from the cooldown since the last fire.
#[derive(Debug)]
pub struct AutoCaptureTrigger {
    cooldown: Duration,
    last_fired: Option<Instant>,
    status: String,
}

impl AutoCaptureTrigger {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: None,
            status: "Waiting for a face...".to_string(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Latest user-facing status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn reset(&mut self) {
        self.last_fired = None;
        self.status = "Waiting for a face...".to_string();
    }

    /// Run the detector on `frame` and decide. `busy` is set while the session
    /// cannot accept a capture (one in flight or pacing not elapsed).
    pub fn on_tick<D: FacePresence + ?Sized>(
        &mut self,
        detector: &D,
        frame: &DynamicImage,
        busy: bool,
        now: Instant,
    ) -> (Decision, Option<FaceBox>) {
        let detection = detector.detect_best(frame);
        let face = detection.as_ref().ok().and_then(|f| f.clone());
        let decision = self.evaluate(detection.map(|f| f.map(|b| b.confidence)), busy, now);
        (decision, face)
    }

    pub fn evaluate(&mut self, detection: Result<Option<f32>>, busy: bool, now: Instant) -> Decision {
        let confidence = match detection {
            Err(e) => {
                tracing::warn!("Face detection failed this tick: {}", e);
                self.status = "Face detection unavailable, retrying...".to_string();
                return Decision::Skip;
            }
            Ok(None) => {
                self.status = "No face detected - position your face in the frame".to_string();
                return Decision::Skip;
            }
            Ok(Some(confidence)) => confidence,
        };

        let sample = DetectionSample::new(confidence);
        if !sample.accepted() {
            self.status = format!("Face detected ({}%) - hold still and face the camera", sample.percent());
            return Decision::Skip;
        }

        let cooling_down = self
            .last_fired
            .is_some_and(|fired| now.saturating_duration_since(fired) < self.cooldown);
        if busy || cooling_down {
            self.status = format!("Face detected ({}%)", sample.percent());
            return Decision::Skip;
        }

        tracing::debug!("Confidence {:.2} accepted, firing capture", sample.confidence);
        self.last_fired = Some(now);
        self.status = format!("Face detected ({}%) - capturing", sample.percent());
        Decision::Capture(sample.confidence)
    }
}
