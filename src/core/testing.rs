//! In-memory stand-ins for the camera, the detector and the backend.

use crate::camera::{CameraDevice, StreamConstraints};
use crate::common::{FaceAttendError, Result};
use crate::core::detector::{FaceBox, FacePresence};
use crate::core::pose::CaptureKind;
use crate::core::submit::{PhotoPart, VerificationReply, Verifier};
use image::{DynamicImage, Rgb, RgbImage};
use std::cell::Cell;
use std::rc::Rc;

pub struct ScriptedCamera {
    streaming: bool,
    /// Successful acquires left before the camera starts refusing.
    acquires_left: Option<usize>,
    failing_grabs: usize,
    pub acquire_calls: usize,
    releases: Rc<Cell<usize>>,
}

impl ScriptedCamera {
    pub fn new() -> Self {
        Self {
            streaming: false,
            acquires_left: None,
            failing_grabs: 0,
            acquire_calls: 0,
            releases: Rc::new(Cell::new(0)),
        }
    }

    pub fn denied() -> Self {
        Self { acquires_left: Some(0), ..Self::new() }
    }

    /// Allow `n` more acquires, then refuse every one after.
    pub fn deny_after(&mut self, n: usize) {
        self.acquires_left = Some(n);
    }

    pub fn fail_next_grabs(&mut self, count: usize) {
        self.failing_grabs = count;
    }

    pub fn release_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.releases)
    }
}

impl CameraDevice for ScriptedCamera {
    fn acquire(&mut self, _constraints: &StreamConstraints) -> Result<()> {
        self.acquire_calls += 1;
        match self.acquires_left {
            Some(0) => {
                return Err(FaceAttendError::CameraAcquisition("permission denied".into()));
            }
            Some(left) => self.acquires_left = Some(left - 1),
            None => {}
        }
        self.streaming = true;
        Ok(())
    }

    fn grab_frame(&mut self) -> Result<DynamicImage> {
        if !self.streaming {
            return Err(FaceAttendError::Camera("not streaming".into()));
        }
        if self.failing_grabs > 0 {
            self.failing_grabs -= 1;
            return Err(FaceAttendError::Camera("frame timeout".into()));
        }
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([128, 100, 90]))))
    }

    fn release(&mut self) {
        self.streaming = false;
        self.releases.set(self.releases.get() + 1);
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }
}

/// Reports the same reading for every frame.
pub struct FixedDetector {
    reading: Option<f32>,
}

impl FixedDetector {
    pub fn new(reading: Option<f32>) -> Self {
        Self { reading }
    }
}

impl FacePresence for FixedDetector {
    fn detect_best(&self, _frame: &DynamicImage) -> Result<Option<FaceBox>> {
        Ok(self.reading.map(|confidence| FaceBox {
            x1: 10.0,
            y1: 8.0,
            x2: 50.0,
            y2: 40.0,
            confidence,
        }))
    }
}

pub enum Scripted {
    Reply { status: &'static str, message: &'static str },
    Fail { status: u16, message: &'static str },
}

pub struct RecordingVerifier {
    response: Scripted,
    pub calls: usize,
    pub last_kind: Option<CaptureKind>,
    pub last_fields: Vec<String>,
}

impl RecordingVerifier {
    pub fn new(response: Scripted) -> Self {
        Self {
            response,
            calls: 0,
            last_kind: None,
            last_fields: Vec::new(),
        }
    }
}

impl Verifier for RecordingVerifier {
    fn verify(&mut self, kind: CaptureKind, photos: &[PhotoPart]) -> Result<VerificationReply> {
        self.calls += 1;
        self.last_kind = Some(kind);
        self.last_fields = photos.iter().map(|p| p.field.clone()).collect();

        match &self.response {
            Scripted::Reply { status, message } => Ok(VerificationReply {
                status: status.to_string(),
                message: message.to_string(),
            }),
            Scripted::Fail { status, message } => Err(FaceAttendError::Api {
                status: *status,
                message: message.to_string(),
            }),
        }
    }
}
