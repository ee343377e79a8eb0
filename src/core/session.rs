//! Capture session controller.
//!
//! A session owns the camera and the shot buffer for a single check-in or
//! enrollment attempt:
//!
//! ```text
//! Idle -> CameraActive -> Capturing -> (loop) -> ReadyToSubmit -> Submitting
//!                                                   -> Succeeded | Failed -> Idle
//! ```
//!
//! Only one capture may be in flight. `begin_capture` raises the flag and
//! `complete_capture` always lowers it, whatever happened to the frame. Shots
//! are stored in completion order, and the session is full after the N-th
//! stored shot, not the N-th attempt.

use crate::camera::{CameraDevice, StreamConstraints};
use crate::common::{Config, FaceAttendError, Result};
use crate::core::detector::{FaceBox, FacePresence};
use crate::core::pose::{CaptureKind, PoseGuide};
use crate::core::shots::{encode_jpeg, PreviewRegistry, Shot};
use crate::core::submit::{Outcome, PhotoPart};
use crate::core::trigger::{AutoCaptureTrigger, Decision};
use image::DynamicImage;
use std::fmt;
use std::time::{Duration, Instant};

const DEFAULT_PACING: Duration = Duration::from_millis(800);
const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    CameraActive,
    Capturing,
    ReadyToSubmit,
    Submitting,
    Succeeded,
    Failed,
}

impl SessionState {
    /// Camera is live and shots may still be taken.
    pub fn is_capturing(self) -> bool {
        matches!(self, SessionState::CameraActive | SessionState::Capturing)
    }
}

/// How shots get taken. Chosen once per session, never mixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureMode {
    /// The user triggers every shot and may delete and retake them.
    Manual,
    /// The local detector fires captures, at most once per `cooldown`.
    Automatic { cooldown: Duration },
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub kind: CaptureKind,
    pub mode: CaptureMode,
    /// Minimum gap between stored shots, so the subject can change pose.
    pub pacing: Duration,
    pub jpeg_quality: u8,
    pub constraints: StreamConstraints,
}

impl SessionSettings {
    pub fn new(kind: CaptureKind, mode: CaptureMode) -> Self {
        Self {
            kind,
            mode,
            pacing: DEFAULT_PACING,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            constraints: StreamConstraints::default(),
        }
    }

    pub fn from_config(kind: CaptureKind, mode: CaptureMode, config: &Config) -> Self {
        Self {
            kind,
            mode,
            pacing: config.capture.pacing(),
            jpeg_quality: config.capture.jpeg_quality,
            constraints: StreamConstraints {
                ideal_width: config.camera.width,
                ideal_height: config.camera.height,
            },
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    CameraStarted,
    ShotCaptured { position: usize, total: usize },
    ShotDeleted { position: usize },
    ReadyToSubmit { total: usize },
    CameraStopped,
    Reset,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::CameraStarted => write!(f, "Camera active, position your face"),
            SessionEvent::ShotCaptured { position, total } => {
                write!(f, "Photo {} of {} captured", position, total)
            }
            SessionEvent::ShotDeleted { position } => write!(f, "Photo {} deleted", position),
            SessionEvent::ReadyToSubmit { total } => write!(f, "All {} photos captured", total),
            SessionEvent::CameraStopped => write!(f, "Camera stopped"),
            SessionEvent::Reset => write!(f, "Session reset"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Shot stored at 1-based `position`, more are needed.
    Stored { position: usize, total: usize },
    /// The last required shot was stored; the camera is released.
    Completed { total: usize },
    /// The frame could not be grabbed or encoded. Nothing was counted.
    Dropped,
    /// Not accepted: wrong state, full, in flight or pacing.
    Ignored,
}

/// Proof that a capture was started. Must be handed back to
/// [`CaptureSession::complete_capture`].
#[derive(Debug)]
#[must_use]
pub struct CaptureTicket {
    position: usize,
    generation: u64,
}

impl CaptureTicket {
    pub fn position(&self) -> usize {
        self.position
    }
}

#[derive(Debug)]
pub struct TickReport {
    pub decision: Decision,
    pub status: String,
    pub frame: Option<DynamicImage>,
    pub face: Option<FaceBox>,
    pub capture: Option<CaptureOutcome>,
}

impl TickReport {
    fn idle(status: impl Into<String>) -> Self {
        Self {
            decision: Decision::Skip,
            status: status.into(),
            frame: None,
            face: None,
            capture: None,
        }
    }
}

/// Comparable view of everything a session holds. A session after a full
/// reset has the same snapshot as a freshly built one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub shots: usize,
    pub live_previews: usize,
    pub camera_streaming: bool,
    pub capture_in_flight: bool,
    pub pacing_armed: bool,
    pub resume_at: Option<usize>,
    pub has_outcome: bool,
}

pub struct CaptureSession<C: CameraDevice> {
    settings: SessionSettings,
    camera: C,
    state: SessionState,
    shots: Vec<Shot>,
    previews: PreviewRegistry,
    capture_in_flight: bool,
    next_capture_at: Option<Instant>,
    resume_at: Option<usize>,
    trigger: Option<AutoCaptureTrigger>,
    ready: bool,
    outcome: Option<Outcome>,
    events: Vec<SessionEvent>,
    /// Bumped on every discard so tickets from an abandoned attempt are stale.
    generation: u64,
}

impl<C: CameraDevice> CaptureSession<C> {
    pub fn new(settings: SessionSettings, camera: C) -> Self {
        let (trigger, ready) = match settings.mode {
            CaptureMode::Manual => (None, true),
            // Automatic sessions wait for the detector before the camera may start
            CaptureMode::Automatic { cooldown } => (Some(AutoCaptureTrigger::new(cooldown)), false),
        };

        Self {
            settings,
            camera,
            state: SessionState::Idle,
            shots: Vec::new(),
            previews: PreviewRegistry::new(),
            capture_in_flight: false,
            next_capture_at: None,
            resume_at: None,
            trigger,
            ready,
            outcome: None,
            events: Vec::new(),
            generation: 0,
        }
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn kind(&self) -> CaptureKind {
        self.settings.kind
    }

    pub fn mode(&self) -> CaptureMode {
        self.settings.mode
    }

    pub fn required_shots(&self) -> usize {
        self.settings.kind.required_shots()
    }

    pub fn shots(&self) -> &[Shot] {
        &self.shots
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Slot the next capture will fill.
    pub fn next_position(&self) -> usize {
        self.resume_at.unwrap_or(self.shots.len()).min(self.shots.len())
    }

    pub fn current_pose(&self) -> Option<&'static PoseGuide> {
        if self.shots.len() >= self.required_shots() {
            return None;
        }
        self.settings.kind.pose(self.next_position())
    }

    pub fn status(&self) -> &str {
        match &self.trigger {
            Some(trigger) => trigger.status(),
            None => "Press Space to take a photo",
        }
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            shots: self.shots.len(),
            live_previews: self.previews.live_count(),
            camera_streaming: self.camera.is_streaming(),
            capture_in_flight: self.capture_in_flight,
            pacing_armed: self.next_capture_at.is_some(),
            resume_at: self.resume_at,
            has_outcome: self.outcome.is_some(),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(FaceAttendError::InvalidOperation(format!(
                "camera can only be started from Idle, session is {:?}", self.state
            )));
        }
        if !self.ready {
            return Err(FaceAttendError::NotReady(
                "face detector is still loading, please wait".into()
            ));
        }

        if let Err(e) = self.camera.acquire(&self.settings.constraints) {
            self.camera.release();
            tracing::warn!("Camera acquisition failed: {}", e);
            return Err(match e {
                FaceAttendError::CameraAcquisition(_) => e,
                other => FaceAttendError::CameraAcquisition(other.to_string()),
            });
        }

        if let Some(trigger) = self.trigger.as_mut() {
            trigger.reset();
        }
        self.state = SessionState::CameraActive;
        self.events.push(SessionEvent::CameraStarted);
        tracing::info!("{} session started, {} photos required", self.settings.kind, self.required_shots());
        Ok(())
    }

    fn pacing_pending(&self, now: Instant) -> bool {
        self.next_capture_at.is_some_and(|at| now < at)
    }

    /// Reserve the next slot. `None` means the capture is silently ignored.
    pub fn begin_capture(&mut self, now: Instant) -> Option<CaptureTicket> {
        if !self.state.is_capturing()
            || self.shots.len() >= self.required_shots()
            || self.capture_in_flight
            || self.pacing_pending(now)
        {
            return None;
        }

        self.capture_in_flight = true;
        self.state = SessionState::Capturing;
        Some(CaptureTicket {
            position: self.next_position(),
            generation: self.generation,
        })
    }

    pub fn complete_capture(
        &mut self,
        ticket: CaptureTicket,
        frame: Result<DynamicImage>,
        now: Instant,
    ) -> CaptureOutcome {
        if ticket.generation != self.generation {
            tracing::debug!("Discarding frame from an abandoned attempt");
            return CaptureOutcome::Dropped;
        }
        self.capture_in_flight = false;

        if self.state != SessionState::Capturing {
            tracing::debug!("Discarding frame for slot {}, session is {:?}", ticket.position + 1, self.state);
            return CaptureOutcome::Dropped;
        }

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to grab frame for photo {}: {}", ticket.position + 1, e);
                return CaptureOutcome::Dropped;
            }
        };

        let jpeg = match encode_jpeg(&frame, self.settings.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                tracing::warn!("Failed to encode photo {}: {}", ticket.position + 1, e);
                return CaptureOutcome::Dropped;
            }
        };

        let preview = self.previews.create(&frame);
        let position = ticket.position.min(self.shots.len());
        self.shots.insert(position, Shot {
            jpeg,
            preview,
            width: frame.width(),
            height: frame.height(),
        });
        self.resume_at = None;

        let total = self.required_shots();
        tracing::info!("Captured photo {}/{} ({}x{})", position + 1, total, frame.width(), frame.height());
        self.events.push(SessionEvent::ShotCaptured { position: position + 1, total });

        if self.shots.len() == total {
            self.camera.release();
            self.events.push(SessionEvent::CameraStopped);
            self.next_capture_at = None;
            self.state = SessionState::ReadyToSubmit;
            self.events.push(SessionEvent::ReadyToSubmit { total });
            CaptureOutcome::Completed { total }
        } else {
            self.next_capture_at = Some(now + self.settings.pacing);
            CaptureOutcome::Stored { position: position + 1, total }
        }
    }

    /// Grab the current frame and keep it.
    pub fn capture_frame(&mut self, now: Instant) -> CaptureOutcome {
        let Some(ticket) = self.begin_capture(now) else {
            return CaptureOutcome::Ignored;
        };
        let frame = self.camera.grab_frame();
        self.complete_capture(ticket, frame, now)
    }

    /// One pass of the automatic loop: grab, detect, maybe keep the frame.
    pub fn tick<D: FacePresence + ?Sized>(&mut self, detector: &D, now: Instant) -> TickReport {
        if self.trigger.is_none() {
            return TickReport::idle(self.status());
        }
        if !self.state.is_capturing() || self.shots.len() >= self.required_shots() {
            return TickReport::idle(self.status());
        }

        let frame = match self.camera.grab_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to read camera frame: {}", e);
                return TickReport::idle("Camera frame unavailable, retrying...");
            }
        };

        let busy = self.capture_in_flight || self.pacing_pending(now);
        let Some(trigger) = self.trigger.as_mut() else {
            return TickReport::idle("Manual capture");
        };
        let (decision, face) = trigger.on_tick(detector, &frame, busy, now);
        let status = trigger.status().to_string();

        let capture = match decision {
            Decision::Capture(_) => self
                .begin_capture(now)
                .map(|ticket| self.complete_capture(ticket, Ok(frame.clone()), now)),
            Decision::Skip => None,
        };

        TickReport {
            decision,
            status,
            frame: Some(frame),
            face,
            capture,
        }
    }

    /// Current camera frame for a live preview, without keeping it.
    pub fn live_frame(&mut self) -> Result<DynamicImage> {
        if !self.state.is_capturing() {
            return Err(FaceAttendError::InvalidOperation("camera is not active".into()));
        }
        self.camera.grab_frame()
    }

    /// Remove the shot at `index` (0-based). The next capture refills that
    /// slot so pose guides stay positional.
    pub fn delete_shot(&mut self, index: usize) -> Result<()> {
        if self.settings.mode != CaptureMode::Manual {
            return Err(FaceAttendError::InvalidOperation(
                "photos can only be deleted in manual mode".into()
            ));
        }
        if !matches!(
            self.state,
            SessionState::CameraActive | SessionState::Capturing | SessionState::ReadyToSubmit
        ) {
            return Err(FaceAttendError::InvalidOperation(format!(
                "cannot delete photos while {:?}", self.state
            )));
        }
        if self.capture_in_flight {
            return Err(FaceAttendError::InvalidOperation("a capture is in progress".into()));
        }
        if index >= self.shots.len() {
            return Err(FaceAttendError::InvalidOperation(format!(
                "no photo at position {}", index + 1
            )));
        }

        let shot = self.shots.remove(index);
        self.previews.release(shot.preview);
        self.resume_at = Some(self.resume_at.map_or(index, |at| at.min(index)));
        self.events.push(SessionEvent::ShotDeleted { position: index + 1 });
        tracing::info!("Deleted photo {}", index + 1);

        if self.state == SessionState::ReadyToSubmit {
            if let Err(e) = self.camera.acquire(&self.settings.constraints) {
                tracing::warn!("Could not restart camera after delete: {}", e);
                self.discard_all();
                self.state = SessionState::Idle;
                self.events.push(SessionEvent::Reset);
                return Err(FaceAttendError::CameraAcquisition(e.to_string()));
            }
            self.events.push(SessionEvent::CameraStarted);
            self.state = SessionState::Capturing;
        }
        Ok(())
    }

    /// Release the camera. Idempotent. Stopping a live capture cancels it.
    pub fn stop(&mut self) {
        self.camera.release();
        if self.state.is_capturing() {
            tracing::info!("Capture stopped, discarding {} photo(s)", self.shots.len());
            self.discard_all();
            self.state = SessionState::Idle;
            self.events.push(SessionEvent::Reset);
        }
    }

    /// Abandon the attempt from any state except `Submitting`.
    pub fn cancel(&mut self) -> Result<()> {
        tracing::info!("Session cancelled");
        self.reset()
    }

    /// Full reset to a fresh `Idle` session.
    pub fn reset(&mut self) -> Result<()> {
        if self.state == SessionState::Submitting {
            return Err(FaceAttendError::InvalidOperation(
                "a submission is in progress and cannot be interrupted".into()
            ));
        }
        self.discard_all();
        self.state = SessionState::Idle;
        self.events.push(SessionEvent::Reset);
        Ok(())
    }

    fn discard_all(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.camera.release();
        for shot in self.shots.drain(..) {
            self.previews.release(shot.preview);
        }
        self.previews.release_all();
        self.capture_in_flight = false;
        self.next_capture_at = None;
        self.resume_at = None;
        self.outcome = None;
        if let Some(trigger) = self.trigger.as_mut() {
            trigger.reset();
        }
    }

    pub(crate) fn begin_submission(&mut self) -> Result<Vec<PhotoPart>> {
        let required = self.required_shots();
        if self.state != SessionState::ReadyToSubmit || self.shots.len() != required {
            return Err(FaceAttendError::NotReady(format!(
                "{} photos are required before submitting, have {}",
                required, self.shots.len()
            )));
        }

        self.state = SessionState::Submitting;
        Ok(PhotoPart::from_shots(&self.shots))
    }

    pub(crate) fn finish_success(&mut self, outcome: Outcome) {
        self.discard_all();
        self.outcome = Some(outcome);
        self.state = SessionState::Succeeded;
    }

    pub(crate) fn finish_failure(&mut self) {
        self.state = SessionState::Failed;
        self.discard_all();
        self.state = SessionState::Idle;
        self.events.push(SessionEvent::Reset);
    }
}

impl<C: CameraDevice> Drop for CaptureSession<C> {
    fn drop(&mut self) {
        self.camera.release();
    }
}
