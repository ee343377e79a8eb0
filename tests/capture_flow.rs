use chrono::{Local, TimeZone};
use faceattend::core::{Decision, Punctuality, SessionEvent};
use faceattend::{
    CameraDevice, CaptureKind, CaptureMode, CaptureOutcome, CaptureSession, FaceAttendError, FaceBox,
    FacePresence, Outcome, PhotoPart, Result, SessionSettings, SessionState, Severity, StreamConstraints,
    VerificationReply, Verifier,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::time::{Duration, Instant};

struct FakeCamera {
    streaming: bool,
    frames_served: u8,
}

impl FakeCamera {
    fn new() -> Self {
        Self { streaming: false, frames_served: 0 }
    }
}

impl CameraDevice for FakeCamera {
    fn acquire(&mut self, _constraints: &StreamConstraints) -> Result<()> {
        self.streaming = true;
        Ok(())
    }

    fn grab_frame(&mut self) -> Result<DynamicImage> {
        if !self.streaming {
            return Err(FaceAttendError::Camera("not streaming".into()));
        }
        // Distinct shade per frame so slots can be told apart after decoding
        self.frames_served = self.frames_served.wrapping_add(40);
        let shade = self.frames_served;
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, Rgb([shade, shade, shade]))))
    }

    fn release(&mut self) {
        self.streaming = false;
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }
}

struct SteadyFace(f32);

impl FacePresence for SteadyFace {
    fn detect_best(&self, _frame: &DynamicImage) -> Result<Option<FaceBox>> {
        Ok(Some(FaceBox { x1: 4.0, y1: 4.0, x2: 28.0, y2: 20.0, confidence: self.0 }))
    }
}

enum Reply {
    Status(&'static str, &'static str),
    Unreachable,
}

struct Backend {
    reply: Reply,
    calls: usize,
    received: usize,
}

impl Backend {
    fn new(reply: Reply) -> Self {
        Self { reply, calls: 0, received: 0 }
    }
}

impl Verifier for Backend {
    fn verify(&mut self, _kind: CaptureKind, photos: &[PhotoPart]) -> Result<VerificationReply> {
        self.calls += 1;
        self.received = photos.len();
        match self.reply {
            Reply::Status(status, message) => Ok(VerificationReply {
                status: status.to_string(),
                message: message.to_string(),
            }),
            Reply::Unreachable => Err(FaceAttendError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

fn auto_session(cooldown: Duration) -> CaptureSession<FakeCamera> {
    let settings = SessionSettings::new(CaptureKind::CheckIn, CaptureMode::Automatic { cooldown })
        .with_pacing(cooldown);
    let mut session = CaptureSession::new(settings, FakeCamera::new());
    session.set_ready(true);
    session.start().unwrap();
    session
}

fn manual_session(kind: CaptureKind) -> CaptureSession<FakeCamera> {
    let settings = SessionSettings::new(kind, CaptureMode::Manual).with_pacing(Duration::ZERO);
    let mut session = CaptureSession::new(settings, FakeCamera::new());
    session.start().unwrap();
    session
}

fn fill(session: &mut CaptureSession<FakeCamera>) {
    let now = Instant::now();
    while session.state() != SessionState::ReadyToSubmit {
        assert_ne!(session.capture_frame(now), CaptureOutcome::Ignored);
    }
}

fn morning() -> chrono::DateTime<Local> {
    Local.with_ymd_and_hms(2024, 5, 6, 8, 15, 0).unwrap()
}

fn fresh_snapshot(kind: CaptureKind) -> faceattend::SessionSnapshot {
    let settings = SessionSettings::new(kind, CaptureMode::Manual);
    CaptureSession::new(settings, FakeCamera::new()).snapshot()
}

#[test]
fn automatic_check_in_succeeds() {
    let mut session = auto_session(Duration::from_millis(800));
    let detector = SteadyFace(0.9);
    let t0 = Instant::now();

    let mut fired = 0;
    for second in 0..3 {
        let report = session.tick(&detector, t0 + Duration::from_secs(second));
        if let Decision::Capture(_) = report.decision {
            fired += 1;
        }
    }
    assert_eq!(fired, 3);
    assert_eq!(session.state(), SessionState::ReadyToSubmit);
    assert!(!session.camera().is_streaming());

    let mut backend = Backend::new(Reply::Status("sukses", "ok"));
    let outcome = session.submit(&mut backend, morning()).unwrap();

    assert_eq!(backend.received, 3);
    assert_eq!(outcome, Outcome::Success {
        message: "ok".into(),
        punctuality: Some(Punctuality::OnTime),
    });
    assert_eq!(session.state(), SessionState::Succeeded);
    assert_eq!(session.outcome().map(Outcome::message), Some("ok"));
}

#[test]
fn extra_ticks_inside_cooldown_do_not_capture() {
    let mut session = auto_session(Duration::from_millis(800));
    let detector = SteadyFace(0.95);
    let t0 = Instant::now();

    session.tick(&detector, t0);
    for ms in [200, 400, 600] {
        session.tick(&detector, t0 + Duration::from_millis(ms));
    }
    assert_eq!(session.shots().len(), 1);
}

#[test]
fn rejected_check_in_resets_to_fresh_idle() {
    let mut session = manual_session(CaptureKind::CheckIn);
    fill(&mut session);

    let mut backend = Backend::new(Reply::Status("gagal", "no match"));
    let outcome = session.submit(&mut backend, morning()).unwrap();

    assert_eq!(outcome, Outcome::Rejected { message: "no match".into() });
    assert_eq!(outcome.severity(), Severity::Info);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.shots().is_empty());
    assert_eq!(session.snapshot(), fresh_snapshot(CaptureKind::CheckIn));
    assert_eq!(session.snapshot().live_previews, 0);
}

#[test]
fn transport_failure_resets_with_error_severity() {
    let mut session = manual_session(CaptureKind::Enrollment);
    fill(&mut session);

    let mut backend = Backend::new(Reply::Unreachable);
    let outcome = session.submit(&mut backend, morning()).unwrap();

    assert_eq!(outcome.severity(), Severity::Error);
    assert!(matches!(outcome, Outcome::TransportError { .. }));
    assert_eq!(session.snapshot(), fresh_snapshot(CaptureKind::Enrollment));
}

#[test]
fn wrong_count_never_reaches_backend() {
    let mut session = manual_session(CaptureKind::Enrollment);
    let now = Instant::now();
    for _ in 0..4 {
        session.capture_frame(now);
    }

    let mut backend = Backend::new(Reply::Status("sukses", "ok"));
    let err = session.submit(&mut backend, morning()).unwrap_err();

    assert!(matches!(err, FaceAttendError::NotReady(_)));
    assert_eq!(backend.calls, 0);
    assert_eq!(session.shots().len(), 4);
}

#[test]
fn delete_and_retake_keeps_slot_order() {
    let mut session = manual_session(CaptureKind::CheckIn);
    fill(&mut session);
    let first = session.shots()[0].jpeg.clone();
    let third = session.shots()[2].jpeg.clone();

    session.delete_shot(1).unwrap();
    assert_eq!(session.shots().len(), 2);
    assert_eq!(session.state(), SessionState::Capturing);

    assert_eq!(session.capture_frame(Instant::now()), CaptureOutcome::Completed { total: 3 });
    let shots = session.shots();
    assert_eq!(shots[0].jpeg, first);
    assert_eq!(shots[2].jpeg, third);
    assert_ne!(shots[1].jpeg, first);
    assert_ne!(shots[1].jpeg, third);

    let events = session.drain_events();
    assert!(events.contains(&SessionEvent::ShotDeleted { position: 2 }));
    assert!(events.contains(&SessionEvent::ShotCaptured { position: 2, total: 3 }));
}

#[test]
fn cancel_mid_capture_matches_fresh_session() {
    let mut session = manual_session(CaptureKind::CheckIn);
    session.capture_frame(Instant::now());

    session.cancel().unwrap();
    assert_eq!(session.snapshot(), fresh_snapshot(CaptureKind::CheckIn));
}
