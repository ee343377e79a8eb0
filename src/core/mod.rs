pub mod detector;
pub mod pose;
pub mod session;
pub mod shots;
pub mod submit;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use detector::{FaceBox, FaceDetector, FacePresence};
pub use pose::{CaptureKind, PoseGuide};
pub use session::{
    CaptureMode, CaptureOutcome, CaptureSession, CaptureTicket, SessionEvent, SessionSettings,
    SessionSnapshot, SessionState, TickReport,
};
pub use shots::{PreviewId, PreviewRegistry, Shot};
pub use submit::{Outcome, PhotoPart, Punctuality, Severity, VerificationReply, Verifier};
pub use trigger::{AutoCaptureTrigger, Decision, DetectionSample, ACCEPT_THRESHOLD};
