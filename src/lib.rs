pub mod camera;
pub mod cli;
pub mod common;
pub mod core;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use camera::{Camera, CameraDevice, StreamConstraints};
pub use common::{Config, DevMode, FaceAttendError, Result};
pub use self::core::{
    CaptureKind, CaptureMode, CaptureOutcome, CaptureSession, FaceBox, FaceDetector, FacePresence,
    Outcome, PhotoPart, SessionSettings, SessionSnapshot, SessionState, Severity, VerificationReply,
    Verifier,
};
pub use service::ApiClient;
pub use storage::AuthStore;
