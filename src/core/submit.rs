use crate::camera::CameraDevice;
use crate::common::{FaceAttendError, Result};
use crate::core::pose::CaptureKind;
use crate::core::session::CaptureSession;
use crate::core::shots::Shot;
use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reply status the backend uses for an accepted verification.
pub const STATUS_SUCCESS: &str = "sukses";

/// Check-ins after this local time are late.
const LATE_AFTER: (u32, u32) = (9, 0);

/// One named file in the multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoPart {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PhotoPart {
    /// Parts are numbered from 1 in slot order: `foto_1` .. `foto_N`.
    pub fn from_shots(shots: &[Shot]) -> Vec<PhotoPart> {
        shots
            .iter()
            .enumerate()
            .map(|(i, shot)| PhotoPart {
                field: format!("foto_{}", i + 1),
                file_name: format!("foto_{}.jpg", i + 1),
                bytes: shot.jpeg.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReply {
    pub status: String,
    #[serde(rename = "pesan", default)]
    pub message: String,
}

impl VerificationReply {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Backend that compares uploaded photos against the enrolled face.
pub trait Verifier {
    fn verify(&mut self, kind: CaptureKind, photos: &[PhotoPart]) -> Result<VerificationReply>;
}

impl<V: Verifier + ?Sized> Verifier for &mut V {
    fn verify(&mut self, kind: CaptureKind, photos: &[PhotoPart]) -> Result<VerificationReply> {
        (**self).verify(kind, photos)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punctuality {
    OnTime,
    Late,
}

impl Punctuality {
    pub fn at<T: Timelike>(time: &T) -> Self {
        if (time.hour(), time.minute()) > LATE_AFTER {
            Punctuality::Late
        } else {
            Punctuality::OnTime
        }
    }
}

impl fmt::Display for Punctuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Punctuality::OnTime => write!(f, "on time"),
            Punctuality::Late => write!(f, "late"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success {
        message: String,
        punctuality: Option<Punctuality>,
    },
    /// The server answered, but did not accept the photos.
    Rejected { message: String },
    /// The request never produced a usable answer.
    TransportError { message: String },
}

impl Outcome {
    pub fn severity(&self) -> Severity {
        match self {
            Outcome::Success { .. } => Severity::Success,
            Outcome::Rejected { .. } => Severity::Info,
            Outcome::TransportError { .. } => Severity::Error,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Success { message, .. }
            | Outcome::Rejected { message }
            | Outcome::TransportError { message } => message,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

fn transport_message(err: &FaceAttendError) -> String {
    match err {
        FaceAttendError::Api { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

impl<C: CameraDevice> CaptureSession<C> {
    /// Upload the N shots once. Rejections and transport failures are
    /// reported as outcomes and leave the session reset to `Idle`.
    pub fn submit<V: Verifier + ?Sized>(&mut self, verifier: &mut V, at: DateTime<Local>) -> Result<Outcome> {
        let parts = self.begin_submission()?;
        let kind = self.kind();
        tracing::info!("Submitting {} photo(s) for {}", parts.len(), kind);

        let outcome = match verifier.verify(kind, &parts) {
            Ok(reply) if reply.is_success() => {
                let message = if reply.message.is_empty() {
                    match kind {
                        CaptureKind::CheckIn => "Check-in recorded".to_string(),
                        CaptureKind::Enrollment => "Face enrolled".to_string(),
                    }
                } else {
                    reply.message
                };
                Outcome::Success {
                    message,
                    punctuality: (kind == CaptureKind::CheckIn).then(|| Punctuality::at(&at)),
                }
            }
            Ok(reply) => {
                tracing::info!("Verification rejected with status {:?}", reply.status);
                let message = if reply.message.is_empty() {
                    "Face verification failed".to_string()
                } else {
                    reply.message
                };
                Outcome::Rejected { message }
            }
            Err(e) => {
                tracing::error!("Verification request failed: {}", e);
                Outcome::TransportError { message: transport_message(&e) }
            }
        };

        if outcome.is_success() {
            self.finish_success(outcome.clone());
        } else {
            self.finish_failure();
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::{CaptureMode, SessionSettings, SessionState};
    use crate::core::testing::{RecordingVerifier, Scripted, ScriptedCamera};
    use chrono::{NaiveTime, TimeZone};
    use std::time::{Duration, Instant};

    fn ready_session(kind: CaptureKind) -> CaptureSession<ScriptedCamera> {
        let settings = SessionSettings::new(kind, CaptureMode::Manual).with_pacing(Duration::ZERO);
        let mut session = CaptureSession::new(settings, ScriptedCamera::new());
        session.start().unwrap();
        let now = Instant::now();
        for _ in 0..kind.required_shots() {
            session.capture_frame(now);
        }
        assert_eq!(session.state(), SessionState::ReadyToSubmit);
        session
    }

    fn local(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    #[test]
    fn punctuality_cutoff_is_nine_sharp() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(Punctuality::at(&t(8, 59)), Punctuality::OnTime);
        assert_eq!(Punctuality::at(&t(9, 0)), Punctuality::OnTime);
        assert_eq!(Punctuality::at(&t(9, 1)), Punctuality::Late);
        assert_eq!(Punctuality::at(&t(10, 0)), Punctuality::Late);
    }

    #[test]
    fn parts_are_numbered_from_one() {
        let mut session = ready_session(CaptureKind::Enrollment);
        let mut verifier = RecordingVerifier::new(Scripted::Reply { status: "sukses", message: "" });
        session.submit(&mut verifier, local(8, 0)).unwrap();

        assert_eq!(verifier.last_fields, ["foto_1", "foto_2", "foto_3", "foto_4", "foto_5"]);
        assert_eq!(verifier.last_kind, Some(CaptureKind::Enrollment));
    }

    #[test]
    fn success_releases_shots_and_keeps_message() {
        let mut session = ready_session(CaptureKind::CheckIn);
        let mut verifier = RecordingVerifier::new(Scripted::Reply { status: "sukses", message: "Absen berhasil" });

        let outcome = session.submit(&mut verifier, local(9, 30)).unwrap();
        assert_eq!(outcome, Outcome::Success {
            message: "Absen berhasil".into(),
            punctuality: Some(Punctuality::Late),
        });
        assert_eq!(session.state(), SessionState::Succeeded);
        assert_eq!(session.outcome(), Some(&outcome));
        assert!(session.shots().is_empty());
        assert_eq!(session.previews().live_count(), 0);
    }

    #[test]
    fn enrollment_success_has_no_punctuality() {
        let mut session = ready_session(CaptureKind::Enrollment);
        let mut verifier = RecordingVerifier::new(Scripted::Reply { status: "sukses", message: "" });
        let outcome = session.submit(&mut verifier, local(11, 0)).unwrap();
        assert_eq!(outcome, Outcome::Success { message: "Face enrolled".into(), punctuality: None });
    }

    #[test]
    fn transport_error_resets_with_error_severity() {
        let mut session = ready_session(CaptureKind::CheckIn);
        let mut verifier = RecordingVerifier::new(Scripted::Fail {
            status: 400,
            message: "Anda sudah absen hari ini!",
        });

        let outcome = session.submit(&mut verifier, local(8, 0)).unwrap();
        assert_eq!(outcome.severity(), Severity::Error);
        assert_eq!(outcome.message(), "Anda sudah absen hari ini!");
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.shots().is_empty());
    }

    #[test]
    fn submit_twice_does_not_resend() {
        let mut session = ready_session(CaptureKind::CheckIn);
        let mut verifier = RecordingVerifier::new(Scripted::Reply { status: "sukses", message: "ok" });
        session.submit(&mut verifier, local(8, 0)).unwrap();

        assert!(matches!(
            session.submit(&mut verifier, local(8, 0)),
            Err(FaceAttendError::NotReady(_))
        ));
        assert_eq!(verifier.calls, 1);
    }

    #[test]
    fn reply_parses_pesan_field() {
        let reply: VerificationReply =
            serde_json::from_str(r#"{"status": "gagal", "pesan": "Wajah tidak cocok"}"#).unwrap();
        assert!(!reply.is_success());
        assert_eq!(reply.message, "Wajah tidak cocok");
    }
}
