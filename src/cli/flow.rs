use crate::camera::Camera;
use crate::cli::ascii_preview::{clear_screen, poll_key, AsciiRenderer, KeyInput, Overlay};
use crate::common::{Config, FaceAttendError, Result};
use crate::core::{
    CaptureKind, CaptureMode, CaptureSession, FaceBox, FaceDetector, FacePresence, Outcome,
    SessionSettings, SessionState, Severity, Verifier,
};
use chrono::{DateTime, Local};
use crossterm::terminal;
use image::DynamicImage;
use std::io::{self, Write};
use std::time::Instant;

/// Restores the terminal when the capture loop exits, however it exits.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

enum LoopExit {
    Submit,
    Cancelled,
}

/// Run one interactive capture attempt and submit it. Returns `None` when
/// the user cancelled before submitting.
pub fn run_capture<V: Verifier + ?Sized>(
    config: &Config,
    kind: CaptureKind,
    mode: CaptureMode,
    verifier: &mut V,
) -> Result<Option<Outcome>> {
    let detector = match FaceDetector::new(config) {
        Ok(detector) => Some(detector),
        Err(e) => {
            tracing::warn!("Face detector unavailable: {}", e);
            None
        }
    };

    let settings = SessionSettings::from_config(kind, mode, config);
    let mut session = CaptureSession::new(settings, Camera::new(&config.camera));
    if matches!(mode, CaptureMode::Automatic { .. }) {
        session.set_ready(detector.is_some());
    }

    if let Err(e) = session.start() {
        if matches!(e, FaceAttendError::NotReady(_)) {
            println!("❌ Automatic capture needs the face detector model.");
            println!("   Check models.detector_path in the config, or use manual capture.");
        }
        return Err(e);
    }

    let exit = {
        let _raw = RawModeGuard::enable()?;
        capture_loop(config, &mut session, detector.as_ref())
    };
    session.stop();
    clear_screen()?;

    match exit? {
        LoopExit::Cancelled => {
            println!("Capture cancelled.");
            Ok(None)
        }
        LoopExit::Submit => {
            println!("Submitting {} photo(s) for {}...", session.required_shots(), kind);
            let submitted_at = Local::now();
            let outcome = session.submit(verifier, submitted_at)?;
            print_outcome(&outcome, submitted_at);
            Ok(Some(outcome))
        }
    }
}

fn capture_loop(
    config: &Config,
    session: &mut CaptureSession<Camera>,
    detector: Option<&FaceDetector>,
) -> Result<LoopExit> {
    let renderer = AsciiRenderer::new(None, None);
    let tick = config.capture.tick_interval();
    let manual = session.mode() == CaptureMode::Manual;
    let mut notice = String::new();

    loop {
        let key = poll_key(tick)?;
        let now = Instant::now();

        match key {
            Some(KeyInput::Cancel) => {
                session.cancel()?;
                return Ok(LoopExit::Cancelled);
            }
            Some(KeyInput::Capture) if manual => {
                if session.state() == SessionState::ReadyToSubmit {
                    return Ok(LoopExit::Submit);
                }
                session.capture_frame(now);
            }
            Some(KeyInput::Delete(index)) if manual => {
                if let Err(e) = session.delete_shot(index) {
                    notice = e.to_string();
                }
            }
            _ => {}
        }

        if session.state() == SessionState::Idle {
            // Camera could not be restarted after a delete
            return Err(FaceAttendError::CameraAcquisition("camera lost during capture".into()));
        }

        let (frame, face, status) = if session.state() == SessionState::ReadyToSubmit {
            if !manual {
                return Ok(LoopExit::Submit);
            }
            (None, None, "All photos captured".to_string())
        } else if manual {
            let frame = session.live_frame().ok();
            let face = frame.as_ref().and_then(|f| best_face(detector, f));
            (frame, face, session.status().to_string())
        } else {
            match detector {
                Some(detector) => {
                    let report = session.tick(detector, now);
                    (report.frame, report.face, report.status)
                }
                None => (None, None, session.status().to_string()),
            }
        };

        if let Some(event) = session.drain_events().pop() {
            notice = event.to_string();
        }

        let hint = hint_line(session, manual);
        let overlay = Overlay {
            face: face.as_ref(),
            pose: session.current_pose(),
            captured: session.shots().len(),
            total: session.required_shots(),
            status: &status,
            hint: &hint,
        };

        clear_screen()?;
        let mut out = io::stdout();
        match frame {
            Some(frame) => write!(out, "{}", renderer.render(&frame, &overlay))?,
            None => write!(
                out,
                "{}/{} photos\r\n{}\r\n{}",
                overlay.captured, overlay.total, overlay.status, overlay.hint
            )?,
        }
        if !notice.is_empty() {
            write!(out, "\r\n{}", notice)?;
        }
        out.flush()?;
    }
}

fn best_face(detector: Option<&FaceDetector>, frame: &DynamicImage) -> Option<FaceBox> {
    detector.and_then(|d| d.detect_best(frame).ok().flatten())
}

fn hint_line(session: &CaptureSession<Camera>, manual: bool) -> String {
    let total = session.required_shots();
    match (manual, session.state()) {
        (true, SessionState::ReadyToSubmit) => {
            format!("Enter: submit  1-{}: retake a photo  Esc: cancel", total)
        }
        (true, _) if session.shots().is_empty() => "Space: take photo  Esc: cancel".to_string(),
        (true, _) => format!("Space: take photo  1-{}: delete a photo  Esc: cancel", session.shots().len()),
        (false, _) => "Hold still, photos are taken automatically  Esc: cancel".to_string(),
    }
}

/// Prints the verdict. `submitted_at` is the time the punctuality was judged
/// against, so the printed clock always agrees with on time or late.
pub fn print_outcome(outcome: &Outcome, submitted_at: DateTime<Local>) {
    for line in outcome_lines(outcome, submitted_at) {
        println!("{}", line);
    }

    if outcome.severity() == Severity::Error {
        tracing::error!("Submission failed: {}", outcome.message());
    }
}

fn outcome_lines(outcome: &Outcome, submitted_at: DateTime<Local>) -> Vec<String> {
    match outcome {
        Outcome::Success { message, punctuality } => {
            let mut lines = vec![format!("✅ {}", message)];
            if let Some(punctuality) = punctuality {
                lines.push(format!("   Checked in {} at {}", punctuality, submitted_at.format("%H:%M")));
            }
            lines
        }
        Outcome::Rejected { message } => {
            vec![format!("ℹ️  {}", message), "   Please try again.".to_string()]
        }
        Outcome::TransportError { message } => vec![
            format!("❌ {}", message),
            "   Check your connection and login, then try again.".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Punctuality;
    use chrono::TimeZone;

    #[test]
    fn check_in_line_shows_submission_time() {
        let at = Local.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        let outcome = Outcome::Success {
            message: "Absen berhasil".into(),
            punctuality: Some(Punctuality::at(&at)),
        };

        let lines = outcome_lines(&outcome, at);
        assert_eq!(lines[0], "✅ Absen berhasil");
        assert_eq!(lines[1], "   Checked in on time at 09:00");
    }

    #[test]
    fn late_check_in_reports_the_minute_it_was_judged() {
        let at = Local.with_ymd_and_hms(2024, 5, 6, 9, 1, 0).unwrap();
        let outcome = Outcome::Success {
            message: "ok".into(),
            punctuality: Some(Punctuality::at(&at)),
        };

        assert_eq!(outcome_lines(&outcome, at)[1], "   Checked in late at 09:01");
    }

    #[test]
    fn enrollment_success_has_no_clock_line() {
        let at = Local.with_ymd_and_hms(2024, 5, 6, 14, 30, 0).unwrap();
        let outcome = Outcome::Success { message: "registered".into(), punctuality: None };
        assert_eq!(outcome_lines(&outcome, at), vec!["✅ registered".to_string()]);
    }
}
