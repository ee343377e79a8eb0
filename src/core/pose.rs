/// Ordered instruction shown for one shot position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoseGuide {
    pub label: &'static str,
    pub instruction: &'static str,
}

const FRONT: PoseGuide = PoseGuide { label: "Face forward", instruction: "Look straight at the camera" };
const RIGHT: PoseGuide = PoseGuide { label: "Slightly right", instruction: "Turn your head slightly to the right" };
const LEFT: PoseGuide = PoseGuide { label: "Slightly left", instruction: "Turn your head slightly to the left" };
const UP: PoseGuide = PoseGuide { label: "Slightly up", instruction: "Raise your chin a little" };
const DOWN: PoseGuide = PoseGuide { label: "Slightly down", instruction: "Lower your chin a little" };

pub const CHECK_IN_POSES: [PoseGuide; 3] = [FRONT, RIGHT, LEFT];
pub const ENROLLMENT_POSES: [PoseGuide; 5] = [FRONT, RIGHT, LEFT, UP, DOWN];

/// What the photos are for. Fixes the shot count and the pose sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    CheckIn,
    Enrollment,
}

impl CaptureKind {
    pub fn required_shots(self) -> usize {
        self.poses().len()
    }

    pub fn poses(self) -> &'static [PoseGuide] {
        match self {
            CaptureKind::CheckIn => &CHECK_IN_POSES,
            CaptureKind::Enrollment => &ENROLLMENT_POSES,
        }
    }

    pub fn pose(self, position: usize) -> Option<&'static PoseGuide> {
        self.poses().get(position)
    }
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureKind::CheckIn => write!(f, "check-in"),
            CaptureKind::Enrollment => write!(f, "enrollment"),
        }
    }
}
