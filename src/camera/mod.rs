pub mod v4l2;

use crate::common::Result;
use image::DynamicImage;

pub use v4l2::{Camera, CameraInfo};

/// Acquisition request. Values are preferences, not hard requirements; the
/// device may negotiate something else. V4L2 reports no facing, so the
/// user-facing webcam is chosen by auto-detect instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

/// A video source the capture session can acquire, read frames from, and
/// release. `release` must be idempotent.
pub trait CameraDevice {
    fn acquire(&mut self, constraints: &StreamConstraints) -> Result<()>;

    fn grab_frame(&mut self) -> Result<DynamicImage>;

    fn release(&mut self);

    fn is_streaming(&self) -> bool;
}

impl<T: CameraDevice + ?Sized> CameraDevice for Box<T> {
    fn acquire(&mut self, constraints: &StreamConstraints) -> Result<()> {
        (**self).acquire(constraints)
    }

    fn grab_frame(&mut self) -> Result<DynamicImage> {
        (**self).grab_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn is_streaming(&self) -> bool {
        (**self).is_streaming()
    }
}
