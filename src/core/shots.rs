use crate::common::{FaceAttendError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage};
use std::collections::HashMap;

const PREVIEW_WIDTH: u32 = 160;
const PREVIEW_HEIGHT: u32 = 90;

/// Handle to a thumbnail held in a [`PreviewRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewId(u64);

/// One kept photo: the compressed bytes that get uploaded plus the handle of
/// its local preview.
#[derive(Debug, Clone)]
pub struct Shot {
    pub jpeg: Vec<u8>,
    pub preview: PreviewId,
    pub width: u32,
    pub height: u32,
}

/// Owns the thumbnails for every live shot. Each preview must be released
/// when its shot goes away, otherwise repeated attempts keep accumulating them.
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    next_id: u64,
    previews: HashMap<PreviewId, DynamicImage>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, frame: &DynamicImage) -> PreviewId {
        let id = PreviewId(self.next_id);
        self.next_id += 1;
        let thumb = frame.resize(PREVIEW_WIDTH, PREVIEW_HEIGHT, FilterType::Triangle);
        self.previews.insert(id, thumb);
        id
    }

    pub fn get(&self, id: PreviewId) -> Option<&DynamicImage> {
        self.previews.get(&id)
    }

    pub fn release(&mut self, id: PreviewId) -> bool {
        self.previews.remove(&id).is_some()
    }

    pub fn release_all(&mut self) {
        self.previews.clear();
    }

    pub fn live_count(&self) -> usize {
        self.previews.len()
    }
}

/// Compress a frame as baseline JPEG.
pub fn encode_jpeg(frame: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(FaceAttendError::Encode("frame has no pixels".into()));
    }

    let rgb = frame.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| FaceAttendError::Encode(e.to_string()))?;
    Ok(buf)
}
