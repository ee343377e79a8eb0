use crate::camera::{CameraDevice, StreamConstraints};
use crate::common::config::CameraConfig;
use crate::common::{FaceAttendError, Result};
use image::{DynamicImage, ImageBuffer, Luma, Rgb};
use std::fs;
use std::time::Duration;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

/// Device index that asks for auto-detection.
pub const AUTO_DETECT_INDEX: u32 = 999;

#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub features: Vec<String>,
    pub likely_ir: bool,
    pub has_color: bool,
}

/// V4L2 webcam. The device handle is only held between `acquire` and
/// `release`.
pub struct Camera {
    config: CameraConfig,
    device: Option<Device>,
    format: Option<v4l::Format>,
}

impl Camera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            config: config.clone(),
            device: None,
            format: None,
        }
    }

    /// List all available cameras with their capabilities
    pub fn list_all_cameras() -> Result<Vec<CameraInfo>> {
        let mut cameras = Vec::new();

        for entry in fs::read_dir("/dev")? {
            let entry = entry?;
            let path = entry.path();
            let filename = path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("");

            let Some(index) = filename.strip_prefix("video").and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            let Ok(device) = Device::new(index as usize) else {
                continue;
            };
            let Ok(caps) = device.query_caps() else {
                continue;
            };

            let mut features = Vec::new();
            let mut likely_ir = false;
            let mut has_color = false;

            if caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                features.push("VIDEO_CAPTURE".to_string());
            } else if caps.capabilities.contains(v4l::capability::Flags::META_CAPTURE) {
                features.push("METADATA_CAPTURE".to_string());
            }

            for fmt in device.enum_formats().unwrap_or_default() {
                let fourcc_str = fmt.fourcc.str().unwrap_or("UNKNOWN");
                match fourcc_str {
                    "GREY" | "Y8  " | "Y16 " => {
                        features.push(format!("Grayscale ({})", fourcc_str.trim()));
                        likely_ir = true;
                    }
                    "MJPG" | "YUYV" => {
                        features.push(format!("Color ({})", fourcc_str));
                        has_color = true;
                    }
                    _ => {}
                }
            }

            if caps.card.contains("IR") || caps.card.contains("Infrared") {
                likely_ir = true;
            }

            cameras.push(CameraInfo {
                index,
                name: caps.card.clone(),
                features,
                likely_ir,
                has_color,
            });
        }

        cameras.sort_by_key(|c| c.index);
        Ok(cameras)
    }

    /// Pick the webcam the user is sitting in front of: a colour capture
    /// device that doesn't look like an IR sensor.
    pub fn detect_user_camera() -> Result<u32> {
        let cameras = Self::list_all_cameras()?;
        let choice = select_user_camera(&cameras);

        match choice {
            Some(index) => {
                tracing::info!("Selected camera /dev/video{}", index);
                Ok(index)
            }
            None => {
                tracing::warn!("No colour camera detected, falling back to /dev/video0");
                Ok(0)
            }
        }
    }

    fn resolve_index(&self) -> Result<u32> {
        if self.config.device_index == AUTO_DETECT_INDEX {
            Self::detect_user_camera()
        } else {
            Ok(self.config.device_index)
        }
    }

    fn open_device(&self, index: u32, constraints: &StreamConstraints) -> Result<(Device, v4l::Format)> {
        tracing::debug!("Opening camera device {}", index);

        let device = Device::new(index as usize)
            .map_err(|e| FaceAttendError::CameraAcquisition(format!("Failed to open camera {}: {}", index, e)))?;

        let caps = device.query_caps()
            .map_err(|e| FaceAttendError::CameraAcquisition(format!("Failed to query capabilities: {}", e)))?;

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            tracing::warn!("Device {} may not support standard video capture", index);
        }

        let mut fmt = device.format()
            .map_err(|e| FaceAttendError::CameraAcquisition(format!("Failed to get format: {}", e)))?;

        fmt.width = constraints.ideal_width;
        fmt.height = constraints.ideal_height;

        // Keep GREY on sensors that only speak grayscale, otherwise ask for MJPG
        if fmt.fourcc.str().unwrap_or("") != "GREY" {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set exact format: {}. Using device defaults.", e);
        }

        let final_fmt = device.format()
            .map_err(|e| FaceAttendError::CameraAcquisition(format!("Failed to get final format: {}", e)))?;

        if final_fmt.width != constraints.ideal_width || final_fmt.height != constraints.ideal_height {
            tracing::info!(
                "Camera negotiated {}x{} (requested {}x{})",
                final_fmt.width, final_fmt.height,
                constraints.ideal_width, constraints.ideal_height
            );
        }

        Ok((device, final_fmt))
    }

    fn warm_up(&mut self) -> Result<()> {
        let Some(device) = self.device.as_mut() else {
            return Ok(());
        };

        let mut stream = v4l::io::mmap::Stream::with_buffers(device, Type::VideoCapture, 4)
            .map_err(|e| FaceAttendError::Camera(format!("Failed to create stream: {}", e)))?;

        for i in 0..self.config.warmup_frames {
            stream.next()
                .map_err(|e| FaceAttendError::Camera(format!("Failed to capture warmup frame {}: {}", i, e)))?;
            std::thread::sleep(Duration::from_millis(self.config.warmup_delay_ms));
        }
        Ok(())
    }
}

impl CameraDevice for Camera {
    fn acquire(&mut self, constraints: &StreamConstraints) -> Result<()> {
        if self.device.is_some() {
            return Ok(());
        }
        let index = self.resolve_index()
            .map_err(|e| FaceAttendError::CameraAcquisition(e.to_string()))?;
        let (device, format) = self.open_device(index, constraints)?;
        self.device = Some(device);
        self.format = Some(format);

        if let Err(e) = self.warm_up() {
            self.release();
            return Err(FaceAttendError::CameraAcquisition(e.to_string()));
        }

        tracing::info!("Camera /dev/video{} streaming", index);
        Ok(())
    }

    fn grab_frame(&mut self) -> Result<DynamicImage> {
        let (Some(device), Some(format)) = (self.device.as_mut(), self.format.as_ref()) else {
            return Err(FaceAttendError::Camera("Camera is not active".into()));
        };

        let mut stream = v4l::io::mmap::Stream::with_buffers(device, Type::VideoCapture, 2)
            .map_err(|e| FaceAttendError::Camera(format!("Failed to create stream: {}", e)))?;

        let (buf, meta) = stream.next()
            .map_err(|e| FaceAttendError::Camera(format!("Failed to capture: {}", e)))?;

        let used = if meta.bytesused > 0 {
            (meta.bytesused as usize).min(buf.len())
        } else {
            buf.len()
        };

        let fourcc = format.fourcc.str().unwrap_or("UNKNOWN");
        decode_frame(fourcc, &buf[..used], format.width, format.height)
    }

    fn release(&mut self) {
        if self.device.take().is_some() {
            tracing::debug!("Camera released");
        }
        self.format = None;
    }

    fn is_streaming(&self) -> bool {
        self.device.is_some()
    }
}

pub(crate) fn select_user_camera(cameras: &[CameraInfo]) -> Option<u32> {
    let capture_capable = |c: &&CameraInfo| c.features.iter().any(|f| f == "VIDEO_CAPTURE");

    cameras.iter()
        .filter(capture_capable)
        .find(|c| c.has_color && !c.likely_ir)
        .or_else(|| cameras.iter().filter(capture_capable).find(|c| c.has_color))
        .map(|c| c.index)
}

/// Convert a raw V4L2 buffer into an image.
pub fn decode_frame(fourcc: &str, data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    match fourcc {
        "GREY" => {
            let expected = (width * height) as usize;
            let pixels = data.get(..expected)
                .ok_or_else(|| FaceAttendError::Camera("Short grayscale buffer".into()))?;
            let img = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, pixels.to_vec())
                .ok_or_else(|| FaceAttendError::Camera("Failed to create grayscale image buffer".into()))?;
            Ok(DynamicImage::ImageLuma8(img))
        }
        "MJPG" => {
            image::load_from_memory(data)
                .map_err(|e| FaceAttendError::Camera(format!("Failed to decode MJPG frame: {}", e)))
        }
        "YUYV" => yuyv_to_image(data, width, height),
        other => Err(FaceAttendError::Camera(format!("Unsupported format {}", other))),
    }
}

fn yuyv_to_image(data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected || width % 2 != 0 {
        return Err(FaceAttendError::Camera("Malformed YUYV buffer".into()));
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0] as f32, chunk[1] as f32 - 128.0, chunk[2] as f32, chunk[3] as f32 - 128.0);
        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    let img = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb)
        .ok_or_else(|| FaceAttendError::Camera("Failed to create RGB image buffer".into()))?;
    Ok(DynamicImage::ImageRgb8(img))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(index: u32, has_color: bool, likely_ir: bool) -> CameraInfo {
        CameraInfo {
            index,
            name: format!("cam{}", index),
            features: vec!["VIDEO_CAPTURE".to_string()],
            likely_ir,
            has_color,
        }
    }

    #[test]
    fn prefers_colour_camera_over_ir() {
        let cameras = vec![info(0, false, true), info(2, true, true), info(4, true, false)];
        assert_eq!(select_user_camera(&cameras), Some(4));
    }

    #[test]
    fn falls_back_to_any_colour_camera() {
        let cameras = vec![info(0, false, true), info(2, true, true)];
        assert_eq!(select_user_camera(&cameras), Some(2));
        assert_eq!(select_user_camera(&[info(0, false, true)]), None);
    }

    #[test]
    fn decodes_grey_and_yuyv() {
        let grey = decode_frame("GREY", &[10, 20, 30, 40], 2, 2).unwrap();
        assert_eq!((grey.width(), grey.height()), (2, 2));

        // Two mid-grey pixels: Y=128, U=V=128
        let yuyv = decode_frame("YUYV", &[128, 128, 128, 128], 2, 1).unwrap();
        let px = yuyv.to_rgb8().get_pixel(1, 0).0;
        assert_eq!(px, [128, 128, 128]);
    }

    #[test]
    fn rejects_short_or_unknown_buffers() {
        assert!(decode_frame("GREY", &[1, 2], 2, 2).is_err());
        assert!(decode_frame("YUYV", &[1, 2], 2, 1).is_err());
        assert!(decode_frame("H264", &[], 2, 2).is_err());
    }
}
