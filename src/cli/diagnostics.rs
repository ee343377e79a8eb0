use crate::camera::{v4l2::AUTO_DETECT_INDEX, Camera, CameraDevice, StreamConstraints};
use crate::common::{Config, DevMode, Result};
use crate::core::trigger::ACCEPT_THRESHOLD;
use crate::core::{FaceBox, FaceDetector};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

fn grab_one(config: &Config) -> Result<DynamicImage> {
    let mut camera = Camera::new(&config.camera);
    let constraints = StreamConstraints {
        ideal_width: config.camera.width,
        ideal_height: config.camera.height,
    };
    camera.acquire(&constraints)?;
    let frame = camera.grab_frame();
    camera.release();
    frame
}

pub fn test_camera(config: &Config, dev_mode: &DevMode) -> Result<()> {
    let frame = grab_one(config)?;
    let save_path = dev_mode.get_capture_path("test_capture");
    frame.save(&save_path)?;
    println!("Saved {}x{} test image to {:?}", frame.width(), frame.height(), save_path);
    Ok(())
}

pub fn test_detection(config: &Config, dev_mode: &DevMode) -> Result<()> {
    let detector = FaceDetector::new(config)?;
    let frame = grab_one(config)?;

    let save_path = dev_mode.get_capture_path("detection_test");
    frame.save(&save_path)?;
    println!("Saved original image to {:?}", save_path);

    let faces = detector.detect(&frame)?;
    println!("Found {} face(s) above detector threshold {}", faces.len(), config.detector.score_threshold);
    for (i, face) in faces.iter().enumerate() {
        let verdict = if face.confidence >= ACCEPT_THRESHOLD { "would capture" } else { "too weak" };
        println!("  Face {}: confidence {:.3} ({})", i + 1, face.confidence, verdict);
    }

    let debug_path = dev_mode.get_debug_path("detection_annotated");
    annotate(&frame, &faces).save(&debug_path)?;
    println!("\nSaved annotated image to: {:?}", debug_path);
    Ok(())
}

/// Outline each face: green when it clears the auto-capture threshold,
/// yellow otherwise.
pub fn annotate(image: &DynamicImage, faces: &[FaceBox]) -> RgbImage {
    let mut img = image.to_rgb8();
    let accepted = Rgb([0, 255, 0]);
    let weak = Rgb([255, 255, 0]);

    for face in faces {
        let x1 = face.x1.max(0.0) as i32;
        let y1 = face.y1.max(0.0) as i32;
        let x2 = face.x2.min(img.width() as f32) as i32;
        let y2 = face.y2.min(img.height() as f32) as i32;
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        let color = if face.confidence >= ACCEPT_THRESHOLD { accepted } else { weak };
        let (w, h) = ((x2 - x1) as u32, (y2 - y1) as u32);
        draw_hollow_rect_mut(&mut img, Rect::at(x1, y1).of_size(w, h), color);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(&mut img, Rect::at(x1 + 1, y1 + 1).of_size(w - 2, h - 2), color);
        }
    }

    img
}

pub fn detect_cameras(config: &Config) -> Result<()> {
    let cameras = Camera::list_all_cameras()?;
    if cameras.is_empty() {
        println!("❌ No cameras found!");
        println!("\nTroubleshooting:");
        println!("  1. Check that a webcam is connected");
        println!("  2. Ensure you have permission to access /dev/video*");
        return Ok(());
    }

    for camera in &cameras {
        let kind = if camera.likely_ir { " (IR)" } else if camera.has_color { " (colour)" } else { "" };
        println!("📷 /dev/video{}: {}{}", camera.index, camera.name, kind);
        for feature in &camera.features {
            println!("   - {}", feature);
        }
        println!();
    }

    println!("═══════════════════════════════════════════════════════");
    let detected = Camera::detect_user_camera()?;
    println!("✅ Auto-detected camera: /dev/video{}", detected);
    if config.camera.device_index == AUTO_DETECT_INDEX {
        println!("   In use, device_index = {} (auto-detect)", AUTO_DETECT_INDEX);
    } else {
        println!("   Config pins device_index = {}", config.camera.device_index);
    }
    println!("\nTo pin a camera, set [camera] device_index in the config file.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotate_colours_by_threshold() {
        let frame = DynamicImage::ImageRgb8(RgbImage::new(100, 100));
        let faces = [
            FaceBox { x1: 10.0, y1: 10.0, x2: 40.0, y2: 40.0, confidence: 0.9 },
            FaceBox { x1: 60.0, y1: 60.0, x2: 90.0, y2: 90.0, confidence: 0.5 },
            FaceBox { x1: 50.0, y1: 50.0, x2: 50.0, y2: 50.0, confidence: 0.9 },
        ];

        let img = annotate(&frame, &faces);
        assert_eq!(img.get_pixel(10, 10), &Rgb([0, 255, 0]));
        assert_eq!(img.get_pixel(60, 60), &Rgb([255, 255, 0]));
        assert_eq!(img.get_pixel(25, 25), &Rgb([0, 0, 0]));
    }
}
