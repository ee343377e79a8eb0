use crate::core::{FaceBox, PoseGuide};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{self, ClearType},
};
use image::DynamicImage;
use std::io::{self, Write};
use std::time::Duration;

const ASCII_RAMP: &[char] = &[' ', '.', '·', ':', ';', '+', '=', 'x', 'X', '#', '@'];
const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 30;

/// Keys the capture loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Capture,
    Delete(usize),
    Cancel,
}

/// What the overlay shows besides the picture.
pub struct Overlay<'a> {
    pub face: Option<&'a FaceBox>,
    pub pose: Option<&'a PoseGuide>,
    pub captured: usize,
    pub total: usize,
    pub status: &'a str,
    pub hint: &'a str,
}

pub struct AsciiRenderer {
    width: usize,
    height: usize,
}

impl AsciiRenderer {
    pub fn new(width: Option<usize>, height: Option<usize>) -> Self {
        let (term_width, term_height) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

        // Half resolution keeps redraws cheap; leave room for the text lines
        Self {
            width: width.unwrap_or((term_width / 2).min(DEFAULT_WIDTH / 2)),
            height: height.unwrap_or((term_height.saturating_sub(6) / 2).min(DEFAULT_HEIGHT / 2)),
        }
    }

    pub fn render(&self, image: &DynamicImage, overlay: &Overlay<'_>) -> String {
        let mut grid = self.image_to_ascii(image);
        if let Some(face) = overlay.face {
            self.draw_face_box(&mut grid, face, image.width() as f32, image.height() as f32);
        }

        let mut lines = Vec::with_capacity(self.height + 4);
        lines.push(format!(
            "{} {}/{}",
            progress_bar(overlay.captured, overlay.total),
            overlay.captured,
            overlay.total
        ));
        lines.push(match overlay.pose {
            Some(pose) => format!("{}: {}", pose.label, pose.instruction),
            None => "All photos captured".to_string(),
        });
        lines.push(self.grid_to_string(&grid));
        lines.push(overlay.status.to_string());
        lines.push(overlay.hint.to_string());
        lines.join("\r\n")
    }

    fn image_to_ascii(&self, image: &DynamicImage) -> Vec<Vec<char>> {
        let mut grid = vec![vec![' '; self.width]; self.height];
        let gray = image.to_luma8();
        let (img_width, img_height) = gray.dimensions();
        if img_width == 0 || img_height == 0 {
            return grid;
        }

        for (term_y, row) in grid.iter_mut().enumerate() {
            for (term_x, cell) in row.iter_mut().enumerate() {
                let img_x = (term_x as f32 / self.width as f32 * img_width as f32) as u32;
                let img_y = (term_y as f32 / self.height as f32 * img_height as f32) as u32;
                if img_x < img_width && img_y < img_height {
                    let brightness = gray.get_pixel(img_x, img_y)[0] as usize;
                    *cell = ASCII_RAMP[brightness * (ASCII_RAMP.len() - 1) / 255];
                }
            }
        }

        grid
    }

    fn draw_face_box(&self, grid: &mut [Vec<char>], face: &FaceBox, img_width: f32, img_height: f32) {
        if self.width < 2 || self.height < 2 || img_width <= 0.0 || img_height <= 0.0 {
            return;
        }

        let scale_x = |v: f32| (((v / img_width) * self.width as f32) as usize).min(self.width - 1);
        let scale_y = |v: f32| (((v / img_height) * self.height as f32) as usize).min(self.height - 1);
        let (x1, x2) = (scale_x(face.x1), scale_x(face.x2));
        let (y1, y2) = (scale_y(face.y1), scale_y(face.y2));
        if x2 <= x1 || y2 <= y1 {
            return;
        }

        for x in x1 + 1..x2 {
            grid[y1][x] = '─';
            grid[y2][x] = '─';
        }
        for row in grid.iter_mut().take(y2).skip(y1 + 1) {
            row[x1] = '│';
            row[x2] = '│';
        }
        grid[y1][x1] = '┌';
        grid[y1][x2] = '┐';
        grid[y2][x1] = '└';
        grid[y2][x2] = '┘';
    }

    fn grid_to_string(&self, grid: &[Vec<char>]) -> String {
        grid.iter()
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\r\n")
    }
}

/// One box per required photo.
pub fn progress_bar(captured: usize, total: usize) -> String {
    let filled = "■".repeat(captured.min(total));
    let empty = "□".repeat(total.saturating_sub(captured));
    format!("[{}{}]", filled, empty)
}

pub fn clear_screen() -> io::Result<()> {
    crossterm::execute!(
        io::stdout(),
        terminal::Clear(ClearType::All),
        cursor::MoveTo(0, 0)
    )?;
    io::stdout().flush()
}

/// Wait up to `timeout` for a key the capture loop cares about.
pub fn poll_key(timeout: Duration) -> io::Result<Option<KeyInput>> {
    if !event::poll(timeout)? {
        return Ok(None);
    }

    if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
        if kind == KeyEventKind::Release {
            return Ok(None);
        }
        return Ok(match code {
            KeyCode::Char(' ') | KeyCode::Enter => Some(KeyInput::Capture),
            KeyCode::Esc | KeyCode::Char('q') => Some(KeyInput::Cancel),
            KeyCode::Char(c) => c
                .to_digit(10)
                .filter(|d| *d >= 1)
                .map(|d| KeyInput::Delete(d as usize - 1)),
            _ => None,
        });
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, GrayImage};

    #[test]
    fn progress_bar_has_one_box_per_photo() {
        assert_eq!(progress_bar(0, 3), "[□□□]");
        assert_eq!(progress_bar(2, 5), "[■■□□□]");
        assert_eq!(progress_bar(7, 3), "[■■■]");
    }

    #[test]
    fn renders_brightness_and_face_box() {
        let renderer = AsciiRenderer::new(Some(20), Some(10));
        let white = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 50, Luma([255])));
        let face = FaceBox { x1: 20.0, y1: 10.0, x2: 80.0, y2: 40.0, confidence: 0.9 };
        let overlay = Overlay {
            face: Some(&face),
            pose: None,
            captured: 1,
            total: 3,
            status: "Face detected (90%)",
            hint: "Esc to cancel",
        };

        let text = renderer.render(&white, &overlay);
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert_eq!(lines[0], "[■□□] 1/3");
        assert_eq!(lines.len(), 2 + 10 + 2);
        assert!(lines[2].starts_with('@'));
        assert!(text.contains('┌') && text.contains('┘'));
        assert_eq!(lines[lines.len() - 2], "Face detected (90%)");
    }
}
