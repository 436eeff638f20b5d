use anyhow::{Context, Result};
use fontdue::{Font, FontSettings};
use image::RgbaImage;
use std::path::Path;

use super::{FrameInput, Renderer};
use crate::choreo::engine::StatusSnapshot;

const MARGIN: u32 = 12;
const LINE_SPACING: f32 = 1.25;
const TEXT_COLOR: [u8; 4] = [235, 235, 235, 220];

/// Status text burned into rendered frames.
pub struct Hud {
    font: Font,
    font_size: f32,
}

impl Hud {
    pub fn from_file(path: &Path, font_size: f32) -> Result<Self> {
        let data = std::fs::read(path).with_context(|| format!("Failed to read HUD font: {}", path.display()))?;
        let font = Font::from_bytes(data, FontSettings::default())
            .map_err(|e| anyhow::anyhow!("Failed to parse HUD font {}: {}", path.display(), e))?;
        Ok(Self { font, font_size })
    }

    pub fn draw(&self, frame: &mut RgbaImage, status: &StatusSnapshot) {
        let step = (self.font_size * LINE_SPACING) as u32;
        for (i, line) in status_lines(status).iter().enumerate() {
            self.composite(frame, line, MARGIN, MARGIN + i as u32 * step, TEXT_COLOR);
        }
    }

    fn composite(&self, frame: &mut RgbaImage, text: &str, x: u32, y: u32, color: [u8; 4]) {
        let (width, height) = frame.dimensions();
        let mut cursor_x = x as i32;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.font_size);
            let glyph_y = y as i32 + self.font_size as i32 - metrics.height as i32 - metrics.ymin;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }
                    let px = cursor_x + metrics.xmin + gx as i32;
                    let py = glyph_y + gy as i32;
                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }

                    let a = coverage as f32 / 255.0 * (color[3] as f32 / 255.0);
                    let dst = frame.get_pixel_mut(px as u32, py as u32);
                    for c in 0..3 {
                        dst.0[c] = (color[c] as f32 * a + dst.0[c] as f32 * (1.0 - a)) as u8;
                    }
                    dst.0[3] = 255;
                }
            }

            cursor_x += metrics.advance_width.round() as i32;
        }
    }
}

/// One line per HUD row, top to bottom.
pub fn status_lines(status: &StatusSnapshot) -> Vec<String> {
    let pose = status.active_pose.as_ref().map_or("-", |p| p.as_str());
    vec![
        format!("pose {}  [{}]", pose, status.intention),
        format!("bar {}  beat {}  {}", status.bar, status.beat + 1, status.pattern),
        format!("conf {:.2}", status.confidence),
    ]
}

/// Wraps another renderer and stamps the HUD on each frame it produces.
pub struct WithHud<R> {
    inner: R,
    hud: Hud,
}

impl<R: Renderer> WithHud<R> {
    pub fn new(inner: R, hud: Hud) -> Self {
        Self { inner, hud }
    }
}

impl<R: Renderer> Renderer for WithHud<R> {
    fn size(&self) -> (u32, u32) {
        self.inner.size()
    }

    fn render(&mut self, input: &FrameInput<'_>) -> Result<RgbaImage> {
        let mut frame = self.inner.render(input)?;
        self.hud.draw(&mut frame, &input.tick.status);
        Ok(frame)
    }
}
