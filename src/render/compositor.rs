//! CPU compositor: draws the active pose through the virtual camera and
//! layers the glitch FX on top.
//!
//! Order per frame: background, pose (zoom, pan, rotation and tilt
//! foreshortening, with the moiré RGB split applied while sampling and the
//! slice tear applied per row), then the ghost trail blended from the
//! previous frame.

use anyhow::Result;
use image::RgbaImage;
use rayon::prelude::*;
use std::sync::Arc;

use super::{hash01, FrameInput, Renderer};
use crate::assets::library::{PoseAsset, PoseLibrary};
use crate::choreo::camera::CameraState;
use crate::choreo::pool::PoseId;

/// Pose height as a fraction of the frame height at zoom 1.
const POSE_FILL: f32 = 0.9;
/// Height of one tear slice in pixels.
const SLICE_HEIGHT: u32 = 16;
/// Largest horizontal tear offset as a fraction of frame width.
const MAX_TEAR: f32 = 0.08;
/// RGB split distance in output pixels at full moiré.
const MOIRE_SPLIT: f32 = 8.0;
/// Blend weight of the previous frame at full ghost.
const GHOST_MIX: f32 = 0.5;
/// Effects below this are treated as off.
const FX_EPSILON: f32 = 0.01;

pub struct Compositor {
    library: Arc<PoseLibrary>,
    width: u32,
    height: u32,
    background: [u8; 4],
    trail: Option<RgbaImage>,
}

impl Compositor {
    pub fn new(library: Arc<PoseLibrary>, width: u32, height: u32) -> Self {
        Self {
            library,
            width,
            height,
            background: super::BACKGROUND,
            trail: None,
        }
    }

    #[cfg(test)]
    pub fn with_background(mut self, rgba: [u8; 4]) -> Self {
        self.background = rgba;
        self
    }

    pub fn compose(&mut self, pose: Option<&PoseId>, camera: &CameraState, frame_index: u64) -> RgbaImage {
        let (w, h) = (self.width, self.height);
        let mut pixels = vec![0u8; (w * h * 4) as usize];
        let bg = self.background;

        match pose.and_then(|id| self.library.get(id)) {
            Some(asset) => {
                let view = PoseView::new(asset, camera, w, h);
                let seed = frame_index as u32;
                pixels.par_chunks_mut((w * 4) as usize).enumerate().for_each(|(y, row)| {
                    let shift = tear_shift(y as u32, seed, camera.tear_amount, w);
                    for x in 0..w as usize {
                        let src = view.sample(x as f32 - shift + 0.5, y as f32 + 0.5);
                        let inv = 1.0 - src[3];
                        let px = &mut row[x * 4..x * 4 + 4];
                        for c in 0..3 {
                            px[c] = (src[c] * 255.0 + bg[c] as f32 * inv).round().clamp(0.0, 255.0) as u8;
                        }
                        px[3] = 255;
                    }
                });
            }
            None => {
                pixels.par_chunks_mut(4).for_each(|px| px.copy_from_slice(&bg));
            }
        }

        if camera.ghost_amount > FX_EPSILON {
            if let Some(prev) = &self.trail {
                let k = camera.ghost_amount.min(1.0) * GHOST_MIX;
                pixels.par_iter_mut().zip(prev.as_raw().par_iter()).for_each(|(cur, &old)| {
                    *cur = (*cur as f32 * (1.0 - k) + old as f32 * k).round() as u8;
                });
            }
        }

        // Buffer length is w * h * 4 by construction.
        let frame = RgbaImage::from_raw(w, h, pixels).unwrap_or_else(|| RgbaImage::new(w, h));
        self.trail = Some(frame.clone());
        frame
    }
}

impl Renderer for Compositor {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn render(&mut self, input: &FrameInput<'_>) -> Result<RgbaImage> {
        Ok(self.compose(input.tick.status.active_pose.as_ref(), &input.tick.camera, input.frame_index))
    }
}

fn tear_shift(y: u32, seed: u32, tear: f32, width: u32) -> f32 {
    if tear <= FX_EPSILON {
        return 0.0;
    }
    let noise = hash01(y / SLICE_HEIGHT, seed) * 2.0 - 1.0;
    noise * tear.min(1.0) * MAX_TEAR * width as f32
}

/// Inverse camera mapping from output pixels into a pose mip level.
struct PoseView<'a> {
    level: &'a RgbaImage,
    /// Output pixels per level-0 source pixel, per axis.
    scale: (f32, f32),
    /// Level-0 to sampled-level coordinate ratio.
    level_ratio: f32,
    anchor: (f32, f32),
    centre: (f32, f32),
    cos_r: f32,
    sin_r: f32,
    split: f32,
}

impl<'a> PoseView<'a> {
    fn new(asset: &'a PoseAsset, camera: &CameraState, width: u32, height: u32) -> Self {
        let (src_w, src_h) = asset.dimensions();
        let base = POSE_FILL * height as f32 / src_h.max(1) as f32;
        let zoom = camera.effective_zoom();
        let scale = (base * zoom * camera.scale_x(), base * zoom * camera.scale_y());
        let level = asset.level_for((src_w as f32 * scale.0).max(1.0) as u32);
        Self {
            level,
            scale,
            level_ratio: level.width() as f32 / src_w.max(1) as f32,
            anchor: (asset.centroid.x, src_h as f32 / 2.0),
            centre: (
                width as f32 / 2.0 + camera.offset_x() * width as f32,
                height as f32 / 2.0 + camera.offset_y() * height as f32,
            ),
            cos_r: camera.rotation.cos(),
            sin_r: camera.rotation.sin(),
            split: camera.moire_amount.min(1.0) * MOIRE_SPLIT,
        }
    }

    /// Premultiplied colour in 0..=1 at an output position.
    fn sample(&self, x: f32, y: f32) -> [f32; 4] {
        if self.scale.0 < 1e-4 || self.scale.1 < 1e-4 {
            return [0.0; 4];
        }
        let (dx, dy) = (x - self.centre.0, y - self.centre.1);
        let ux = dx * self.cos_r + dy * self.sin_r;
        let uy = -dx * self.sin_r + dy * self.cos_r;
        let sx = (self.anchor.0 + ux / self.scale.0) * self.level_ratio;
        let sy = (self.anchor.1 + uy / self.scale.1) * self.level_ratio;

        if self.split <= FX_EPSILON {
            return bilinear(self.level, sx, sy);
        }
        let d = self.split / self.scale.0 * self.level_ratio;
        let red = bilinear(self.level, sx + d, sy);
        let mid = bilinear(self.level, sx, sy);
        let blue = bilinear(self.level, sx - d, sy);
        [red[0], mid[1], blue[2], red[3].max(mid[3]).max(blue[3])]
    }
}

/// Bilinear sample with transparent borders.
fn bilinear(img: &RgbaImage, x: f32, y: f32) -> [f32; 4] {
    let (w, h) = img.dimensions();
    let (fx, fy) = (x - 0.5, y - 0.5);
    let (x0, y0) = (fx.floor(), fy.floor());
    let (tx, ty) = (fx - x0, fy - y0);
    let texel = |ix: f32, iy: f32| -> [f32; 4] {
        if ix < 0.0 || iy < 0.0 || ix >= w as f32 || iy >= h as f32 {
            return [0.0; 4];
        }
        let p = img.get_pixel(ix as u32, iy as u32).0;
        [p[0] as f32 / 255.0, p[1] as f32 / 255.0, p[2] as f32 / 255.0, p[3] as f32 / 255.0]
    };
    let (a, b) = (texel(x0, y0), texel(x0 + 1.0, y0));
    let (c, d) = (texel(x0, y0 + 1.0), texel(x0 + 1.0, y0 + 1.0));
    let mut out = [0.0; 4];
    for i in 0..4 {
        let top = a[i] + (b[i] - a[i]) * tx;
        let bottom = c[i] + (d[i] - c[i]) * tx;
        out[i] = top + (bottom - top) * ty;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::library::PrepareOptions;
    use crate::choreo::pool::FramePool;
    use image::Rgba;

    fn solid_pose(id: &str) -> PoseAsset {
        let img = RgbaImage::from_pixel(16, 16, Rgba([255, 255, 255, 255]));
        let opts = PrepareOptions { softness: 0.0, ..PrepareOptions::default() };
        PoseAsset::prepare(PoseId::from(id), img, &opts)
    }

    fn compositor() -> Compositor {
        let pool = FramePool::new(vec![PoseId::from("white")], vec![], vec![], vec![]);
        let lib = PoseLibrary::from_assets(vec![solid_pose("white")], Some(PoseId::from("white")), pool);
        Compositor::new(Arc::new(lib), 64, 32).with_background([0, 0, 0, 255])
    }

    fn luma(img: &RgbaImage, x: u32, y: u32) -> u8 {
        img.get_pixel(x, y).0[1]
    }

    #[test]
    fn no_pose_draws_only_the_background() {
        let mut c = compositor();
        let frame = c.compose(None, &CameraState::default(), 0);
        assert_eq!(frame.dimensions(), (64, 32));
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn pose_is_centred_at_neutral_camera() {
        let mut c = compositor();
        let frame = c.compose(Some(&PoseId::from("white")), &CameraState::default(), 0);
        assert_eq!(luma(&frame, 32, 16), 255);
        assert_eq!(luma(&frame, 2, 16), 0);
        assert_eq!(luma(&frame, 61, 16), 0);
    }

    #[test]
    fn zoom_widens_the_pose() {
        let mut c = compositor();
        let id = PoseId::from("white");
        let lit = |f: &RgbaImage| (0..64).filter(|&x| luma(f, x, 16) > 128).count();
        let neutral = c.compose(Some(&id), &CameraState::default(), 0);
        let zoomed = c.compose(Some(&id), &CameraState { zoom: 1.5, ..CameraState::default() }, 1);
        assert!(lit(&zoomed) > lit(&neutral));
    }

    #[test]
    fn pan_moves_the_pose() {
        let mut c = compositor();
        let cam = CameraState { pan_x: 0.25, ..CameraState::default() };
        let frame = c.compose(Some(&PoseId::from("white")), &cam, 0);
        assert_eq!(luma(&frame, 26, 16), 0);
        assert_eq!(luma(&frame, 48, 16), 255);
    }

    #[test]
    fn full_yaw_tilt_collapses_the_pose() {
        let mut c = compositor();
        let cam = CameraState { tilt_y: std::f32::consts::FRAC_PI_2, ..CameraState::default() };
        let frame = c.compose(Some(&PoseId::from("white")), &cam, 0);
        assert!(frame.pixels().all(|p| p.0[1] == 0));
    }

    #[test]
    fn tear_shifts_slices_deterministically() {
        let cam = CameraState { tear_amount: 1.0, ..CameraState::default() };
        let id = PoseId::from("white");
        let a = compositor().compose(Some(&id), &cam, 7);
        let b = compositor().compose(Some(&id), &cam, 7);
        assert_eq!(a, b);
        let plain = compositor().compose(Some(&id), &CameraState::default(), 7);
        assert_ne!(a, plain);
    }

    #[test]
    fn ghost_blends_the_previous_frame() {
        let mut c = compositor();
        let id = PoseId::from("white");
        c.compose(Some(&id), &CameraState::default(), 0);
        let cam = CameraState { ghost_amount: 1.0, ..CameraState::default() };
        let frame = c.compose(None, &cam, 1);
        // half of the white pose survives on a black frame
        let v = luma(&frame, 32, 16);
        assert!((120..=135).contains(&v), "{v}");
    }

    #[test]
    fn tear_shift_is_bounded() {
        for y in 0..200 {
            let s = tear_shift(y, 3, 1.0, 100);
            assert!(s.abs() <= MAX_TEAR * 100.0);
        }
        assert_eq!(tear_shift(5, 3, 0.0, 100), 0.0);
    }
}
