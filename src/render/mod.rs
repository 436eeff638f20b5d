pub mod animator;
pub mod compositor;
pub mod frame;
pub mod gpu;
pub mod hud;
pub mod interpolator;
pub mod stitch;
pub mod zoom;

use anyhow::Result;
use image::RgbaImage;

use crate::assets::mipmap::srgb_to_linear;
use crate::audio::bands::AudioBands;
use crate::choreo::engine::TickOutput;

/// Backdrop behind the character, sRGB. Both renderers clear to it.
pub const BACKGROUND: [u8; 4] = [12, 12, 16, 255];

/// [`BACKGROUND`] decoded to linear light, for sRGB targets that encode on store.
pub(crate) fn background_linear() -> [f32; 4] {
    let [r, g, b, _] = BACKGROUND;
    [srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b), 1.0]
}

/// Everything a renderer may look at for one frame.
pub struct FrameInput<'a> {
    pub tick: &'a TickOutput,
    pub bands: &'a AudioBands,
    pub dt: f32,
    pub frame_index: u64,
}

/// Turns one engine tick into one RGBA frame.
pub trait Renderer {
    fn size(&self) -> (u32, u32);
    fn render(&mut self, input: &FrameInput<'_>) -> Result<RgbaImage>;
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn size(&self) -> (u32, u32) {
        (**self).size()
    }

    fn render(&mut self, input: &FrameInput<'_>) -> Result<RgbaImage> {
        (**self).render(input)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// CPU 2D compositor; never touches the GPU.
    #[default]
    Composite,
    /// GPU frame interpolation across the pose ring.
    Interpolate,
}

/// Small integer hash mapped to [0, 1), stable across runs.
pub(crate) fn hash01(a: u32, b: u32) -> f32 {
    let mut h = a.wrapping_mul(0x9E37_79B9) ^ b.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846C_A68B);
    h ^= h >> 16;
    (h >> 8) as f32 / (1u32 << 24) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_in_range() {
        for a in 0..50 {
            for b in 0..50 {
                let v = hash01(a, b);
                assert!((0.0..1.0).contains(&v));
                assert_eq!(v, hash01(a, b));
            }
        }
        assert_ne!(hash01(1, 2), hash01(2, 1));
    }
}
