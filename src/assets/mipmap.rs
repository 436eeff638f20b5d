use image::RgbaImage;
use rayon::prelude::*;
use std::sync::OnceLock;

/// Build a mip chain starting with `base`. Each level halves both sides with
/// a 2x2 box filter averaged in linear light. Stops early at 1x1.
pub fn generate(base: &RgbaImage, levels: u32) -> Vec<RgbaImage> {
    let mut chain = vec![base.clone()];
    for _ in 1..levels.max(1) {
        let Some(prev) = chain.last() else { break };
        if prev.width() <= 1 && prev.height() <= 1 {
            break;
        }
        let next = downsample_2x(prev);
        chain.push(next);
    }
    chain
}

pub fn downsample_2x(src: &RgbaImage) -> RgbaImage {
    let (sw, sh) = src.dimensions();
    let (dw, dh) = ((sw / 2).max(1), (sh / 2).max(1));
    let lut = srgb_lut();
    let raw = src.as_raw();

    let mut out = vec![0u8; (dw * dh * 4) as usize];
    out.par_chunks_mut((dw * 4) as usize).enumerate().for_each(|(y, row)| {
        for x in 0..dw as usize {
            let mut acc = [0.0f32; 4];
            let mut taps = 0.0;
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let sx = (x * 2 + dx).min(sw as usize - 1);
                let sy = (y * 2 + dy).min(sh as usize - 1);
                let i = (sy * sw as usize + sx) * 4;
                acc[0] += lut[raw[i] as usize];
                acc[1] += lut[raw[i + 1] as usize];
                acc[2] += lut[raw[i + 2] as usize];
                acc[3] += raw[i + 3] as f32;
                taps += 1.0;
            }
            let px = &mut row[x * 4..x * 4 + 4];
            px[0] = linear_to_srgb(acc[0] / taps);
            px[1] = linear_to_srgb(acc[1] / taps);
            px[2] = linear_to_srgb(acc[2] / taps);
            px[3] = (acc[3] / taps).round() as u8;
        }
    });

    // Length always matches dw * dh * 4, so from_raw cannot fail.
    RgbaImage::from_raw(dw, dh, out).unwrap_or_else(|| RgbaImage::new(dw, dh))
}

/// Mip level to sample when drawing `source` pixels into `output` pixels.
pub fn select_level(output: u32, source: u32, count: u32) -> u32 {
    if output == 0 || output >= source || count == 0 {
        return 0;
    }
    let level = (source as f32 / output as f32).log2().floor() as u32;
    level.min(count - 1)
}

fn srgb_lut() -> &'static [f32; 256] {
    static LUT: OnceLock<[f32; 256]> = OnceLock::new();
    LUT.get_or_init(|| {
        let mut lut = [0.0f32; 256];
        for (i, v) in lut.iter_mut().enumerate() {
            let c = i as f32 / 255.0;
            *v = if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) };
        }
        lut
    })
}

pub fn srgb_to_linear(value: u8) -> f32 {
    srgb_lut()[value as usize]
}

pub fn linear_to_srgb(value: f32) -> u8 {
    let v = if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    };
    (v * 255.0).clamp(0.0, 255.0).round() as u8
}
