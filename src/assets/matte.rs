use rayon::prelude::*;

/// Centroid and bounding box of the opaque part of a matte.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Centroid {
    pub x: f32,
    pub y: f32,
    pub area: u32,
    pub bounds: Bounds,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Opaque pixels are those at or above `threshold`. An empty matte reports
/// the image centre with zero area and full-frame bounds.
pub fn centroid(alpha: &[u8], width: u32, height: u32, threshold: u8) -> Centroid {
    let w = width as usize;
    let (mut sum_x, mut sum_y, mut area) = (0.0f64, 0.0f64, 0u32);
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0u32, 0u32);

    for (idx, _) in alpha.iter().enumerate().filter(|(_, &a)| a >= threshold) {
        let (x, y) = ((idx % w) as u32, (idx / w) as u32);
        sum_x += x as f64;
        sum_y += y as f64;
        area += 1;
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    if area == 0 {
        return Centroid {
            x: (width / 2) as f32,
            y: (height / 2) as f32,
            area: 0,
            bounds: Bounds { x: 0, y: 0, width, height },
        };
    }

    Centroid {
        x: (sum_x / area as f64) as f32,
        y: (sum_y / area as f64) as f32,
        area,
        bounds: Bounds {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        },
    }
}

/// Soften jagged matte edges in place and premultiply colour by the new
/// alpha. `softness` in 0..=1; 0 leaves pixels untouched.
pub fn normalize(rgba: &mut [u8], width: u32, height: u32, softness: f32) -> Centroid {
    let (w, h) = (width as usize, height as usize);
    let mut alpha: Vec<u8> = rgba.chunks_exact(4).map(|px| px[3]).collect();

    if softness > 0.0 {
        alpha = soften(&alpha, w, h, softness.min(1.0));
        rgba.par_chunks_exact_mut(4).zip(alpha.par_iter()).for_each(|(px, &a)| px[3] = a);
        premultiply(rgba);
    }

    centroid(&alpha, width, height, 128)
}

/// Scale colour by alpha in place.
pub fn premultiply(rgba: &mut [u8]) {
    rgba.par_chunks_exact_mut(4).for_each(|px| {
        let k = px[3] as f32 / 255.0;
        px[0] = (px[0] as f32 * k) as u8;
        px[1] = (px[1] as f32 * k) as u8;
        px[2] = (px[2] as f32 * k) as u8;
    });
}

/// Separable box blur blended with the original by `strength`.
fn soften(alpha: &[u8], w: usize, h: usize, strength: f32) -> Vec<u8> {
    let radius = (strength * 2.0).ceil() as usize;
    if radius == 0 || w == 0 || h == 0 {
        return alpha.to_vec();
    }

    let box_mean = |get: &dyn Fn(usize) -> u8, len: usize, i: usize| -> u8 {
        let lo = i.saturating_sub(radius);
        let hi = (i + radius).min(len - 1);
        let sum: u32 = (lo..=hi).map(|j| get(j) as u32).sum();
        (sum / (hi - lo + 1) as u32) as u8
    };

    let mut horizontal = vec![0u8; w * h];
    for y in 0..h {
        let row = &alpha[y * w..(y + 1) * w];
        for x in 0..w {
            horizontal[y * w + x] = box_mean(&|j| row[j], w, x);
        }
    }

    let mut blurred = vec![0u8; w * h];
    for x in 0..w {
        for y in 0..h {
            blurred[y * w + x] = box_mean(&|j| horizontal[j * w + x], h, y);
        }
    }

    alpha
        .iter()
        .zip(&blurred)
        .map(|(&a, &b)| (a as f32 * (1.0 - strength) + b as f32 * strength).round() as u8)
        .collect()
}

/// Grow the matte with a circular kernel.
pub fn dilate(alpha: &[u8], width: u32, height: u32, radius: u32) -> Vec<u8> {
    morph(alpha, width, height, radius, 0, u8::max)
}

/// Shrink the matte with a circular kernel.
pub fn erode(alpha: &[u8], width: u32, height: u32, radius: u32) -> Vec<u8> {
    morph(alpha, width, height, radius, 255, u8::min)
}

fn morph(alpha: &[u8], width: u32, height: u32, radius: u32, init: u8, op: fn(u8, u8) -> u8) -> Vec<u8> {
    let (w, h, r) = (width as i32, height as i32, radius as i32);
    let mut out = vec![init; (w * h).max(0) as usize];
    out.par_chunks_mut(w.max(1) as usize).enumerate().for_each(|(y, row)| {
        let y = y as i32;
        for (x, px) in row.iter_mut().enumerate() {
            let x = x as i32;
            let mut acc = init;
            for dy in -r..=r {
                for dx in -r..=r {
                    if dx * dx + dy * dy > r * r {
                        continue;
                    }
                    let (sx, sy) = (x + dx, y + dy);
                    if sx >= 0 && sx < w && sy >= 0 && sy < h {
                        acc = op(acc, alpha[(sy * w + sx) as usize]);
                    }
                }
            }
            *px = acc;
        }
    });
    out
}
