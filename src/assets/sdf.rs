//! Signed distance to the subject's silhouette, used as a parallax depth map.
//!
//! Jump flooding: silhouette edge pixels seed the field, then each pass looks
//! at the 8 neighbours `step` pixels away and keeps the closest seed, halving
//! `step` until it reaches 1. Encoded so that 128 is the edge, lower values
//! are inside the subject and higher values are outside.

use rayon::prelude::*;

const OPAQUE: u8 = 127;

type Seed = Option<(u32, u32)>;

pub fn signed_distance_field(alpha: &[u8], width: usize, height: usize, max_distance: f32) -> Vec<u8> {
    let size = width * height;
    if size == 0 || alpha.len() < size {
        return Vec::new();
    }
    let max_distance = max_distance.max(1.0);

    let mut seeds: Vec<Seed> = (0..size)
        .map(|idx| {
            let (x, y) = (idx % width, idx / width);
            is_edge(alpha, width, height, x, y).then_some((x as u32, y as u32))
        })
        .collect();

    let mut step = (width.max(height) / 2).max(1);
    loop {
        seeds = flood_pass(&seeds, width, height, step);
        if step == 1 {
            break;
        }
        step /= 2;
    }
    // One more unit pass cleans up most jump-flooding misassignments.
    seeds = flood_pass(&seeds, width, height, 1);

    seeds
        .par_iter()
        .enumerate()
        .map(|(idx, seed)| {
            let (x, y) = (idx % width, idx / width);
            let dist = seed.map_or(max_distance, |s| distance(x, y, s)).min(max_distance);
            let signed = if alpha[idx] > OPAQUE { -dist } else { dist };
            (signed / max_distance * 127.0 + 128.0).clamp(0.0, 255.0) as u8
        })
        .collect()
}

fn flood_pass(seeds: &[Seed], width: usize, height: usize, step: usize) -> Vec<Seed> {
    let step = step as i64;
    let mut next = seeds.to_vec();
    next.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let mut best = *out;
            let mut best_dist = best.map_or(f32::INFINITY, |s| distance(x, y, s));
            for dy in [-1i64, 0, 1] {
                for dx in [-1i64, 0, 1] {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as i64 + dx * step;
                    let ny = y as i64 + dy * step;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    if let Some(seed) = seeds[ny as usize * width + nx as usize] {
                        let d = distance(x, y, seed);
                        if d < best_dist {
                            best_dist = d;
                            best = Some(seed);
                        }
                    }
                }
            }
            *out = best;
        }
    });
    next
}

/// A pixel whose opacity differs from one of its 4-neighbours.
fn is_edge(alpha: &[u8], width: usize, height: usize, x: usize, y: usize) -> bool {
    let inside = alpha[y * width + x] > OPAQUE;
    let neighbours = [
        (x.wrapping_sub(1), y),
        (x + 1, y),
        (x, y.wrapping_sub(1)),
        (x, y + 1),
    ];
    neighbours
        .iter()
        .filter(|&&(nx, ny)| nx < width && ny < height)
        .any(|&(nx, ny)| (alpha[ny * width + nx] > OPAQUE) != inside)
}

fn distance(x: usize, y: usize, seed: (u32, u32)) -> f32 {
    let dx = x as f32 - seed.0 as f32;
    let dy = y as f32 - seed.1 as f32;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disc(size: usize, radius: f32) -> Vec<u8> {
        let c = size as f32 / 2.0;
        (0..size * size)
            .map(|i| {
                let (x, y) = ((i % size) as f32, (i / size) as f32);
                if ((x - c).powi(2) + (y - c).powi(2)).sqrt() < radius { 255 } else { 0 }
            })
            .collect()
    }

    #[test]
    fn empty_mask_is_all_outside() {
        let sdf = signed_distance_field(&[0u8; 16], 4, 4, 10.0);
        assert_eq!(sdf.len(), 16);
        assert!(sdf.iter().all(|&v| v == 255));
    }

    #[test]
    fn filled_mask_is_all_inside() {
        let sdf = signed_distance_field(&[255u8; 16], 4, 4, 10.0);
        assert!(sdf.iter().all(|&v| v <= 128));
    }

    #[test]
    fn disc_gets_deeper_toward_its_centre() {
        let size = 32;
        let alpha = disc(size, 10.0);
        let sdf = signed_distance_field(&alpha, size, size, 16.0);
        let at = |x: usize, y: usize| sdf[y * size + x];
        let centre = at(16, 16);
        let near_rim = at(16 + 8, 16);
        let outside = at(31, 31);
        assert!(centre < near_rim, "centre {centre} rim {near_rim}");
        assert!(near_rim <= 128);
        assert!(outside > 128);
    }

    #[test]
    fn flooding_matches_brute_force_on_a_small_mask() {
        let size = 16;
        let alpha = disc(size, 5.0);
        let sdf = signed_distance_field(&alpha, size, size, 32.0);
        let edges: Vec<(usize, usize)> = (0..size * size)
            .map(|i| (i % size, i / size))
            .filter(|&(x, y)| is_edge(&alpha, size, size, x, y))
            .collect();
        for y in 0..size {
            for x in 0..size {
                let exact = edges
                    .iter()
                    .map(|&(ex, ey)| distance(x, y, (ex as u32, ey as u32)))
                    .fold(f32::INFINITY, f32::min);
                let signed = if alpha[y * size + x] > OPAQUE { -exact } else { exact };
                let expected = (signed / 32.0 * 127.0 + 128.0).clamp(0.0, 255.0) as i32;
                assert!((sdf[y * size + x] as i32 - expected).abs() <= 4, "({x},{y})");
            }
        }
    }

    #[test]
    fn short_buffer_yields_nothing() {
        assert!(signed_distance_field(&[0u8; 3], 2, 2, 4.0).is_empty());
    }
}
