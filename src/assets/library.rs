use image::{GrayImage, RgbaImage};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::manifest::PoseManifest;
use super::matte::{self, Centroid};
use super::{mipmap, sdf};
use crate::choreo::pool::{FramePool, PoseId};
use crate::error::AssetError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrepareOptions {
    /// Matte edge softening, 0..=1.
    pub softness: f32,
    /// Distance in pixels that maps to the ends of the SDF range.
    pub sdf_range: f32,
    pub mip_levels: u32,
    /// Dilate the matte by this many pixels before softening.
    pub matte_grow: u32,
    /// Erode the matte by this many pixels, after any growth.
    pub matte_shrink: u32,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            softness: 0.5,
            sdf_range: 32.0,
            mip_levels: 4,
            matte_grow: 0,
            matte_shrink: 0,
        }
    }
}

/// A decoded pose with everything the renderers need precomputed.
pub struct PoseAsset {
    pub id: PoseId,
    /// Mip chain, level 0 at full resolution.
    pub mips: Vec<RgbaImage>,
    pub sdf: GrayImage,
    pub centroid: Centroid,
}

impl PoseAsset {
    pub fn prepare(id: PoseId, mut image: RgbaImage, options: &PrepareOptions) -> Self {
        let (w, h) = image.dimensions();
        if options.matte_grow > 0 || options.matte_shrink > 0 {
            let mut alpha: Vec<u8> = image.pixels().map(|p| p.0[3]).collect();
            if options.matte_grow > 0 {
                alpha = matte::dilate(&alpha, w, h, options.matte_grow);
            }
            if options.matte_shrink > 0 {
                alpha = matte::erode(&alpha, w, h, options.matte_shrink);
            }
            for (px, a) in image.pixels_mut().zip(alpha) {
                px.0[3] = a;
            }
        }
        let centroid = matte::normalize(&mut image, w, h, options.softness);
        if options.softness <= 0.0 {
            matte::premultiply(&mut image);
        }
        let alpha: Vec<u8> = image.pixels().map(|p| p.0[3]).collect();
        let field = sdf::signed_distance_field(&alpha, w as usize, h as usize, options.sdf_range);
        let sdf = GrayImage::from_raw(w, h, field).unwrap_or_else(|| GrayImage::new(w, h));
        let mips = mipmap::generate(&image, options.mip_levels);
        Self { id, mips, sdf, centroid }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.mips[0]
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image().dimensions()
    }

    /// Level to sample when drawing this pose `output_width` pixels wide.
    pub fn level_for(&self, output_width: u32) -> &RgbaImage {
        let level = mipmap::select_level(output_width, self.dimensions().0, self.mips.len() as u32);
        &self.mips[level as usize]
    }
}

/// Loaded poses plus the frame pool built from the manifest.
///
/// Ids whose image failed to load stay in the pool and render as the
/// default pose; a warning is logged the first time each one is drawn.
pub struct PoseLibrary {
    assets: HashMap<PoseId, PoseAsset>,
    default_pose: Option<PoseId>,
    pool: Arc<FramePool>,
    warned: Mutex<HashSet<PoseId>>,
}

impl PoseLibrary {
    #[cfg(test)]
    pub fn empty() -> Self {
        Self::from_assets(Vec::new(), None, FramePool::default())
    }

    pub fn from_assets(assets: Vec<PoseAsset>, default_pose: Option<PoseId>, pool: FramePool) -> Self {
        Self {
            assets: assets.into_iter().map(|a| (a.id.clone(), a)).collect(),
            default_pose,
            pool: Arc::new(pool),
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Decode every pose image in parallel. Individual decode failures are
    /// logged and leave that id to fall back to the default pose.
    pub fn load(manifest: &PoseManifest, options: &PrepareOptions) -> Self {
        let decoded: Vec<Result<PoseAsset, AssetError>> = manifest
            .poses
            .par_iter()
            .map(|entry| {
                let path = manifest.resolve_path(entry);
                let image = image::open(&path)
                    .map_err(|source| AssetError::Image { path: path.clone(), source })?
                    .into_rgba8();
                Ok(PoseAsset::prepare(entry.id.clone(), image, options))
            })
            .collect();

        let mut assets = Vec::with_capacity(decoded.len());
        for result in decoded {
            match result {
                Ok(asset) => assets.push(asset),
                Err(e) => log::warn!("{}: {}", e, error_source(&e)),
            }
        }
        log::info!("Loaded {}/{} pose images", assets.len(), manifest.poses.len());

        if !assets.iter().any(|a| a.id == manifest.default_pose) {
            log::warn!("Default pose '{}' has no image; missing poses will be skipped", manifest.default_pose);
        }

        Self::from_assets(assets, Some(manifest.default_pose.clone()), manifest.frame_pool())
    }

    pub fn pool(&self) -> Arc<FramePool> {
        Arc::clone(&self.pool)
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Image for `id`, or the default pose when `id` has none.
    pub fn get(&self, id: &PoseId) -> Option<&PoseAsset> {
        if let Some(asset) = self.assets.get(id) {
            return Some(asset);
        }
        if let Ok(mut warned) = self.warned.lock() {
            if warned.insert(id.clone()) {
                log::warn!("Pose '{}' has no image, showing the default pose", id);
            }
        }
        self.default_pose.as_ref().and_then(|d| self.assets.get(d))
    }

    /// Poses in pool order, for the interpolation ring.
    pub fn ordered(&self) -> Vec<&PoseAsset> {
        self.pool.ordered_ids().iter().filter_map(|id| self.assets.get(id)).collect()
    }

    #[cfg(test)]
    fn warned_count(&self) -> usize {
        self.warned.lock().map(|w| w.len()).unwrap_or(0)
    }
}

fn error_source(e: &AssetError) -> String {
    std::error::Error::source(e).map(|s| s.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn blob(id: &str, size: u32) -> PoseAsset {
        let mut img = RgbaImage::new(size, size);
        for y in size / 4..size * 3 / 4 {
            for x in size / 4..size * 3 / 4 {
                img.put_pixel(x, y, Rgba([200, 50, 50, 255]));
            }
        }
        PoseAsset::prepare(PoseId::from(id), img, &PrepareOptions::default())
    }

    fn ids(names: &[&str]) -> Vec<PoseId> {
        names.iter().map(|&n| PoseId::from(n)).collect()
    }

    #[test]
    fn prepare_builds_sdf_and_mips() {
        let asset = blob("a", 32);
        assert_eq!(asset.dimensions(), (32, 32));
        assert_eq!(asset.mips.len(), 4);
        assert_eq!(asset.sdf.dimensions(), (32, 32));
        assert!(asset.sdf.get_pixel(16, 16).0[0] < 128);
        assert!(asset.sdf.get_pixel(0, 0).0[0] > 128);
        assert!((asset.centroid.x - 15.5).abs() < 1.0);
        assert_eq!(asset.level_for(8).width(), 8);
        assert_eq!(asset.level_for(32).width(), 32);
    }

    #[test]
    fn matte_grow_and_shrink_reshape_the_silhouette() {
        let mut img = RgbaImage::new(9, 9);
        img.put_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let sharp = PrepareOptions { softness: 0.0, ..PrepareOptions::default() };

        let plain = PoseAsset::prepare(PoseId::from("dot"), img.clone(), &sharp);
        assert_eq!(plain.centroid.area, 1);

        let grown = PrepareOptions { matte_grow: 1, ..sharp };
        assert_eq!(PoseAsset::prepare(PoseId::from("dot"), img.clone(), &grown).centroid.area, 5);

        let shrunk = PrepareOptions { matte_shrink: 1, ..sharp };
        assert_eq!(PoseAsset::prepare(PoseId::from("dot"), img.clone(), &shrunk).centroid.area, 0);

        let closed = PrepareOptions { matte_grow: 1, matte_shrink: 1, ..sharp };
        assert_eq!(PoseAsset::prepare(PoseId::from("dot"), img, &closed).centroid.area, 1);
    }

    #[test]
    fn missing_pose_falls_back_to_default_and_warns_once() {
        let pool = FramePool::new(ids(&["idle", "ghost"]), vec![], vec![], vec![]);
        let lib = PoseLibrary::from_assets(vec![blob("idle", 8)], Some(PoseId::from("idle")), pool);
        let ghost = PoseId::from("ghost");
        assert_eq!(lib.get(&ghost).map(|a| a.id.as_str()), Some("idle"));
        assert_eq!(lib.get(&ghost).map(|a| a.id.as_str()), Some("idle"));
        assert_eq!(lib.warned_count(), 1);
        assert_eq!(lib.get(&PoseId::from("idle")).map(|a| a.id.as_str()), Some("idle"));
        assert_eq!(lib.warned_count(), 1);
    }

    #[test]
    fn ordered_skips_unloaded_ids() {
        let pool = FramePool::new(ids(&["a"]), ids(&["b"]), ids(&["c"]), vec![]);
        let lib = PoseLibrary::from_assets(vec![blob("c", 8), blob("a", 8)], None, pool);
        let order: Vec<&str> = lib.ordered().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(order, vec!["a", "c"]);
    }

    #[test]
    fn empty_library_has_nothing_to_draw() {
        let lib = PoseLibrary::empty();
        assert!(lib.is_empty());
        assert!(lib.get(&PoseId::from("any")).is_none());
        assert!(lib.pool().is_empty());
    }
}
