use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::choreo::pool::{EnergyTier, FramePool, PoseId, PoseKind};
use crate::error::AssetError;

#[derive(Debug, Clone, Deserialize)]
pub struct PoseEntry {
    pub id: PoseId,
    pub tier: EnergyTier,
    #[serde(default)]
    pub kind: PoseKind,
    /// Relative paths resolve against the manifest's directory.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoseManifest {
    pub default_pose: PoseId,
    pub poses: Vec<PoseEntry>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl PoseManifest {
    pub fn load(path: &Path) -> Result<Self, AssetError> {
        let text = std::fs::read_to_string(path).map_err(|source| AssetError::ManifestIo {
            path: path.to_path_buf(),
            source,
        })?;
        let mut manifest = Self::parse(&text).map_err(|source| AssetError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })?;
        manifest.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> Result<(), AssetError> {
        let mut seen = HashSet::new();
        for entry in &self.poses {
            if !seen.insert(&entry.id) {
                return Err(AssetError::DuplicateId(entry.id.to_string()));
            }
        }
        if !seen.contains(&self.default_pose) {
            return Err(AssetError::UnknownDefault(self.default_pose.to_string()));
        }
        Ok(())
    }

    pub fn resolve_path(&self, entry: &PoseEntry) -> PathBuf {
        if entry.path.is_absolute() {
            entry.path.clone()
        } else {
            self.base_dir.join(&entry.path)
        }
    }

    pub fn frame_pool(&self) -> FramePool {
        FramePool::from_entries(self.poses.iter().map(|e| (&e.id, e.tier, e.kind)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "default_pose": "idle",
        "poses": [
            { "id": "idle", "tier": "low", "path": "idle.png" },
            { "id": "lean", "tier": "mid", "path": "poses/lean.png" },
            { "id": "leap", "tier": "high", "path": "/abs/leap.png" },
            { "id": "face", "tier": "high", "kind": "closeup", "path": "face.png" }
        ]
    }"#;

    #[test]
    fn parses_and_buckets_entries() {
        let manifest = PoseManifest::parse(SAMPLE).unwrap();
        manifest.validate().unwrap();
        assert_eq!(manifest.poses[0].kind, PoseKind::Body);
        assert_eq!(manifest.poses[3].kind, PoseKind::Closeup);

        let pool = manifest.frame_pool();
        assert_eq!(pool.tier(EnergyTier::Low), &[PoseId::from("idle")]);
        assert_eq!(pool.tier(EnergyTier::High), &[PoseId::from("leap")]);
        assert_eq!(pool.closeups(), &[PoseId::from("face")]);
    }

    #[test]
    fn relative_paths_resolve_against_the_manifest_dir() {
        let mut manifest = PoseManifest::parse(SAMPLE).unwrap();
        manifest.base_dir = PathBuf::from("/assets");
        assert_eq!(manifest.resolve_path(&manifest.poses[1]), PathBuf::from("/assets/poses/lean.png"));
        assert_eq!(manifest.resolve_path(&manifest.poses[2]), PathBuf::from("/abs/leap.png"));
    }

    #[test]
    fn rejects_unknown_default_and_duplicates() {
        let bad_default = r#"{"default_pose":"x","poses":[{"id":"a","tier":"low","path":"a.png"}]}"#;
        assert!(matches!(
            PoseManifest::parse(bad_default).unwrap().validate(),
            Err(AssetError::UnknownDefault(id)) if id == "x"
        ));

        let dup = r#"{"default_pose":"a","poses":[
            {"id":"a","tier":"low","path":"a.png"},
            {"id":"a","tier":"high","path":"b.png"}]}"#;
        assert!(matches!(
            PoseManifest::parse(dup).unwrap().validate(),
            Err(AssetError::DuplicateId(_))
        ));
    }

    #[test]
    fn unknown_tier_is_a_parse_error() {
        let text = r#"{"default_pose":"a","poses":[{"id":"a","tier":"extreme","path":"a.png"}]}"#;
        assert!(PoseManifest::parse(text).is_err());
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = PoseManifest::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
