use rand::Rng;
use serde::Deserialize;
use std::fmt;

use super::pattern::Slot;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct PoseId(String);

impl PoseId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PoseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for PoseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyTier {
    Low,
    Mid,
    High,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseKind {
    #[default]
    Body,
    Closeup,
}

/// Pose ids bucketed by energy.
///
/// Built once per asset set. After construction `mid` and `high` are never
/// empty while `low` has entries: an empty tier inherits the one below it.
#[derive(Clone, Debug, Default)]
pub struct FramePool {
    low: Vec<PoseId>,
    mid: Vec<PoseId>,
    high: Vec<PoseId>,
    closeups: Vec<PoseId>,
}

impl FramePool {
    pub fn new(low: Vec<PoseId>, mut mid: Vec<PoseId>, mut high: Vec<PoseId>, closeups: Vec<PoseId>) -> Self {
        if mid.is_empty() {
            mid = low.clone();
        }
        if high.is_empty() {
            high = mid.clone();
        }
        Self { low, mid, high, closeups }
    }

    /// Bucket `(id, tier, kind)` entries. Closeups go to their own tier
    /// regardless of energy.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a PoseId, EnergyTier, PoseKind)>,
    {
        let (mut low, mut mid, mut high, mut closeups) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
        for (id, tier, kind) in entries {
            let bucket = match (kind, tier) {
                (PoseKind::Closeup, _) => &mut closeups,
                (PoseKind::Body, EnergyTier::Low) => &mut low,
                (PoseKind::Body, EnergyTier::Mid) => &mut mid,
                (PoseKind::Body, EnergyTier::High) => &mut high,
            };
            bucket.push(id.clone());
        }
        Self::new(low, mid, high, closeups)
    }

    pub fn tier(&self, tier: EnergyTier) -> &[PoseId] {
        match tier {
            EnergyTier::Low => &self.low,
            EnergyTier::Mid => &self.mid,
            EnergyTier::High => &self.high,
        }
    }

    pub fn closeups(&self) -> &[PoseId] {
        &self.closeups
    }

    pub fn is_empty(&self) -> bool {
        self.low.is_empty() && self.mid.is_empty() && self.high.is_empty() && self.closeups.is_empty()
    }

    /// Candidate list for a pattern slot, with fallback to the next tier and
    /// finally to whatever tier still has poses, starting from `low`.
    pub fn for_slot(&self, slot: Slot) -> &[PoseId] {
        let chain: &[EnergyTier] = match slot {
            Slot::A => &[EnergyTier::Low, EnergyTier::Mid],
            Slot::B => &[EnergyTier::Mid, EnergyTier::High],
            Slot::C => &[EnergyTier::High],
        };
        self.first_non_empty(chain)
    }

    /// Snare accents always reach for the higher-energy tiers.
    pub fn for_accent(&self) -> &[PoseId] {
        self.first_non_empty(&[EnergyTier::High, EnergyTier::Mid])
    }

    fn first_non_empty(&self, chain: &[EnergyTier]) -> &[PoseId] {
        const LAST_RESORT: [EnergyTier; 3] = [EnergyTier::Low, EnergyTier::Mid, EnergyTier::High];
        chain
            .iter()
            .chain(LAST_RESORT.iter())
            .map(|&t| self.tier(t))
            .find(|c| !c.is_empty())
            .unwrap_or(&self.low)
    }

    /// Every distinct id in display order: low, mid, high, closeups.
    pub fn ordered_ids(&self) -> Vec<PoseId> {
        let mut ids: Vec<PoseId> = Vec::new();
        for id in self.low.iter().chain(&self.mid).chain(&self.high).chain(&self.closeups) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

/// Uniform pick that avoids repeating `current` whenever another candidate
/// exists. `None` only for an empty candidate list.
pub fn pick<R: Rng + ?Sized>(candidates: &[PoseId], current: Option<&PoseId>, rng: &mut R) -> Option<PoseId> {
    let fresh: Vec<&PoseId> = candidates.iter().filter(|c| Some(*c) != current).collect();
    if fresh.is_empty() {
        if candidates.is_empty() {
            return None;
        }
        return Some(candidates[rng.gen_range(0..candidates.len())].clone());
    }
    Some(fresh[rng.gen_range(0..fresh.len())].clone())
}
