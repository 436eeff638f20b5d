use rand::Rng;
use std::fmt;
use std::sync::Arc;

use super::beat::{BeatDetector, DetectorConfig, Onsets};
use super::camera::{CameraRig, CameraState, Intensity};
use super::pattern::Pattern;
use super::pool::{self, FramePool, PoseId};
use super::stutter::{GlitchStyle, StutterMachine, StutterStyle};
use crate::audio::bands::AudioBands;

/// Longest step the physics will take in one tick, so a stalled frame
/// doesn't snap the camera straight to neutral.
const MAX_TICK: f64 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    pub density: u8,
    pub style: StutterStyle,
    pub intensity: Intensity,
    pub pattern: Pattern,
    pub detector: DetectorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            density: 50,
            style: StutterStyle::Auto,
            intensity: Intensity::Normal,
            pattern: Pattern::Abab,
            detector: DetectorConfig::default(),
        }
    }
}

/// Why the current pose is on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intention {
    Idle,
    Groove,
    Accent,
    Burst(GlitchStyle),
}

impl fmt::Display for Intention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intention::Idle => f.write_str("idle"),
            Intention::Groove => f.write_str("groove"),
            Intention::Accent => f.write_str("accent"),
            Intention::Burst(style) => write!(f, "burst:{}", style),
        }
    }
}

/// Read-only view of the engine after a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub active_pose: Option<PoseId>,
    pub intention: Intention,
    pub bar: u64,
    pub beat: u8,
    pub pattern: Pattern,
    pub confidence: f32,
}

#[derive(Clone, Debug)]
pub struct TickOutput {
    pub status: StatusSnapshot,
    pub camera: CameraState,
    pub onsets: Onsets,
    pub pose_changed: bool,
}

/// One choreography session: detector, sequencer, stutter machine and camera.
///
/// Live preview and export each build their own instance; only the config
/// and the pose pool are shared.
pub struct ChoreoEngine<R: Rng> {
    pool: Arc<FramePool>,
    detector: BeatDetector,
    stutter: StutterMachine,
    camera: CameraRig,
    pattern: Pattern,
    current_pose: Option<PoseId>,
    intention: Intention,
    last_time: Option<f64>,
    rng: R,
}

impl<R: Rng> ChoreoEngine<R> {
    pub fn new(config: EngineConfig, pool: Arc<FramePool>, rng: R) -> Self {
        let current_pose = pool.for_slot(config.pattern.slot(0)).first().cloned();
        Self {
            detector: BeatDetector::new(config.detector),
            stutter: StutterMachine::new(config.density, config.style),
            camera: CameraRig::new(config.intensity),
            pattern: config.pattern,
            current_pose,
            intention: Intention::Idle,
            last_time: None,
            pool,
            rng,
        }
    }

    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    pub fn camera(&self) -> &CameraState {
        self.camera.state()
    }

    pub fn tick(&mut self, now: f64, bands: &AudioBands) -> TickOutput {
        let dt = self.last_time.map_or(0.0, |t| (now - t).clamp(0.0, MAX_TICK));
        self.last_time = Some(now);
        self.camera.step(dt as f32);

        if self.stutter.expire(now) {
            log::debug!("Burst ended at {:.2}s", now);
            self.intention = Intention::Groove;
        }

        let previous = self.current_pose.clone();
        let onsets = self.detector.process(now, bands);

        if let Some(kick) = onsets.kick {
            if kick.phrase_boundary {
                self.pattern = Pattern::roll(&mut self.rng);
                log::debug!("Bar {}: pattern -> {}", kick.bar, self.pattern);
            }
            if !self.stutter.is_active() {
                let slot = self.pattern.slot(kick.beat);
                self.show(|p| p.for_slot(slot));
                self.camera.kick(&mut self.rng);
                self.intention = Intention::Groove;
            }
        }

        if let Some(snare) = onsets.snare {
            let since = self.detector.state().beats_since_stutter;
            if let Some(style) = self.stutter.try_trigger(now, snare.strength, since, &mut self.rng) {
                self.detector.reset_stutter_count();
                self.intention = Intention::Burst(style);
                log::debug!("Burst '{}' at {:.2}s after {} beats", style, now, since);
            } else if !self.stutter.is_active() {
                self.show(FramePool::for_accent);
                self.camera.snare();
                self.intention = Intention::Accent;
            }
        }

        if let Some(style) = self.stutter.due_hit(now) {
            self.show(|p| match style {
                GlitchStyle::Smash if !p.closeups().is_empty() => p.closeups(),
                _ => p.for_accent(),
            });
            self.camera.slam(style, &mut self.rng);
        }

        let state = self.detector.state();
        TickOutput {
            status: StatusSnapshot {
                active_pose: self.current_pose.clone(),
                intention: self.intention,
                bar: state.bar_counter,
                beat: state.beat_counter,
                pattern: self.pattern,
                confidence: bands.bass.max(bands.snare).clamp(0.0, 1.0),
            },
            camera: *self.camera.state(),
            onsets,
            pose_changed: previous != self.current_pose,
        }
    }

    fn show<F>(&mut self, candidates: F)
    where
        F: for<'a> Fn(&'a FramePool) -> &'a [PoseId],
    {
        let list = candidates(self.pool.as_ref());
        if let Some(next) = pool::pick(list, self.current_pose.as_ref(), &mut self.rng) {
            self.current_pose = Some(next);
        }
    }
}
