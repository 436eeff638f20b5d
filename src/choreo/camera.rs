use rand::Rng;
use serde::Deserialize;

use super::stutter::GlitchStyle;

/// Relaxation rate for zoom, shake, pan, tilt and rotation (1/s).
pub const FAST_DECAY: f32 = 12.0;
/// Fast rate in high-intensity mode.
pub const FAST_DECAY_HIGH: f32 = 16.0;
/// Secondary sway outlasts the primary impulse.
pub const SLOW_DECAY: f32 = 2.0;

/// Per-reference-tick multiplicative decay of glitch FX.
const TEAR_FALLOFF: f32 = 0.8;
const GHOST_FALLOFF: f32 = 0.9;
const MOIRE_FALLOFF: f32 = 0.95;
/// FX falloff factors are defined per tick at this rate.
const REFERENCE_HZ: f32 = 60.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    #[default]
    Normal,
    High,
}

impl Intensity {
    pub fn fast_decay(self) -> f32 {
        match self {
            Intensity::Normal => FAST_DECAY,
            Intensity::High => FAST_DECAY_HIGH,
        }
    }

    pub fn impulse_scale(self) -> f32 {
        match self {
            Intensity::Normal => 1.0,
            Intensity::High => 1.5,
        }
    }
}

/// Virtual camera. Offsets are fractions of the frame size, angles radians.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub zoom: f32,
    pub shake_x: f32,
    pub shake_y: f32,
    pub pan_x: f32,
    pub pan_y: f32,
    pub rotation: f32,
    pub tilt_x: f32,
    pub tilt_y: f32,
    pub sway: f32,
    pub dolly_zoom: f32,
    pub tear_amount: f32,
    pub ghost_amount: f32,
    pub moire_amount: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            shake_x: 0.0,
            shake_y: 0.0,
            pan_x: 0.0,
            pan_y: 0.0,
            rotation: 0.0,
            tilt_x: 0.0,
            tilt_y: 0.0,
            sway: 0.0,
            dolly_zoom: 0.0,
            tear_amount: 0.0,
            ghost_amount: 0.0,
            moire_amount: 0.0,
        }
    }
}

impl CameraState {
    /// Horizontal foreshortening from yaw tilt plus sway, in [0, 1].
    pub fn scale_x(&self) -> f32 {
        (self.tilt_y + self.sway).cos().abs()
    }

    /// Vertical foreshortening from pitch tilt, in [0, 1].
    pub fn scale_y(&self) -> f32 {
        self.tilt_x.cos().abs()
    }

    /// Total magnification including the dolly component.
    pub fn effective_zoom(&self) -> f32 {
        (self.zoom + self.dolly_zoom).max(0.05)
    }

    pub fn offset_x(&self) -> f32 {
        self.pan_x + self.shake_x
    }

    pub fn offset_y(&self) -> f32 {
        self.pan_y + self.shake_y
    }
}

/// First-order lag toward `target`; never overshoots for `rate, dt >= 0`.
pub fn relax(value: f32, target: f32, rate: f32, dt: f32) -> f32 {
    value + (target - value) * (1.0 - (-rate * dt).exp())
}

/// Impulse-driven camera simulator shared by the live and export loops.
#[derive(Clone, Debug)]
pub struct CameraRig {
    state: CameraState,
    intensity: Intensity,
    smash_in: bool,
}

impl CameraRig {
    pub fn new(intensity: Intensity) -> Self {
        Self {
            state: CameraState::default(),
            intensity,
            smash_in: true,
        }
    }

    pub fn state(&self) -> &CameraState {
        &self.state
    }

    /// Kick: push in and lean forward.
    pub fn kick<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let m = self.intensity.impulse_scale();
        self.state.zoom = 1.0 + 0.08 * m;
        self.state.tilt_x = 0.12 * m;
        self.state.dolly_zoom = 0.03 * m;
        self.state.sway = rng.gen_range(-0.15..0.15) * m;
    }

    /// Snare: pull out, lean back and tear the image.
    pub fn snare(&mut self) {
        let m = self.intensity.impulse_scale();
        self.state.zoom = 1.0 - 0.06 * m;
        self.state.tilt_x = -0.10 * m;
        self.state.tear_amount = self.state.tear_amount.max(0.6 * m);
        self.state.moire_amount = self.state.moire_amount.max(0.4 * m);
    }

    /// One burst hit in the given style.
    pub fn slam<R: Rng + ?Sized>(&mut self, style: GlitchStyle, rng: &mut R) {
        let m = self.intensity.impulse_scale();
        match style {
            GlitchStyle::Shiver => {
                self.state.pan_x = rng.gen_range(-0.06..0.06) * m;
                self.state.shake_x = rng.gen_range(-0.03..0.03) * m;
                self.state.moire_amount = 0.5 * m;
            }
            GlitchStyle::Jump => {
                self.state.pan_y = rng.gen_range(-0.05..0.05) * m;
                self.state.tilt_x = rng.gen_range(-0.25..0.25) * m;
                self.state.shake_y = rng.gen_range(-0.02..0.02) * m;
            }
            GlitchStyle::Smash => {
                self.state.zoom = if self.smash_in { 1.0 + 0.35 * m } else { 1.0 - 0.15 * m };
                self.smash_in = !self.smash_in;
                self.state.ghost_amount = 0.6;
            }
            GlitchStyle::Slice => {
                self.state.tear_amount = 1.0;
                self.state.shake_x = rng.gen_range(-0.01..0.01) * m;
            }
        }
    }

    /// Relax every field toward neutral and decay glitch FX.
    pub fn step(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        let fast = self.intensity.fast_decay();
        let s = &mut self.state;

        s.zoom = relax(s.zoom, 1.0, fast, dt);
        s.shake_x = relax(s.shake_x, 0.0, fast, dt);
        s.shake_y = relax(s.shake_y, 0.0, fast, dt);
        s.pan_x = relax(s.pan_x, 0.0, fast, dt);
        s.pan_y = relax(s.pan_y, 0.0, fast, dt);
        s.rotation = relax(s.rotation, 0.0, fast, dt);
        s.tilt_x = relax(s.tilt_x, 0.0, fast, dt);
        s.tilt_y = relax(s.tilt_y, 0.0, fast, dt);
        s.dolly_zoom = relax(s.dolly_zoom, 0.0, fast, dt);
        s.sway = relax(s.sway, 0.0, SLOW_DECAY, dt);

        let ticks = dt * REFERENCE_HZ;
        s.tear_amount *= TEAR_FALLOFF.powf(ticks);
        s.ghost_amount *= GHOST_FALLOFF.powf(ticks);
        s.moire_amount *= MOIRE_FALLOFF.powf(ticks);
    }
}
