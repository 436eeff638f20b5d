use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::choreo::camera::Intensity;
use crate::choreo::pattern::Pattern;
use crate::choreo::stutter::StutterStyle;
use crate::render::stitch::{StitchOverrides, StitchPreset};
use crate::render::RenderMode;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub choreography: ChoreographyConfig,
    #[serde(default)]
    pub stitch: StitchConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default)]
    pub mode: RenderMode,
    pub hud_font: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
}

#[derive(Debug, Deserialize)]
pub struct ChoreographyConfig {
    #[serde(default = "default_density")]
    pub density: u8,
    #[serde(default)]
    pub style: StutterStyle,
    #[serde(default)]
    pub intensity: Intensity,
    pub pattern: Option<Pattern>,
    pub seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StitchConfig {
    #[serde(default)]
    pub preset: StitchPreset,
    #[serde(flatten)]
    pub overrides: StitchOverrides,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            mode: RenderMode::default(),
            hud_font: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            smoothing: default_smoothing(),
        }
    }
}

impl Default for ChoreographyConfig {
    fn default() -> Self {
        Self {
            density: default_density(),
            style: StutterStyle::default(),
            intensity: Intensity::default(),
            pattern: None,
            seed: None,
        }
    }
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_fps() -> u32 { 30 }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }
fn default_smoothing() -> f32 { 0.8 }
fn default_density() -> u8 { 50 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// `--config`, then `./beatpose.toml`, then the per-user config locations.
pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("beatpose.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("beatpose").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("beatpose").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.output.width, 1280);
        assert_eq!(cfg.output.mode, RenderMode::Composite);
        assert_eq!(cfg.choreography.density, 50);
        assert_eq!(cfg.stitch.preset, StitchPreset::Standard);
        assert!(cfg.stitch.overrides.warp.is_none());
    }

    #[test]
    fn parses_every_section() {
        let cfg: Config = toml::from_str(
            r#"
            [output]
            width = 1920
            fps = 60
            mode = "interpolate"

            [audio]
            smoothing = 0.6

            [choreography]
            density = 80
            style = "smash"
            intensity = "high"
            pattern = "SNARE_ROLL"
            seed = 99

            [stitch]
            preset = "dramatic"
            warp = 0.1
            parallax = false
            "#,
        )
        .unwrap();
        assert_eq!((cfg.output.width, cfg.output.height, cfg.output.fps), (1920, 720, 60));
        assert_eq!(cfg.output.mode, RenderMode::Interpolate);
        assert_eq!(cfg.audio.smoothing, 0.6);
        assert_eq!(cfg.choreography.style, StutterStyle::Smash);
        assert_eq!(cfg.choreography.intensity, Intensity::High);
        assert_eq!(cfg.choreography.pattern, Some(Pattern::SnareRoll));
        assert_eq!(cfg.choreography.seed, Some(99));

        let settings = cfg.stitch.preset.settings().with_overrides(&cfg.stitch.overrides);
        assert_eq!(settings.warp, 0.1);
        assert!(!settings.parallax);
        assert_eq!(settings.shear, StitchPreset::Dramatic.settings().shear);
    }

    #[test]
    fn unknown_style_is_rejected() {
        assert!(toml::from_str::<Config>("[choreography]\nstyle = \"wobble\"").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Path::new("/no/such/beatpose.toml")).is_err());
    }

    #[test]
    fn explicit_path_wins() {
        let path = Path::new("custom.toml");
        assert_eq!(discover(Some(path)), Some(path.to_path_buf()));
    }
}
