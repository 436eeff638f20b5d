use clap::Parser;
use std::path::PathBuf;

use crate::choreo::camera::Intensity;
use crate::choreo::stutter::StutterStyle;
use crate::error::ConfigError;
use crate::render::stitch::StitchPreset;
use crate::render::RenderMode;

#[derive(Parser, Debug)]
#[command(name = "beatpose", about = "Audio-driven dance choreography video generator")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG). Without one a synthetic 120 BPM clock drives the dance.
    pub input: Option<PathBuf>,

    /// Pose manifest (JSON)
    #[arg(short, long)]
    pub poses: PathBuf,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Render path
    #[arg(long, value_enum, default_value_t = RenderMode::Composite)]
    pub mode: RenderMode,

    /// Run the live preview loop instead of exporting
    #[arg(long)]
    pub preview: bool,

    /// Write preview snapshots (PNG) into this directory
    #[arg(long)]
    pub snapshots: Option<PathBuf>,

    /// Seconds to render. Defaults to the audio length, or 30s without audio.
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Stutter density (0 disables bursts, 100 bursts every 4 beats)
    #[arg(long, default_value_t = 50)]
    pub density: u8,

    /// Glitch style for bursts
    #[arg(long, value_enum, default_value_t = StutterStyle::Auto)]
    pub style: StutterStyle,

    /// Camera impulse strength
    #[arg(long, value_enum, default_value_t = Intensity::Normal)]
    pub intensity: Intensity,

    /// Stitch look for the interpolate mode
    #[arg(long, value_enum, default_value_t = StitchPreset::Standard)]
    pub preset: StitchPreset,

    /// RNG seed for reproducible choreography
    #[arg(long)]
    pub seed: Option<u64>,

    /// Grow each pose matte by this many pixels
    #[arg(long, default_value_t = 0)]
    pub matte_grow: u32,

    /// Shrink each pose matte by this many pixels (applied after growing)
    #[arg(long, default_value_t = 0)]
    pub matte_shrink: u32,

    /// TTF/OTF font for the status HUD; the HUD is off without one
    #[arg(long)]
    pub hud_font: Option<PathBuf>,

    /// Config file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// Smoothing factor for audio analysis (0.0-1.0)
    #[arg(long, default_value_t = 0.8)]
    pub smoothing: f32,
}

impl Cli {
    /// Checks the merged values before anything expensive runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| Err(ConfigError::Invalid { field, reason: reason.to_string() });
        if self.width == 0 || self.height == 0 {
            return invalid("resolution", "width and height must be positive");
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return invalid("resolution", "width and height must be even for yuv420p");
        }
        if self.fps == 0 {
            return invalid("fps", "must be at least 1");
        }
        if self.density > 100 {
            return invalid("density", "must be between 0 and 100");
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return invalid("smoothing", "must be in [0, 1)");
        }
        if self.duration.is_some_and(|d| !d.is_finite() || d <= 0.0) {
            return invalid("duration", "must be a positive number of seconds");
        }
        if self.crf > 51 {
            return invalid("crf", "must be between 0 and 51");
        }
        Ok(())
    }
}
