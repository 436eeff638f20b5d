mod assets;
mod audio;
mod choreo;
mod cli;
mod config;
mod encode;
mod error;
mod render;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use assets::library::{PoseLibrary, PrepareOptions};
use assets::manifest::PoseManifest;
use audio::bands::{BandSource, SyntheticClock};
use audio::spectrum::{self, SpectrogramSource};
use choreo::engine::EngineConfig;
use choreo::pattern::Pattern;
use cli::Cli;
use encode::ffmpeg::{EncoderOptions, FfmpegEncoder};
use error::ExportError;
use render::compositor::Compositor;
use render::hud::{Hud, WithHud};
use render::interpolator::GpuInterpolator;
use render::stitch::{StitchOverrides, StitchSettings};
use render::{RenderMode, Renderer};
use session::export::{ExportJob, ExportSettings};
use session::live::{LiveOptions, LiveSession};

/// Clip length when there is neither audio nor `--duration`.
const DEFAULT_DURATION: f64 = 30.0;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();
    let mut pattern = Pattern::Abab;
    let mut overrides = StitchOverrides::default();

    if let Some(path) = config::discover(cli.config.as_deref()) {
        match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                // Merge: config values apply only when CLI is at its default
                if cli.width == 1280 { cli.width = cfg.output.width; }
                if cli.height == 720 { cli.height = cfg.output.height; }
                if cli.fps == 30 { cli.fps = cfg.output.fps; }
                if cli.crf == 18 { cli.crf = cfg.output.crf; }
                if cli.codec == "libx264" { cli.codec = cfg.output.codec; }
                if cli.mode == RenderMode::Composite { cli.mode = cfg.output.mode; }
                if cli.hud_font.is_none() { cli.hud_font = cfg.output.hud_font; }
                if cli.smoothing == 0.8 { cli.smoothing = cfg.audio.smoothing; }
                if cli.density == 50 { cli.density = cfg.choreography.density; }
                if cli.style == Default::default() { cli.style = cfg.choreography.style; }
                if cli.intensity == Default::default() { cli.intensity = cfg.choreography.intensity; }
                if cli.preset == Default::default() { cli.preset = cfg.stitch.preset; }
                if cli.seed.is_none() { cli.seed = cfg.choreography.seed; }
                if let Some(p) = cfg.choreography.pattern { pattern = p; }
                overrides = cfg.stitch.overrides;
            }
            Err(e) => log::warn!("Failed to load config: {:#}", e),
        }
    }

    cli.validate()?;

    log::info!("beatpose - audio-driven pose choreography");
    log::info!("Poses: {}", cli.poses.display());
    log::info!("Resolution: {}x{} @ {}fps, mode {:?}", cli.width, cli.height, cli.fps, cli.mode);

    // 1. Pose assets
    let manifest = PoseManifest::load(&cli.poses)?;
    let prepare = PrepareOptions {
        matte_grow: cli.matte_grow,
        matte_shrink: cli.matte_shrink,
        ..PrepareOptions::default()
    };
    let library = Arc::new(PoseLibrary::load(&manifest, &prepare));
    if library.is_empty() {
        log::warn!("No pose images could be loaded; only camera motion will be rendered");
    }

    // 2. Audio, falling back to the synthetic clock
    let (mut source, audio_length, audio_path) = open_audio(&cli);
    let duration = cli.duration.or(audio_length).unwrap_or(DEFAULT_DURATION);

    let engine_config = EngineConfig {
        density: cli.density,
        style: cli.style,
        intensity: cli.intensity,
        pattern,
        ..EngineConfig::default()
    };

    // 3. Renderer
    let settings = cli.preset.settings().with_overrides(&overrides);
    let mut renderer = build_renderer(&cli, Arc::clone(&library), settings)?;

    // 4. Run
    if cli.preview {
        let options = LiveOptions {
            fps: cli.fps,
            duration: cli.duration.or(audio_length),
            snapshot_dir: cli.snapshots.clone(),
            snapshot_every: cli.fps as u64,
            seed: cli.seed,
        };
        let mut live = LiveSession::new(engine_config, library.pool(), options);
        stop_on_interrupt(live.abort_handle());
        live.run(source.as_mut(), renderer.as_mut())?;
        return Ok(());
    }

    let seed = cli.seed.unwrap_or_else(rand::random);
    let job = ExportJob::new(
        engine_config,
        library.pool(),
        ExportSettings { fps: cli.fps, duration, seed },
    );

    log::info!("Output: {}", cli.output.display());
    log::info!("Starting FFmpeg encoder...");
    let mut encoder = FfmpegEncoder::new(
        &cli.output,
        audio_path,
        &EncoderOptions {
            width: cli.width,
            height: cli.height,
            fps: cli.fps,
            codec: cli.codec.clone(),
            pix_fmt: cli.pix_fmt.clone(),
            crf: cli.crf,
            bitrate: cli.bitrate.clone(),
        },
    )?;

    stop_on_interrupt(job.abort_handle());

    let pb = ProgressBar::new(job.frame_count());
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    let result = job.run(source.as_mut(), renderer.as_mut(), &mut encoder, |n| pb.set_position(n));
    match result {
        Ok(frames) => {
            pb.finish_with_message("done");
            log::info!("Wrote {} frames to {} (seed {})", frames, cli.output.display(), seed);
            Ok(())
        }
        Err(ExportError::Aborted { frames }) => {
            pb.abandon();
            log::warn!("Interrupted: kept {} frames in {} (seed {})", frames, cli.output.display(), seed);
            Ok(())
        }
        Err(e) => {
            pb.abandon();
            Err(e.into())
        }
    }
}

/// Ctrl-C raises `flag` so the running loop stops after its current frame
/// and finalises what it has.
fn stop_on_interrupt(flag: Arc<AtomicBool>) {
    let handler = ctrlc::set_handler(move || {
        log::warn!("Interrupt received, stopping after the current frame");
        flag.store(true, Ordering::Relaxed);
    });
    if let Err(e) = handler {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }
}

/// Decode and analyse the input track. Any failure degrades to the
/// synthetic clock so the dance still runs.
fn open_audio(cli: &Cli) -> (Box<dyn BandSource>, Option<f64>, Option<&Path>) {
    let Some(path) = cli.input.as_deref() else {
        log::info!("No audio input; driving from a synthetic 120 BPM clock");
        return (Box::new(SyntheticClock::default()), None, None);
    };

    log::info!("Decoding audio: {}", path.display());
    match audio::decode::decode_file(path) {
        Ok(clip) => {
            log::info!("Analyzing audio...");
            let source = SpectrogramSource::new(spectrum::analyze(&clip, cli.fps, cli.smoothing));
            let length = source.duration();
            log::info!("Audio duration: {:.1}s", length);
            (Box::new(source), Some(length), Some(path))
        }
        Err(e) => {
            log::warn!("Audio unavailable ({:#}); using a synthetic 120 BPM clock", e);
            (Box::new(SyntheticClock::default()), None, None)
        }
    }
}

fn build_renderer(cli: &Cli, library: Arc<PoseLibrary>, settings: StitchSettings) -> Result<Box<dyn Renderer>> {
    let base: Box<dyn Renderer> = match cli.mode {
        RenderMode::Composite => Box::new(Compositor::new(library, cli.width, cli.height)),
        RenderMode::Interpolate => {
            log::info!("Initializing GPU...");
            Box::new(
                GpuInterpolator::new(library, cli.width, cli.height, settings, cli.intensity)
                    .context("Interpolate mode needs a GPU; use --mode composite instead")?,
            )
        }
    };

    match &cli.hud_font {
        Some(font) => {
            let shorter = cli.width.min(cli.height) as f32;
            let hud = Hud::from_file(font, (shorter * 0.03).max(14.0))?;
            Ok(Box::new(WithHud::new(base, hud)))
        }
        None => Ok(base),
    }
}
