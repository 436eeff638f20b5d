use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::bands::BandSource;
use crate::choreo::engine::{ChoreoEngine, EngineConfig};
use crate::choreo::pool::FramePool;
use crate::render::{FrameInput, Renderer};

#[derive(Clone, Debug)]
pub struct LiveOptions {
    pub fps: u32,
    /// Stop after this many seconds; `None` runs until aborted.
    pub duration: Option<f64>,
    /// Write every `snapshot_every`-th frame here as PNG.
    pub snapshot_dir: Option<PathBuf>,
    pub snapshot_every: u64,
    pub seed: Option<u64>,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            fps: 30,
            duration: None,
            snapshot_dir: None,
            snapshot_every: 30,
            seed: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LiveSummary {
    pub frames: u64,
    pub dropped: u64,
    pub bars: u64,
    pub kicks: u64,
    pub elapsed: f64,
}

/// Real-time preview on the wall clock.
pub struct LiveSession {
    engine: ChoreoEngine<StdRng>,
    options: LiveOptions,
    abort: Arc<AtomicBool>,
}

impl LiveSession {
    pub fn new(config: EngineConfig, pool: Arc<FramePool>, options: LiveOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            engine: ChoreoEngine::new(config, pool, rng),
            options,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn run(&mut self, source: &mut dyn BandSource, renderer: &mut dyn Renderer) -> Result<LiveSummary> {
        if let Some(dir) = &self.options.snapshot_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create snapshot directory: {}", dir.display()))?;
        }

        let interval = Duration::from_secs_f64(1.0 / self.options.fps.max(1) as f64);
        let start = Instant::now();
        let mut summary = LiveSummary::default();
        let mut last_bar = None;
        let mut last_time = 0.0;

        log::info!("Live preview at {}fps", self.options.fps);

        while !self.abort.load(Ordering::Relaxed) {
            let now = start.elapsed().as_secs_f64();
            if self.options.duration.is_some_and(|d| now >= d) {
                break;
            }

            let bands = source.sample(now);
            let tick = self.engine.tick(now, &bands);
            if tick.onsets.kick.is_some() {
                summary.kicks += 1;
            }
            if last_bar != Some(tick.status.bar) {
                last_bar = Some(tick.status.bar);
                summary.bars += 1;
                let s = &tick.status;
                log::info!(
                    "bar {:>4} | {:<10} | {:<16} | conf {:.2} | pose {}",
                    s.bar,
                    s.pattern,
                    s.intention,
                    s.confidence,
                    s.active_pose.as_ref().map_or("-", |p| p.as_str())
                );
            }

            let input = FrameInput {
                tick: &tick,
                bands: &bands,
                dt: (now - last_time) as f32,
                frame_index: summary.frames,
            };
            last_time = now;

            match renderer.render(&input) {
                Ok(frame) => self.snapshot(&frame, summary.frames),
                Err(e) => {
                    summary.dropped += 1;
                    log::warn!("Dropped frame {}: {:#}", summary.frames, e);
                }
            }
            summary.frames += 1;

            let deadline = start + interval.mul_f64(summary.frames as f64);
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }

        summary.elapsed = start.elapsed().as_secs_f64();
        log::info!(
            "Live preview stopped after {} frames ({:.1}s, {} dropped, {} kicks)",
            summary.frames,
            summary.elapsed,
            summary.dropped,
            summary.kicks
        );
        Ok(summary)
    }

    fn snapshot(&self, frame: &image::RgbaImage, index: u64) {
        let Some(dir) = &self.options.snapshot_dir else {
            return;
        };
        if index % self.options.snapshot_every.max(1) != 0 {
            return;
        }
        let path = dir.join(format!("frame_{:06}.png", index));
        if let Err(e) = frame.save(&path) {
            log::warn!("Failed to write snapshot {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::bands::SyntheticClock;
    use crate::choreo::pool::PoseId;
    use image::RgbaImage;

    struct Blank {
        fail: bool,
    }

    impl Renderer for Blank {
        fn size(&self) -> (u32, u32) {
            (4, 4)
        }

        fn render(&mut self, _: &FrameInput<'_>) -> Result<RgbaImage> {
            if self.fail {
                anyhow::bail!("no frame");
            }
            Ok(RgbaImage::new(4, 4))
        }
    }

    fn session(options: LiveOptions) -> LiveSession {
        let pool = FramePool::new(vec![PoseId::from("a"), PoseId::from("b")], vec![], vec![], vec![]);
        LiveSession::new(EngineConfig::default(), Arc::new(pool), options)
    }

    #[test]
    fn stops_at_duration() {
        let mut s = session(LiveOptions { fps: 50, duration: Some(0.1), seed: Some(1), ..LiveOptions::default() });
        let summary = s.run(&mut SyntheticClock::default(), &mut Blank { fail: false }).unwrap();
        assert!(summary.frames >= 1 && summary.frames <= 6, "{summary:?}");
        assert!(summary.elapsed >= 0.1);
        assert_eq!(summary.dropped, 0);
        // the synthetic clock opens on a downbeat
        assert!(summary.kicks >= 1, "{summary:?}");
    }

    #[test]
    fn abort_flag_stops_before_the_first_frame() {
        let mut s = session(LiveOptions::default());
        s.abort_handle().store(true, Ordering::Relaxed);
        let summary = s.run(&mut SyntheticClock::default(), &mut Blank { fail: false }).unwrap();
        assert_eq!(summary.frames, 0);
    }

    #[test]
    fn render_errors_do_not_halt_the_loop() {
        let mut s = session(LiveOptions { fps: 100, duration: Some(0.05), ..LiveOptions::default() });
        let summary = s.run(&mut SyntheticClock::default(), &mut Blank { fail: true }).unwrap();
        assert!(summary.frames >= 1);
        assert_eq!(summary.dropped, summary.frames);
    }

    #[test]
    fn writes_png_snapshots() {
        let dir = std::env::temp_dir().join(format!("beatpose-live-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut s = session(LiveOptions {
            fps: 40,
            duration: Some(0.1),
            snapshot_dir: Some(dir.clone()),
            snapshot_every: 1,
            seed: Some(2),
        });
        let summary = s.run(&mut SyntheticClock::default(), &mut Blank { fail: false }).unwrap();
        let written = std::fs::read_dir(&dir).unwrap().count() as u64;
        assert_eq!(written, summary.frames);
        assert!(dir.join("frame_000000.png").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
