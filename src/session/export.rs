use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::bands::BandSource;
use crate::choreo::engine::{ChoreoEngine, EngineConfig};
use crate::choreo::pool::FramePool;
use crate::encode::FrameSink;
use crate::error::ExportError;
use crate::render::{FrameInput, Renderer};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExportSettings {
    pub fps: u32,
    /// Seconds of output.
    pub duration: f64,
    pub seed: u64,
}

/// Offline render of a fixed-length clip.
///
/// Each run owns a fresh engine stepped on a virtual clock (`i / fps`) with
/// its own seeded RNG, so two runs with the same settings and audio produce
/// the same choreography. Nothing here is shared with a live session beyond
/// the read-only config and pose pool.
pub struct ExportJob {
    config: EngineConfig,
    pool: Arc<FramePool>,
    settings: ExportSettings,
    abort: Arc<AtomicBool>,
}

impl ExportJob {
    pub fn new(config: EngineConfig, pool: Arc<FramePool>, settings: ExportSettings) -> Self {
        Self {
            config,
            pool,
            settings,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the returned flag stops the job before its next frame.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn frame_count(&self) -> u64 {
        let frames = self.settings.duration * self.settings.fps as f64;
        if frames.is_finite() && frames > 0.0 {
            frames.ceil() as u64
        } else {
            0
        }
    }

    /// Render every frame into `sink`, calling `progress` with the running
    /// count. Returns the number of frames written.
    ///
    /// On abort the frames already written are finalised. On any failure
    /// the sink is discarded.
    pub fn run(
        &self,
        source: &mut dyn BandSource,
        renderer: &mut dyn Renderer,
        sink: &mut dyn FrameSink,
        mut progress: impl FnMut(u64),
    ) -> Result<u64, ExportError> {
        let total = self.frame_count();
        let fps = self.settings.fps.max(1) as f64;
        let rng = StdRng::seed_from_u64(self.settings.seed);
        let mut engine = ChoreoEngine::new(self.config, Arc::clone(&self.pool), rng);
        let milestone = (total / 4).max(1);

        log::info!(
            "Exporting {} frames ({:.1}s @ {}fps, seed {})",
            total,
            self.settings.duration,
            self.settings.fps,
            self.settings.seed
        );

        let mut written = 0u64;
        for index in 0..total {
            if self.abort.load(Ordering::Relaxed) {
                log::warn!("Export aborted after {} frames", written);
                return match sink.finish() {
                    Ok(()) => Err(ExportError::Aborted { frames: written }),
                    Err(e) => Err(fail(sink, e, written)),
                };
            }

            let time = index as f64 / fps;
            let bands = source.sample(time);
            let tick = engine.tick(time, &bands);
            let input = FrameInput {
                tick: &tick,
                bands: &bands,
                dt: if index == 0 { 0.0 } else { (1.0 / fps) as f32 },
                frame_index: index,
            };

            let written_ok = renderer
                .render(&input)
                .and_then(|frame| sink.write_frame(frame.as_raw()));
            if let Err(e) = written_ok {
                return Err(fail(sink, e, written));
            }

            written += 1;
            progress(written);
            if written % milestone == 0 && written < total {
                log::info!("Exported {}/{} frames", written, total);
            }
        }

        sink.finish().map_err(|e| fail(sink, e, written))?;
        log::info!("Export complete: {} frames", written);
        Ok(written)
    }
}

fn fail(sink: &mut dyn FrameSink, error: anyhow::Error, frames: u64) -> ExportError {
    log::error!("Export failed after {} frames: {:#}", frames, error);
    sink.discard();
    ExportError::Failed {
        message: format!("{:#}", error),
        frames,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::library::{PoseAsset, PoseLibrary, PrepareOptions};
    use crate::audio::bands::SyntheticClock;
    use crate::choreo::pool::PoseId;
    use crate::encode::CollectSink;
    use crate::render::compositor::Compositor;
    use anyhow::Result;
    use image::{Rgba, RgbaImage};

    fn pool() -> Arc<FramePool> {
        let ids = |names: &[&str]| names.iter().map(|n| PoseId::from(*n)).collect::<Vec<_>>();
        Arc::new(FramePool::new(ids(&["p1", "p2"]), ids(&["p3"]), ids(&["p4"]), vec![]))
    }

    fn job(duration: f64, seed: u64) -> ExportJob {
        let settings = ExportSettings { fps: 20, duration, seed };
        ExportJob::new(EngineConfig::default(), pool(), settings)
    }

    #[derive(Default)]
    struct Recorder {
        poses: Vec<Option<PoseId>>,
        fail_at: Option<u64>,
    }

    impl Renderer for Recorder {
        fn size(&self) -> (u32, u32) {
            (2, 2)
        }

        fn render(&mut self, input: &FrameInput<'_>) -> Result<RgbaImage> {
            if self.fail_at == Some(input.frame_index) {
                anyhow::bail!("device lost");
            }
            self.poses.push(input.tick.status.active_pose.clone());
            Ok(RgbaImage::new(2, 2))
        }
    }

    struct BrokenSink;

    impl FrameSink for BrokenSink {
        fn write_frame(&mut self, _: &[u8]) -> Result<()> {
            Ok(())
        }
        fn finish(&mut self) -> Result<()> {
            anyhow::bail!("encoder exited")
        }
        fn discard(&mut self) {}
    }

    #[test]
    fn frame_count_rounds_up() {
        assert_eq!(job(1.0, 0).frame_count(), 20);
        assert_eq!(job(0.26, 0).frame_count(), 6);
        assert_eq!(job(0.0, 0).frame_count(), 0);
        assert_eq!(job(-1.0, 0).frame_count(), 0);
    }

    #[test]
    fn writes_every_frame_and_finishes() {
        let mut sink = CollectSink::default();
        let mut seen = Vec::new();
        let frames = job(1.0, 7)
            .run(&mut SyntheticClock::default(), &mut Recorder::default(), &mut sink, |n| seen.push(n))
            .unwrap();
        assert_eq!(frames, 20);
        assert_eq!(sink.frames.len(), 20);
        assert!(sink.finished);
        assert_eq!(seen.last(), Some(&20));
    }

    #[test]
    fn same_seed_same_choreography() {
        let run = |seed| {
            let mut rec = Recorder::default();
            job(4.0, seed)
                .run(&mut SyntheticClock::new(128.0), &mut rec, &mut CollectSink::default(), |_| {})
                .unwrap();
            rec.poses
        };
        let a = run(42);
        assert_eq!(a, run(42));
        assert!(a.iter().all(Option::is_some));
    }

    #[test]
    fn abort_before_start_finalises_an_empty_clip() {
        let job = job(1.0, 0);
        job.abort_handle().store(true, Ordering::Relaxed);
        let mut sink = CollectSink::default();
        let result = job.run(&mut SyntheticClock::default(), &mut Recorder::default(), &mut sink, |_| {});
        assert_eq!(result, Err(ExportError::Aborted { frames: 0 }));
        assert!(sink.finished);
        assert!(!sink.discarded);
    }

    #[test]
    fn abort_mid_run_keeps_written_frames() {
        let job = job(1.0, 0);
        let abort = job.abort_handle();
        let mut sink = CollectSink::default();
        let result = job.run(&mut SyntheticClock::default(), &mut Recorder::default(), &mut sink, |n| {
            if n == 3 {
                abort.store(true, Ordering::Relaxed);
            }
        });
        assert_eq!(result, Err(ExportError::Aborted { frames: 3 }));
        assert_eq!(sink.frames.len(), 3);
        assert!(sink.finished);
    }

    struct Slow;

    impl Renderer for Slow {
        fn size(&self) -> (u32, u32) {
            (1, 1)
        }

        fn render(&mut self, _: &FrameInput<'_>) -> Result<RgbaImage> {
            std::thread::sleep(std::time::Duration::from_millis(1));
            Ok(RgbaImage::new(1, 1))
        }
    }

    #[test]
    fn abort_from_another_thread_finalises_the_clip() {
        let job = job(100.0, 0);
        let abort = job.abort_handle();
        let trip = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(30));
            abort.store(true, Ordering::Relaxed);
        });
        let mut sink = CollectSink::default();
        let result = job.run(&mut SyntheticClock::default(), &mut Slow, &mut sink, |_| {});
        trip.join().unwrap();
        match result {
            Err(ExportError::Aborted { frames }) => {
                assert!(frames < job.frame_count());
                assert_eq!(sink.frames.len() as u64, frames);
            }
            other => panic!("expected abort, got {other:?}"),
        }
        assert!(sink.finished && !sink.discarded);
    }

    #[test]
    fn render_failure_discards_the_sink() {
        let mut sink = CollectSink::default();
        let mut rec = Recorder { fail_at: Some(5), ..Recorder::default() };
        let result = job(1.0, 0).run(&mut SyntheticClock::default(), &mut rec, &mut sink, |_| {});
        match result {
            Err(ExportError::Failed { message, frames }) => {
                assert_eq!(frames, 5);
                assert!(message.contains("device lost"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(sink.discarded);
        assert!(!sink.finished);
    }

    #[test]
    fn finish_failure_is_not_success() {
        let result = job(0.5, 0).run(&mut SyntheticClock::default(), &mut Recorder::default(), &mut BrokenSink, |_| {});
        assert!(matches!(result, Err(ExportError::Failed { frames: 10, .. })));
    }

    #[test]
    fn compositor_frames_have_the_output_size() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([200, 40, 40, 255]));
        let opts = PrepareOptions { softness: 0.0, ..PrepareOptions::default() };
        let assets = ["p1", "p2", "p3", "p4"]
            .iter()
            .map(|id| PoseAsset::prepare(PoseId::from(*id), img.clone(), &opts))
            .collect();
        let pool_value = FramePool::clone(&pool());
        let library = PoseLibrary::from_assets(assets, Some(PoseId::from("p1")), pool_value);
        let mut compositor = Compositor::new(Arc::new(library), 16, 8);

        let mut sink = CollectSink::default();
        job(0.5, 3)
            .run(&mut SyntheticClock::default(), &mut compositor, &mut sink, |_| {})
            .unwrap();
        assert_eq!(sink.frames.len(), 10);
        assert!(sink.frames.iter().all(|f| f.len() == 16 * 8 * 4));
    }
}
