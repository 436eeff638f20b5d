use anyhow::Result;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::Arc;

use super::animator::PhaseAnimator;
use super::frame::RenderTarget;
use super::gpu::GpuContext;
use super::stitch::{StitchParams, StitchPipeline, StitchSettings};
use super::zoom::ZoomPass;
use super::{FrameInput, Renderer};
use crate::assets::library::PoseLibrary;
use crate::choreo::camera::Intensity;
use crate::choreo::pool::PoseId;

/// GPU renderer: stitches neighbouring poses on the ring, then crops and
/// sharpens for push-in zoom.
pub struct GpuInterpolator {
    gpu: GpuContext,
    target: RenderTarget,
    stitch: StitchPipeline,
    zoom: ZoomPass,
    animator: PhaseAnimator,
    settings: StitchSettings,
    library: Arc<PoseLibrary>,
    ring_index: HashMap<PoseId, usize>,
}

impl GpuInterpolator {
    /// Fails when no GPU is available; callers should not fall back silently.
    pub fn new(
        library: Arc<PoseLibrary>,
        width: u32,
        height: u32,
        settings: StitchSettings,
        intensity: Intensity,
    ) -> Result<Self> {
        let ring = library.ordered();
        let extent = ring
            .iter()
            .map(|a| {
                let (w, h) = a.dimensions();
                w.max(h)
            })
            .fold(width.max(height), u32::max);
        let gpu = GpuContext::new(extent)?;
        if ring.is_empty() {
            log::warn!("No pose images loaded; interpolated frames will be empty");
        }
        let ring_index = ring.iter().enumerate().map(|(i, a)| (a.id.clone(), i)).collect();
        let stitch = StitchPipeline::new(&gpu, &ring)?;
        let zoom = ZoomPass::new(&gpu, width, height)?;
        let target = RenderTarget::new(&gpu, width, height);
        let animator = PhaseAnimator::new(ring.len(), intensity);
        log::info!("Stitch ring of {} poses ready on {}", ring.len(), gpu.adapter_name);
        drop(ring);

        Ok(Self {
            gpu,
            target,
            stitch,
            zoom,
            animator,
            settings,
            library,
            ring_index,
        })
    }

    fn ring_slot(&self, pose: Option<&PoseId>) -> Option<usize> {
        let asset = self.library.get(pose?)?;
        self.ring_index.get(&asset.id).copied()
    }
}

impl Renderer for GpuInterpolator {
    fn size(&self) -> (u32, u32) {
        (self.target.width, self.target.height)
    }

    fn render(&mut self, input: &FrameInput<'_>) -> Result<RgbaImage> {
        let slot = self.ring_slot(input.tick.status.active_pose.as_ref());
        self.animator.drive(input.tick, slot);
        self.animator.step(input.dt);
        let view = self.animator.view();

        let drawn = match self.animator.current() {
            Some(phase) => {
                let params = StitchParams::build(
                    &self.settings,
                    &phase,
                    &view,
                    input.bands,
                    self.size(),
                    input.frame_index,
                );
                self.stitch.draw(&self.gpu, &self.target.view, &params, &phase)
            }
            None => false,
        };
        if !drawn {
            self.target.clear(&self.gpu);
        }

        let output = self.zoom.run(&self.gpu, &self.target.view, view.zoom);
        self.target.read(&self.gpu, output)
    }
}
