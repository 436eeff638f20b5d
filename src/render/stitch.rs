use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use serde::Deserialize;
use wgpu;
use wgpu::util::DeviceExt;

use super::animator::{AnimatorView, InterpolationResult};
use super::frame::TEXTURE_FORMAT;
use super::gpu::GpuContext;
use super::background_linear;
use crate::assets::library::PoseAsset;
use crate::audio::bands::AudioBands;

const SHADER: &str = include_str!("stitch.wgsl");

/// Named bundles of stitch settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StitchPreset {
    Subtle,
    #[default]
    Standard,
    Dramatic,
}

/// Resolved stitch look; the per-frame uniform is built from this.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StitchSettings {
    pub feather: f32,
    pub warp: f32,
    pub shear: f32,
    pub parallax: bool,
    pub parallax_offset: f32,
    pub grain: f32,
    pub vignette: f32,
    pub dither: f32,
    pub motion_blur: bool,
    pub blur_mix: f32,
    pub shadow: bool,
    pub shadow_intensity: f32,
    pub shadow_offset: [f32; 2],
}

impl StitchPreset {
    pub fn settings(self) -> StitchSettings {
        match self {
            StitchPreset::Subtle => StitchSettings {
                feather: 0.18,
                warp: 0.15,
                shear: 0.05,
                parallax: false,
                parallax_offset: 0.0,
                grain: 0.02,
                vignette: 0.2,
                dither: 1.0,
                motion_blur: false,
                blur_mix: 0.0,
                shadow: true,
                shadow_intensity: 0.25,
                shadow_offset: [0.0, 0.02],
            },
            StitchPreset::Standard => StitchSettings {
                feather: 0.12,
                warp: 0.35,
                shear: 0.12,
                parallax: true,
                parallax_offset: 0.012,
                grain: 0.04,
                vignette: 0.35,
                dither: 1.5,
                motion_blur: true,
                blur_mix: 0.35,
                shadow: true,
                shadow_intensity: 0.4,
                shadow_offset: [0.0, 0.03],
            },
            StitchPreset::Dramatic => StitchSettings {
                feather: 0.06,
                warp: 0.7,
                shear: 0.25,
                parallax: true,
                parallax_offset: 0.03,
                grain: 0.08,
                vignette: 0.55,
                dither: 2.0,
                motion_blur: true,
                blur_mix: 0.55,
                shadow: true,
                shadow_intensity: 0.6,
                shadow_offset: [0.01, 0.04],
            },
        }
    }
}

/// Optional per-field overrides, as read from the `[stitch]` config table.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StitchOverrides {
    pub feather: Option<f32>,
    pub warp: Option<f32>,
    pub shear: Option<f32>,
    pub parallax: Option<bool>,
    pub parallax_offset: Option<f32>,
    pub grain: Option<f32>,
    pub vignette: Option<f32>,
    pub dither: Option<f32>,
    pub motion_blur: Option<bool>,
    pub blur_mix: Option<f32>,
    pub shadow: Option<bool>,
    pub shadow_intensity: Option<f32>,
}

impl StitchSettings {
    pub fn with_overrides(mut self, o: &StitchOverrides) -> Self {
        macro_rules! apply {
            ($($field:ident),*) => { $( if let Some(v) = o.$field { self.$field = v; } )* };
        }
        apply!(feather, warp, shear, parallax, parallax_offset, grain, vignette, dither, motion_blur, blur_mix, shadow, shadow_intensity);
        self
    }
}

/// Uniform block for `stitch.wgsl`. Field order matches the WGSL struct.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct StitchParams {
    pub resolution: [f32; 2],
    pub pan: [f32; 2],
    pub shadow_offset: [f32; 2],
    pub blend: f32,
    pub feather: f32,
    pub warp: f32,
    pub shear: f32,
    pub seam_angle: f32,
    pub parallax: u32,
    pub parallax_offset: f32,
    pub grain: f32,
    pub vignette: f32,
    pub dither: f32,
    pub motion_blur: u32,
    pub blur_mix: f32,
    pub blur_advance: f32,
    pub shadow: u32,
    pub shadow_intensity: f32,
    pub zoom: f32,
    pub rotation: f32,
    pub frame_seed: u32,
    /// Linear-light backdrop; alpha unused.
    pub background: [f32; 4],
}

/// Degrees per second at which shear and blur reach full strength.
const FULL_SPEED: f32 = 360.0;

impl StitchParams {
    /// Fresh uniform for one frame; never patched in place.
    pub fn build(
        settings: &StitchSettings,
        phase: &InterpolationResult,
        view: &AnimatorView,
        bands: &AudioBands,
        resolution: (u32, u32),
        frame_index: u64,
    ) -> Self {
        let speed = (view.angular_velocity.abs() / FULL_SPEED).min(1.0);
        let dir = phase.motion_dir as f32;
        Self {
            resolution: [resolution.0 as f32, resolution.1 as f32],
            pan: view.pan,
            shadow_offset: settings.shadow_offset,
            blend: phase.t,
            feather: settings.feather.max(1e-3),
            warp: settings.warp * (1.0 + bands.bass * 0.5),
            shear: settings.shear * speed * dir,
            seam_angle: phase.seam_angle,
            parallax: settings.parallax as u32,
            parallax_offset: settings.parallax_offset * dir,
            grain: settings.grain * (1.0 + bands.hat),
            vignette: settings.vignette,
            dither: settings.dither,
            motion_blur: (settings.motion_blur && speed > 0.0) as u32,
            blur_mix: settings.blur_mix * speed,
            blur_advance: 0.1 * speed * dir,
            shadow: settings.shadow as u32,
            shadow_intensity: settings.shadow_intensity,
            // push-in is left to the zoom pass
            zoom: view.zoom.clamp(0.05, 1.0),
            rotation: 0.0,
            frame_seed: frame_index as u32,
            background: background_linear(),
        }
    }
}

/// The shared backdrop decoded for a linear-light shader.
struct PoseTextures {
    color: wgpu::TextureView,
    depth: wgpu::TextureView,
}

/// GPU side of the stitcher: one pipeline plus a texture pair per ring pose.
pub struct StitchPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    poses: Vec<PoseTextures>,
}

impl StitchPipeline {
    pub fn new(gpu: &GpuContext, ring: &[&PoseAsset]) -> Result<Self> {
        let device = &gpu.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("stitch_shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stitch_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                texture_entry(2),
                texture_entry(3),
                texture_entry(4),
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("stitch_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("stitch_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TEXTURE_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("stitch_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("stitch_uniforms"),
            size: std::mem::size_of::<StitchParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let poses = ring.iter().map(|asset| upload_pose(gpu, asset)).collect();
        log::info!("Stitch pipeline ready with {} poses", ring.len());

        Ok(Self {
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            poses,
        })
    }

    /// Draw the stitched pair into `target`. Returns false, after logging,
    /// when either pose has no texture; nothing is drawn in that case.
    pub fn draw(
        &self,
        gpu: &GpuContext,
        target: &wgpu::TextureView,
        params: &StitchParams,
        phase: &InterpolationResult,
    ) -> bool {
        let (Some(a), Some(b)) = (self.poses.get(phase.frame_a), self.poses.get(phase.frame_b)) else {
            log::warn!(
                "Missing pose texture for pair ({}, {}), skipping draw",
                phase.frame_a,
                phase.frame_b
            );
            return false;
        };

        gpu.queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(params));

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stitch_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.uniform_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&a.color) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(&a.depth) },
                wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::TextureView(&b.color) },
                wgpu::BindGroupEntry { binding: 4, resource: wgpu::BindingResource::TextureView(&b.depth) },
                wgpu::BindGroupEntry { binding: 5, resource: wgpu::BindingResource::Sampler(&self.sampler) },
            ],
        });

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("stitch_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("stitch_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1); // fullscreen triangle
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        true
    }
}

/// Upload a pose's full mip chain and its SDF.
fn upload_pose(gpu: &GpuContext, asset: &PoseAsset) -> PoseTextures {
    let (w, h) = asset.dimensions();
    let mut mip_data = Vec::new();
    for level in &asset.mips {
        mip_data.extend_from_slice(level.as_raw());
    }
    let color = gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some(asset.id.as_str()),
            size: wgpu::Extent3d { width: w, height: h, depth_or_array_layers: 1 },
            mip_level_count: asset.mips.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &mip_data,
    );

    let depth = gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some("pose_sdf"),
            size: wgpu::Extent3d { width: w, height: h, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        asset.sdf.as_raw(),
    );

    PoseTextures {
        color: color.create_view(&wgpu::TextureViewDescriptor::default()),
        depth: depth.create_view(&wgpu::TextureViewDescriptor::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(t: f32, dir: i8) -> InterpolationResult {
        InterpolationResult { frame_a: 0, frame_b: 1, t, seam_angle: 0.5, motion_dir: dir }
    }

    fn view(velocity: f32) -> AnimatorView {
        AnimatorView { angle: 10.0, zoom: 1.2, pan: [0.1, -0.05], angular_velocity: velocity }
    }

    #[test]
    fn uniform_block_matches_the_shader_layout() {
        assert_eq!(std::mem::size_of::<StitchParams>(), 112);
        assert_eq!(std::mem::offset_of!(StitchParams, background), 96);
        assert_eq!(std::mem::size_of::<StitchParams>() % 16, 0);
    }

    #[test]
    fn backdrop_is_sent_in_linear_light() {
        let s = StitchPreset::Standard.settings();
        let p = StitchParams::build(&s, &phase(0.0, 1), &view(0.0), &AudioBands::default(), (8, 8), 0);
        // sRGB 12 is about 0.0037 linear; 12/255 would encode back to ~61
        assert!((p.background[0] - 0.00368).abs() < 1e-4, "{:?}", p.background);
        assert_eq!(p.background[0], p.background[1]);
        assert!(p.background[2] > p.background[0]);
        assert_eq!(crate::assets::mipmap::linear_to_srgb(p.background[0]), crate::render::BACKGROUND[0]);
    }

    #[test]
    fn shader_blends_in_linear_light_without_regamma() {
        // sampled colours are already linear; the blur mix must not re-apply a curve
        assert!(SHADER.contains("mix(color.rgb, ahead.rgb, p.blur_mix)"));
        assert!(!SHADER.contains("pow(max(c, vec3<f32>(0.0)), vec3<f32>(2.2))"));
        // dither lives in encoded space and uses the gradient-noise pattern
        assert!(SHADER.contains("encoded += vec3<f32>((ign(px, p.frame_seed) - 0.5) * p.dither / 255.0)"));
        assert!(SHADER.contains("background: vec4<f32>"));
    }

    #[test]
    fn params_carry_phase_and_view() {
        let s = StitchPreset::Standard.settings();
        let p = StitchParams::build(&s, &phase(0.3, 1), &view(180.0), &AudioBands::default(), (640, 360), 42);
        assert_eq!(p.blend, 0.3);
        assert_eq!(p.seam_angle, 0.5);
        assert_eq!(p.zoom, 1.0);
        assert_eq!(p.pan, [0.1, -0.05]);
        assert_eq!(p.resolution, [640.0, 360.0]);
        assert_eq!(p.frame_seed, 42);
        assert_eq!(p.parallax, 1);
        assert_eq!(p.motion_blur, 1);
        assert!((p.shear - s.shear * 0.5).abs() < 1e-6);
    }

    #[test]
    fn standing_still_disables_motion_terms() {
        let s = StitchPreset::Dramatic.settings();
        let p = StitchParams::build(&s, &phase(0.0, 1), &view(0.0), &AudioBands::default(), (8, 8), 0);
        assert_eq!(p.motion_blur, 0);
        assert_eq!(p.shear, 0.0);
        assert_eq!(p.blur_mix, 0.0);
    }

    #[test]
    fn backward_motion_flips_shear_and_parallax() {
        let s = StitchPreset::Standard.settings();
        let fwd = StitchParams::build(&s, &phase(0.5, 1), &view(720.0), &AudioBands::default(), (8, 8), 0);
        let back = StitchParams::build(&s, &phase(0.5, -1), &view(-720.0), &AudioBands::default(), (8, 8), 0);
        assert_eq!(fwd.shear, -back.shear);
        assert_eq!(fwd.parallax_offset, -back.parallax_offset);
    }

    #[test]
    fn bass_deepens_the_warp() {
        let s = StitchPreset::Standard.settings();
        let quiet = StitchParams::build(&s, &phase(0.5, 1), &view(0.0), &AudioBands::default(), (8, 8), 0);
        let loud_bands = AudioBands { bass: 1.0, ..AudioBands::default() };
        let loud = StitchParams::build(&s, &phase(0.5, 1), &view(0.0), &loud_bands, (8, 8), 0);
        assert!(loud.warp > quiet.warp);
    }

    #[test]
    fn presets_escalate() {
        let (a, b, c) = (
            StitchPreset::Subtle.settings(),
            StitchPreset::Standard.settings(),
            StitchPreset::Dramatic.settings(),
        );
        assert!(a.warp < b.warp && b.warp < c.warp);
        assert!(a.feather > b.feather && b.feather > c.feather);
        assert!(!a.parallax && c.parallax);
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let o = StitchOverrides { grain: Some(0.0), shadow: Some(false), ..StitchOverrides::default() };
        let base = StitchPreset::Standard.settings();
        let s = base.with_overrides(&o);
        assert_eq!(s.grain, 0.0);
        assert!(!s.shadow);
        assert_eq!(s.warp, base.warp);
    }
}
