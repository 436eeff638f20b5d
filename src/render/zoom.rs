use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use wgpu;

use super::frame::TEXTURE_FORMAT;
use super::gpu::GpuContext;

/// Zoom above which the crop is sharpened.
pub const SHARPEN_ZOOM: f32 = 1.25;
const MAX_SHARPEN: f32 = 0.6;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ZoomUniforms {
    pub resolution: [f32; 2],
    pub zoom: f32,
    pub sharpen: f32,
}

impl ZoomUniforms {
    /// Push-in only; pull-out is handled by the stitch pass.
    pub fn new(resolution: (u32, u32), zoom: f32) -> Self {
        let zoom = zoom.max(1.0);
        Self {
            resolution: [resolution.0 as f32, resolution.1 as f32],
            zoom,
            sharpen: sharpen_amount(zoom),
        }
    }
}

/// Unsharp-mask strength for a zoom factor: zero up to `SHARPEN_ZOOM`, then
/// ramping to `MAX_SHARPEN`.
pub fn sharpen_amount(zoom: f32) -> f32 {
    if zoom <= SHARPEN_ZOOM {
        return 0.0;
    }
    ((zoom - SHARPEN_ZOOM) * 0.8).min(MAX_SHARPEN)
}

/// Crop/zoom pass with an unsharp mask for magnified crops. Reads the
/// stitched frame and writes its own output texture.
pub struct ZoomPass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    output: wgpu::Texture,
    output_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl ZoomPass {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Result<Self> {
        let device = &gpu.device;
        let output = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("zoom_output"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let output_view = output.create_view(&Default::default());

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("zoom_shader"),
            source: wgpu::ShaderSource::Wgsl(ZOOM_SHADER.into()),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("zoom_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("zoom_bind_group_layout"),
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
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("zoom_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("zoom_render_pipeline"),
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

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("zoom_uniform_buffer"),
            size: std::mem::size_of::<ZoomUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            output,
            output_view,
            width,
            height,
        })
    }

    /// Run the pass over `input` and return the texture holding the result.
    pub fn run(&self, gpu: &GpuContext, input: &wgpu::TextureView, zoom: f32) -> &wgpu::Texture {
        let uniforms = ZoomUniforms::new((self.width, self.height), zoom);
        gpu.queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("zoom_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("zoom_encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("zoom_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.output_view,
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
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));

        &self.output
    }
}

const ZOOM_SHADER: &str = r#"
struct ZoomUniforms {
    resolution: vec2<f32>,
    zoom: f32,
    sharpen: f32,
};

@group(0) @binding(0) var<uniform> z: ZoomUniforms;
@group(0) @binding(1) var input_tex: texture_2d<f32>;
@group(0) @binding(2) var input_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var out: VertexOutput;
    let x = f32(i32(vertex_index) / 2) * 4.0 - 1.0;
    let y = f32(i32(vertex_index) % 2) * 4.0 - 1.0;
    out.position = vec4<f32>(x, y, 0.0, 1.0);
    out.uv = vec2<f32>((x + 1.0) * 0.5, (1.0 - y) * 0.5);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let uv = vec2<f32>(0.5) + (in.uv - vec2<f32>(0.5)) / z.zoom;
    let color = textureSample(input_tex, input_sampler, uv).rgb;
    if z.sharpen <= 0.0 {
        return vec4<f32>(color, 1.0);
    }

    // Unsharp mask against a 4-tap blur one source texel wide.
    let texel = 1.0 / (z.resolution * z.zoom);
    let blur = (
        textureSample(input_tex, input_sampler, uv + vec2<f32>(texel.x, 0.0)).rgb +
        textureSample(input_tex, input_sampler, uv - vec2<f32>(texel.x, 0.0)).rgb +
        textureSample(input_tex, input_sampler, uv + vec2<f32>(0.0, texel.y)).rgb +
        textureSample(input_tex, input_sampler, uv - vec2<f32>(0.0, texel.y)).rgb
    ) * 0.25;
    let sharp = color + (color - blur) * z.sharpen;
    return vec4<f32>(clamp(sharp, vec3<f32>(0.0), vec3<f32>(1.0)), 1.0);
}
"#;
