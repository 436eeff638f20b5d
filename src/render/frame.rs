use anyhow::{Context, Result};
use image::RgbaImage;
use wgpu;

use super::gpu::GpuContext;
use super::background_linear;

pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Offscreen render target plus the staging buffer used to read frames back.
pub struct RenderTarget {
    /// Backing storage for `view`.
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    output_buffer: wgpu::Buffer,
    pub width: u32,
    pub height: u32,
    padded_bytes_per_row: u32,
    unpadded_bytes_per_row: u32,
}

impl RenderTarget {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let (unpadded_bytes_per_row, padded_bytes_per_row) = row_pitch(width);

        let output_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output_buffer"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            _texture: texture,
            view,
            output_buffer,
            width,
            height,
            padded_bytes_per_row,
            unpadded_bytes_per_row,
        }
    }

    /// Copy `texture` (same size as this target) back to the CPU.
    pub fn read(&self, gpu: &GpuContext, texture: &wgpu::Texture) -> Result<RgbaImage> {
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        gpu.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = self.output_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        receiver.recv().context("GPU readback channel closed")??;

        let data = buffer_slice.get_mapped_range();
        let pixels = strip_padding(&data, self.padded_bytes_per_row, self.unpadded_bytes_per_row, self.height);
        drop(data);
        self.output_buffer.unmap();

        RgbaImage::from_raw(self.width, self.height, pixels).context("Readback size mismatch")
    }

    /// Fill the target with the shared backdrop; used when a draw is skipped.
    pub fn clear(&self, gpu: &GpuContext) {
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("clear_encoder"),
        });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(backdrop()),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}

fn backdrop() -> wgpu::Color {
    let [r, g, b, a] = background_linear().map(f64::from);
    wgpu::Color { r, g, b, a }
}

/// Unpadded and copy-aligned bytes per row for an RGBA8 texture.
fn row_pitch(width: u32) -> (u32, u32) {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (unpadded, unpadded.div_ceil(align) * align)
}

fn strip_padding(data: &[u8], padded: u32, unpadded: u32, rows: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((unpadded * rows) as usize);
    for row in 0..rows {
        let start = (row * padded) as usize;
        let end = start + unpadded as usize;
        pixels.extend_from_slice(&data[start..end]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(row_pitch(64), (256, 256));
        assert_eq!(row_pitch(65), (260, 512));
        assert_eq!(row_pitch(1), (4, 256));
    }

    #[test]
    fn padding_is_stripped_per_row() {
        let mut data = vec![0u8; 16];
        data[0..4].copy_from_slice(&[1, 2, 3, 4]);
        data[8..12].copy_from_slice(&[5, 6, 7, 8]);
        assert_eq!(strip_padding(&data, 8, 4, 2), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
