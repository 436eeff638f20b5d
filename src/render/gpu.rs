use anyhow::{Context, Result};
use wgpu;

/// Headless device for the interpolate render mode.
///
/// Everything is offscreen: pose textures in, one RGBA target out, read
/// back every frame. No surface is ever created, so any adapter that can
/// hold the largest texture will do, including a software one.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
}

impl GpuContext {
    /// `extent` is the longest edge any texture will need: the output frame
    /// or the biggest pose image.
    pub fn new(extent: u32) -> Result<Self> {
        pollster::block_on(Self::open(extent))
    }

    async fn open(extent: u32) -> Result<Self> {
        // WGPU_BACKEND=vulkan etc. pins a backend for debugging.
        let backends = wgpu::Backends::from_env().unwrap_or(wgpu::Backends::PRIMARY);
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = match pick_adapter(&instance, false).await {
            Some(adapter) => adapter,
            None => {
                log::warn!("No hardware adapter for interpolation; trying a software rasterizer");
                pick_adapter(&instance, true)
                    .await
                    .context("No GPU adapter available for frame interpolation")?
            }
        };

        let info = adapter.get_info();
        let max_side = adapter.limits().max_texture_dimension_2d;
        log::info!(
            "Interpolating on {} ({:?}, {:?}), textures up to {}px",
            info.name,
            info.backend,
            info.device_type,
            max_side
        );
        check_extent(max_side, extent)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("interpolator"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                    ..Default::default()
                },
                None,
            )
            .await
            .with_context(|| format!("Failed to open a device on {}", info.name))?;

        device.on_uncaptured_error(Box::new(|e| log::error!("GPU error: {}", e)));

        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
        })
    }
}

async fn pick_adapter(instance: &wgpu::Instance, software: bool) -> Option<wgpu::Adapter> {
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: software,
        })
        .await
}

fn check_extent(max_side: u32, extent: u32) -> Result<()> {
    if extent > max_side {
        anyhow::bail!(
            "Adapter textures top out at {}px but {}px is needed; lower the resolution or shrink the pose images",
            max_side,
            extent
        );
    }
    Ok(())
}
