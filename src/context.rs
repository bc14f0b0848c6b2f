//! The wgpu device, queue and offscreen targets a scene is rendered with.
//!
//! The context renders into its own colour texture instead of a window
//! surface, so it works on machines without a display.

use anyhow::Context as _;
use log::info;

use crate::{
    camera::{Camera, CameraResources, DEFAULT_ZOOM, Projection},
    data_structures::{light::LightRecord, texture},
    pipelines::light::LightResources,
};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[derive(Debug)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub color_format: wgpu::TextureFormat,
    pub size: [u32; 2],
    pub color_texture: wgpu::Texture,
    pub(crate) depth_texture: texture::Texture,
    pub camera: CameraResources,
    pub light: LightResources,
    pub clear_colour: wgpu::Color,
}

impl Context {
    pub async fn new_headless(size: [u32; 2]) -> anyhow::Result<Self> {
        let size = [size[0].max(1), size[1].max(1)];
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no graphics adapter available")?;
        info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("requesting graphics device")?;

        let color_texture = create_color_texture(&device, size);
        let depth_texture = texture::Texture::create_depth_texture(&device, size, "depth_texture");

        let camera = Camera::default();
        let projection = Projection::new(size[0], size[1], DEFAULT_ZOOM, 0.1, 500.0);
        let camera = CameraResources::new(&device, camera, projection);
        let light = LightResources::new(&device, &[]);

        Ok(Self {
            device,
            queue,
            color_format: COLOR_FORMAT,
            size,
            color_texture,
            depth_texture,
            camera,
            light,
            clear_colour: wgpu::Color::BLACK,
        })
    }

    /// Blocking variant of [`Context::new_headless`].
    pub fn headless(size: [u32; 2]) -> anyhow::Result<Self> {
        futures::executor::block_on(Self::new_headless(size))
    }

    pub fn color_view(&self) -> wgpu::TextureView {
        self.color_texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_texture.view
    }

    pub fn resize(&mut self, size: [u32; 2]) {
        let size = [size[0].max(1), size[1].max(1)];
        if size == self.size {
            return;
        }
        self.size = size;
        self.color_texture = create_color_texture(&self.device, size);
        self.depth_texture = texture::Texture::create_depth_texture(&self.device, size, "depth_texture");
        self.camera.projection.resize(size[0], size[1]);
        self.camera.write(&self.queue);
    }

    pub fn set_lights(&mut self, lights: &[LightRecord]) {
        self.light.update(&self.queue, lights);
    }

    /// Copies the colour target back to the CPU as tightly packed RGBA8 rows.
    pub async fn read_pixels(&self) -> anyhow::Result<Vec<u8>> {
        let [width, height] = self.size;
        let unpadded = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &self.color_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // the receiver only disappears if the caller stopped waiting
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .context("waiting for the readback copy")?;
        rx.await.context("readback was cancelled")??;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        for row in data.chunks(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(data);
        buffer.unmap();
        Ok(pixels)
    }
}

fn create_color_texture(device: &wgpu::Device, size: [u32; 2]) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("color_texture"),
        size: wgpu::Extent3d {
            width: size[0],
            height: size[1],
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}
