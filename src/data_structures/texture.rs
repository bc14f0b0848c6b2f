//! GPU textures for the wgpu backend.
//!
//! [`Texture`] wraps a wgpu texture with its view and sampler. Material
//! textures are created from decoded [`RawImage`]s; kinds a mesh does not
//! bind are filled with neutral [`Texture::fallback`] textures so every draw
//! can use the same bind group layout.

use crate::{data_structures::material::TextureKind, resources::RawImage};

/// A GPU texture with a view and optional sampler.
#[derive(Clone, Debug)]
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: Option<wgpu::Sampler>,
}

impl Texture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// * `size` is [width, height] of the texture in pixels
    /// * `label` is used as a debug label for the GPU resource
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let desc = wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[Self::DEPTH_FORMAT],
        };
        let texture = device.create_texture(&desc);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = Some(device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 100.0,
            ..Default::default()
        }));

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Uploads decoded RGBA8 pixels. Base colour data is stored as sRGB,
    /// everything else as linear.
    pub fn from_raw_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &RawImage,
        kind: TextureKind,
        label: &str,
    ) -> anyhow::Result<Self> {
        let expected = image.width as usize * image.height as usize * 4;
        if image.width == 0 || image.height == 0 || image.pixels.len() != expected {
            anyhow::bail!(
                "texture {label}: {} bytes do not describe a {}x{} RGBA image",
                image.pixels.len(),
                image.width,
                image.height
            );
        }
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let format = if kind.is_srgb() {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            &image.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = Some(create_default_sampler(device));

        Ok(Self {
            texture,
            view,
            sampler,
        })
    }

    /// A 1x1 texture holding the value a kind has when no map is bound:
    /// white base colour, a flat normal, and full occlusion with rough
    /// non-metal in the ORM channels.
    pub fn fallback(device: &wgpu::Device, queue: &wgpu::Queue, kind: TextureKind) -> anyhow::Result<Self> {
        let rgba = match kind {
            TextureKind::BaseColor => [255, 255, 255, 255],
            // The blue/purple-ish colour that represents the default for normal maps
            TextureKind::Normal => [127, 127, 255, 255],
            TextureKind::MetalnessRoughness => [255, 255, 0, 255],
        };
        let label = format!("fallback {kind:?}");
        Self::from_raw_image(device, queue, &RawImage::solid(1, 1, rgba), kind, &label)
    }

    pub fn sampler_or_default<'a>(&'a self, default: &'a wgpu::Sampler) -> &'a wgpu::Sampler {
        self.sampler.as_ref().unwrap_or(default)
    }
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

/// Bind group layout of a material: one texture and sampler pair per
/// [`TextureKind`], at bindings `2 * kind.index()` and `2 * kind.index() + 1`.
pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let entries: Vec<_> = TextureKind::ALL
        .into_iter()
        .flat_map(|kind| {
            let binding = 2 * kind.index() as u32;
            [
                wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: binding + 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ]
        })
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &entries,
        label: Some("material texture_bind_group_layout"),
    })
}
