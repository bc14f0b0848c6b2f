//! Loading of external data: images, scene files and the meshes and textures
//! built from them.
//!
//! - `cache` deduplicates texture loads and uploads
//! - `mesh` turns database meshes into device-ready [`crate::data_structures::mesh::MeshRecord`]s
//! - `gltf_loader` fills a scene database from a glTF file

use std::path::Path;

use anyhow::Context as _;

pub mod cache;
pub mod gltf_loader;
pub mod mesh;

/// Decoded image data, always expanded to RGBA8.
#[derive(Clone, Debug, PartialEq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    /// Channel count of the source file before expansion.
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl RawImage {
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat((width * height) as usize);
        Self {
            width,
            height,
            channels: 4,
            pixels,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let img = image::load_from_memory(bytes)?;
        let channels = img.color().channel_count();
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            channels,
            pixels: rgba.into_raw(),
        })
    }
}

/// Turns a path into pixels. Failures are reported, not panicked on.
pub trait ImageLoader {
    fn load(&self, path: &Path) -> anyhow::Result<RawImage>;
}

impl<F> ImageLoader for F
where
    F: Fn(&Path) -> anyhow::Result<RawImage>,
{
    fn load(&self, path: &Path) -> anyhow::Result<RawImage> {
        self(path)
    }
}

/// Reads images from disk and decodes them with the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileImageLoader;

impl ImageLoader for FileImageLoader {
    fn load(&self, path: &Path) -> anyhow::Result<RawImage> {
        let bytes = load_binary(path)?;
        RawImage::from_bytes(&bytes).with_context(|| format!("decoding {}", path.display()))
    }
}

pub fn load_binary(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}
