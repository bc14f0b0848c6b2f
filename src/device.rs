//! The seam between the scene core and a graphics API.
//!
//! The core only ever talks to a [`GraphicsDevice`] (to upload textures and
//! mesh buffers) and a [`DrawTarget`] (to submit draws). The wgpu backend lives
//! in [`crate::render`]; [`HeadlessDevice`] implements both traits without a
//! GPU and records what it was asked to do.

use cgmath::Matrix4;

use crate::{
    data_structures::{
        database::{MeshId, NodeId},
        material::TextureKind,
        mesh::{MeshRecord, MeshVertex},
        scene_graph::DrawCall,
    },
    resources::RawImage,
};

/// Opaque id of a texture living on the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

impl TextureHandle {
    /// Handed out for textures that could not be loaded. Devices never return
    /// it for a successful upload.
    pub const MISSING: TextureHandle = TextureHandle(0);

    pub fn is_missing(self) -> bool {
        self == Self::MISSING
    }
}

/// Vertex and index buffers of one mesh, created once and never resized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshBuffers {
    pub id: u32,
    pub vertex_count: u32,
    pub index_count: u32,
}

pub trait GraphicsDevice {
    fn upload_texture(
        &mut self,
        label: &str,
        kind: TextureKind,
        image: &RawImage,
    ) -> anyhow::Result<TextureHandle>;

    fn create_mesh_buffers(
        &mut self,
        label: &str,
        vertices: &[MeshVertex],
        indices: &[u32],
    ) -> anyhow::Result<MeshBuffers>;
}

pub trait DrawTarget {
    fn draw_mesh(&mut self, call: &DrawCall, mesh: &MeshRecord);
}

impl<T: DrawTarget + ?Sized> DrawTarget for &mut T {
    fn draw_mesh(&mut self, call: &DrawCall, mesh: &MeshRecord) {
        (**self).draw_mesh(call, mesh)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureUpload {
    pub handle: TextureHandle,
    pub label: String,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeshUpload {
    pub buffers: MeshBuffers,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDraw {
    pub node: NodeId,
    pub mesh: MeshId,
    pub world: Matrix4<f32>,
    pub index_count: u32,
    pub textures: Vec<TextureHandle>,
}

/// A device without a GPU: handles are sequential starting at 1, and every
/// upload and draw is recorded for inspection.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    textures: Vec<TextureUpload>,
    meshes: Vec<MeshUpload>,
    draws: Vec<RecordedDraw>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture_uploads(&self) -> &[TextureUpload] {
        &self.textures
    }

    pub fn mesh_uploads(&self) -> &[MeshUpload] {
        &self.meshes
    }

    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    pub fn clear_draws(&mut self) {
        self.draws.clear();
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn upload_texture(
        &mut self,
        label: &str,
        kind: TextureKind,
        image: &RawImage,
    ) -> anyhow::Result<TextureHandle> {
        if image.width == 0 || image.height == 0 {
            anyhow::bail!("texture {label} has no pixels");
        }
        let handle = TextureHandle(self.textures.len() as u32 + 1);
        self.textures.push(TextureUpload {
            handle,
            label: label.to_string(),
            kind,
            width: image.width,
            height: image.height,
        });
        Ok(handle)
    }

    fn create_mesh_buffers(
        &mut self,
        label: &str,
        vertices: &[MeshVertex],
        indices: &[u32],
    ) -> anyhow::Result<MeshBuffers> {
        let buffers = MeshBuffers {
            id: self.meshes.len() as u32,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
        };
        self.meshes.push(MeshUpload {
            buffers,
            label: label.to_string(),
        });
        Ok(buffers)
    }
}

impl DrawTarget for HeadlessDevice {
    fn draw_mesh(&mut self, call: &DrawCall, mesh: &MeshRecord) {
        self.draws.push(RecordedDraw {
            node: call.node,
            mesh: call.mesh,
            world: call.world,
            index_count: mesh.buffers().index_count,
            textures: mesh.bindings().iter().map(|b| b.handle).collect(),
        });
    }
}
