//! Device-ready meshes: interleaved vertices, a flat triangle index list and
//! the textures bound for drawing.

use crate::{
    data_structures::{database::MeshId, material::TextureKind},
    device::{GraphicsDevice, MeshBuffers, TextureHandle},
    error::{Result, SceneError},
};

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
    pub tangent: [f32; 3],
}

impl MeshVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
        3 => Float32x3,
    ];
}

impl Vertex for MeshVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureBinding {
    pub kind: TextureKind,
    pub handle: TextureHandle,
}

/// A texture unit as the shaders see it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerSlot {
    pub unit: u32,
    pub uniform: &'static str,
    pub kind: TextureKind,
    pub handle: TextureHandle,
}

#[derive(Clone, Debug)]
pub struct MeshRecord {
    pub id: MeshId,
    pub name: String,
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    bindings: Vec<TextureBinding>,
    buffers: MeshBuffers,
}

impl MeshRecord {
    /// Validates the geometry and uploads it as immutable buffers.
    ///
    /// `indices` must be a whole number of triangles and every index must
    /// address an existing vertex. Bindings are kept in the order given.
    pub fn upload<D: GraphicsDevice + ?Sized>(
        id: MeshId,
        name: impl Into<String>,
        vertices: Vec<MeshVertex>,
        indices: Vec<u32>,
        bindings: Vec<TextureBinding>,
        device: &mut D,
    ) -> Result<Self> {
        if indices.len() % 3 != 0 {
            return Err(SceneError::IncompleteTriangles {
                mesh: id,
                len: indices.len(),
            });
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(SceneError::IndexOutOfRange {
                mesh: id,
                index,
                vertex_count: vertices.len(),
            });
        }
        let name = name.into();
        let buffers = device
            .create_mesh_buffers(&name, &vertices, &indices)
            .map_err(|source| SceneError::Device {
                label: format!("mesh {id} ({name})"),
                source,
            })?;
        Ok(Self {
            id,
            name,
            vertices,
            indices,
            bindings,
            buffers,
        })
    }

    pub fn vertices(&self) -> &[MeshVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bindings(&self) -> &[TextureBinding] {
        &self.bindings
    }

    pub fn bindings_of(&self, kind: TextureKind) -> impl Iterator<Item = &TextureBinding> {
        self.bindings.iter().filter(move |b| b.kind == kind)
    }

    pub fn buffers(&self) -> MeshBuffers {
        self.buffers
    }

    /// One slot per binding; the unit is the binding's position.
    pub fn sampler_slots(&self) -> Vec<SamplerSlot> {
        self.bindings
            .iter()
            .enumerate()
            .map(|(unit, binding)| SamplerSlot {
                unit: unit as u32,
                uniform: binding.kind.sampler_uniform(),
                kind: binding.kind,
                handle: binding.handle,
            })
            .collect()
    }
}
