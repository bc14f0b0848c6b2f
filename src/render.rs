//! The wgpu backend.
//!
//! [`WgpuDevice`] implements [`GraphicsDevice`] on top of a [`Context`]: every
//! texture upload becomes a [`Texture`] and every mesh a pair of immutable
//! vertex/index buffers. [`SceneRenderer`] is a [`DrawTarget`] that collects
//! the draw list of one frame and replays it in a single render pass.
//!
//! # Key types
//!
//! - [`GpuMesh`] holds the buffers behind one [`MeshBuffers`] id
//! - [`Instanced`] is one collected draw: a mesh, its textures and the slot of
//!   its world matrix in the instance buffer
//!
//! Material bind groups always carry all three texture kinds. A kind the mesh
//! does not bind, or whose texture failed to load, samples a neutral fallback.

use std::collections::HashMap;

use log::{debug, warn};
use wgpu::util::DeviceExt;

use crate::{
    context::Context,
    data_structures::{
        material::TextureKind,
        mesh::{MeshRecord, MeshVertex},
        scene_graph::DrawCall,
        texture::{self, Texture},
        transform::TransformRaw,
    },
    device::{DrawTarget, GraphicsDevice, MeshBuffers, TextureHandle},
    pipelines::basic::{SCENE_SHADER, mk_scene_pipeline},
    resources::RawImage,
};

#[derive(Debug)]
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

/// Uploads scene resources to a wgpu device. Texture handle `n` refers to the
/// `n`-th uploaded texture, starting at 1. Meshes without triangles get an id
/// but no buffers.
#[derive(Debug)]
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    textures: Vec<Texture>,
    meshes: Vec<Option<GpuMesh>>,
}

impl WgpuDevice {
    pub fn new(ctx: &Context) -> Self {
        Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            textures: Vec::new(),
            meshes: Vec::new(),
        }
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&Texture> {
        if handle.is_missing() {
            return None;
        }
        self.textures.get(handle.0 as usize - 1)
    }

    pub fn mesh(&self, id: u32) -> Option<&GpuMesh> {
        self.meshes.get(id as usize).and_then(Option::as_ref)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }
}

impl GraphicsDevice for WgpuDevice {
    fn upload_texture(
        &mut self,
        label: &str,
        kind: TextureKind,
        image: &RawImage,
    ) -> anyhow::Result<TextureHandle> {
        let texture = Texture::from_raw_image(&self.device, &self.queue, image, kind, label)?;
        self.textures.push(texture);
        Ok(TextureHandle(self.textures.len() as u32))
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
        // wgpu refuses zero-sized buffer slices
        if vertices.is_empty() || indices.is_empty() {
            debug!("mesh {label} has no triangles, no buffers created");
            self.meshes.push(None);
            return Ok(buffers);
        }
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Index Buffer")),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.meshes.push(Some(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: buffers.index_count,
        }));
        Ok(buffers)
    }
}

/// One collected draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instanced {
    pub mesh: u32,
    pub textures: [TextureHandle; 3],
    pub instance: u32,
}

/// Renders collected draws with the scene pipeline.
pub struct SceneRenderer {
    pipeline: Option<wgpu::RenderPipeline>,
    material_layout: wgpu::BindGroupLayout,
    fallbacks: [Texture; 3],
    default_sampler: wgpu::Sampler,
    draws: Vec<Instanced>,
    instances: Vec<TransformRaw>,
}

impl SceneRenderer {
    pub fn new(ctx: &Context) -> anyhow::Result<Self> {
        let material_layout = texture::material_layout(&ctx.device);
        let fallbacks = [
            Texture::fallback(&ctx.device, &ctx.queue, TextureKind::BaseColor)?,
            Texture::fallback(&ctx.device, &ctx.queue, TextureKind::Normal)?,
            Texture::fallback(&ctx.device, &ctx.queue, TextureKind::MetalnessRoughness)?,
        ];
        let mut renderer = Self {
            pipeline: None,
            material_layout,
            fallbacks,
            default_sampler: texture::create_default_sampler(&ctx.device),
            draws: Vec::new(),
            instances: Vec::new(),
        };
        renderer.rebuild_pipeline(ctx, SCENE_SHADER);
        Ok(renderer)
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Rebuilds the pipeline from new shader source. On failure the previous
    /// pipeline stays in use and `false` is returned.
    pub fn rebuild_pipeline(&mut self, ctx: &Context, shader_source: &str) -> bool {
        match mk_scene_pipeline(
            &ctx.device,
            ctx.color_format,
            &self.material_layout,
            &ctx.camera.bind_group_layout,
            &ctx.light.bind_group_layout,
            shader_source,
        ) {
            Some(pipeline) => {
                self.pipeline = Some(pipeline);
                true
            }
            None => {
                if self.pipeline.is_some() {
                    warn!("keeping the previous scene pipeline");
                }
                false
            }
        }
    }

    /// Draws collected since the last [`SceneRenderer::render`]. Meshes
    /// without triangles are never collected.
    pub fn pending(&self) -> &[Instanced] {
        &self.draws
    }

    /// Encodes every collected draw into one pass over the context's targets,
    /// submits it and returns the number of draws recorded. Without a
    /// pipeline only the clear is submitted.
    pub fn render(&mut self, ctx: &Context, device: &WgpuDevice) -> usize {
        let draws = std::mem::take(&mut self.draws);
        let instances = std::mem::take(&mut self.instances);

        let instance_buffer = (!instances.is_empty()).then(|| {
            ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Instance Buffer"),
                contents: bytemuck::cast_slice(&instances),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });

        let mut groups: HashMap<[TextureHandle; 3], wgpu::BindGroup> = HashMap::new();
        for draw in &draws {
            groups
                .entry(draw.textures)
                .or_insert_with(|| self.material_bind_group(ctx, device, draw.textures));
        }

        let color_view = ctx.color_view();
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        let mut recorded = 0;
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(ctx.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: ctx.depth_view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let (Some(pipeline), Some(instance_buffer)) = (&self.pipeline, &instance_buffer) {
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(1, &ctx.camera.bind_group, &[]);
                render_pass.set_bind_group(2, &ctx.light.bind_group, &[]);
                render_pass.set_vertex_buffer(1, instance_buffer.slice(..));

                for draw in &draws {
                    let (Some(mesh), Some(group)) = (device.mesh(draw.mesh), groups.get(&draw.textures)) else {
                        warn!("mesh buffers {} are not on this device", draw.mesh);
                        continue;
                    };
                    render_pass.set_bind_group(0, group, &[]);
                    render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(0..mesh.index_count, 0, draw.instance..draw.instance + 1);
                    recorded += 1;
                }
            }
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));
        debug!("rendered {recorded} of {} draws with {} material groups", draws.len(), groups.len());
        recorded
    }

    fn material_bind_group(
        &self,
        ctx: &Context,
        device: &WgpuDevice,
        handles: [TextureHandle; 3],
    ) -> wgpu::BindGroup {
        let textures: Vec<&Texture> = TextureKind::ALL
            .into_iter()
            .map(|kind| {
                device
                    .texture(handles[kind.index()])
                    .unwrap_or(&self.fallbacks[kind.index()])
            })
            .collect();
        let entries: Vec<wgpu::BindGroupEntry> = textures
            .iter()
            .enumerate()
            .flat_map(|(i, texture)| {
                let binding = 2 * i as u32;
                [
                    wgpu::BindGroupEntry {
                        binding,
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: binding + 1,
                        resource: wgpu::BindingResource::Sampler(
                            texture.sampler_or_default(&self.default_sampler),
                        ),
                    },
                ]
            })
            .collect();
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.material_layout,
            entries: &entries,
            label: Some("material_bind_group"),
        })
    }
}

impl DrawTarget for SceneRenderer {
    fn draw_mesh(&mut self, call: &DrawCall, mesh: &MeshRecord) {
        if mesh.buffers().index_count == 0 {
            return;
        }
        let mut textures = [TextureHandle::MISSING; 3];
        for binding in mesh.bindings() {
            let slot = &mut textures[binding.kind.index()];
            if slot.is_missing() {
                *slot = binding.handle;
            }
        }
        self.draws.push(Instanced {
            mesh: mesh.buffers().id,
            textures,
            instance: self.instances.len() as u32,
        });
        self.instances.push(TransformRaw::from_matrix(&call.world));
    }
}
