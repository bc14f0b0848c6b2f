use log::{debug, info};

use crate::{
    data_structures::{
        database::{MeshData, SceneDatabase},
        material::{MaterialRecord, TextureKind},
        mesh::{MeshRecord, MeshVertex, TextureBinding},
    },
    device::GraphicsDevice,
    error::{Result, SceneError},
    flow::SceneConsumer,
    resources::{ImageLoader, cache::ResourceCache},
};

/// Interleaves the database channels into the vertex layout. Normals,
/// tangents and UVs a mesh lacks are zero; bitangents are not part of the
/// layout and are dropped.
pub fn assemble_vertices(mesh: &MeshData) -> Vec<MeshVertex> {
    let uvs = mesh.uvs().unwrap_or(&[]);
    mesh.positions
        .iter()
        .enumerate()
        .map(|(i, &position)| MeshVertex {
            position,
            normal: mesh.normals.get(i).copied().unwrap_or_default(),
            tex_coords: uvs.get(i).copied().unwrap_or_default(),
            tangent: mesh.tangents.get(i).copied().unwrap_or_default(),
        })
        .collect()
}

/// Three indices per polygon, in stored winding order.
pub fn assemble_indices(polygons: &[[u32; 3]]) -> Vec<u32> {
    polygons.iter().flatten().copied().collect()
}

/**
 * Meshes that were stored without tangents need them computed for normal maps
 * to work. Each triangle contributes the tangent solving its UV gradient; the
 * per-vertex result is the average over all triangles sharing the vertex.
 *
 * Indices must already be validated against `vertices`.
 */
pub fn generate_tangents(vertices: &mut [MeshVertex], indices: &[u32]) {
    let mut sums = vec![cgmath::Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
    let mut triangles_included = vec![0u32; vertices.len()];

    for c in indices.chunks_exact(3) {
        let (i0, i1, i2) = (c[0] as usize, c[1] as usize, c[2] as usize);
        let (v0, v1, v2) = (vertices[i0], vertices[i1], vertices[i2]);

        let pos0: cgmath::Vector3<_> = v0.position.into();
        let pos1: cgmath::Vector3<_> = v1.position.into();
        let pos2: cgmath::Vector3<_> = v2.position.into();

        let uv0: cgmath::Vector2<_> = v0.tex_coords.into();
        let uv1: cgmath::Vector2<_> = v1.tex_coords.into();
        let uv2: cgmath::Vector2<_> = v2.tex_coords.into();

        let delta_pos1 = pos1 - pos0;
        let delta_pos2 = pos2 - pos0;
        let delta_uv1 = uv1 - uv0;
        let delta_uv2 = uv2 - uv0;

        // delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
        // delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
        let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        if det.abs() <= f32::EPSILON {
            // UVs collapse to a line or point; no usable direction
            continue;
        }
        let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) / det;

        for i in [i0, i1, i2] {
            sums[i] += tangent;
            triangles_included[i] += 1;
        }
    }

    for ((v, sum), n) in vertices.iter_mut().zip(sums).zip(triangles_included) {
        if n > 0 {
            v.tangent = (sum / n as f32).into();
        }
    }
}

/// Builds the device-ready record of one database mesh.
///
/// Textures are bound in [`TextureKind::ALL`] order; kinds the material does
/// not reference get no binding. A texture that fails to load is still bound,
/// with the missing-texture handle.
pub fn build_mesh<L, D>(
    mesh: &MeshData,
    material: Option<&MaterialRecord>,
    db: &SceneDatabase,
    cache: &mut ResourceCache,
    loader: &L,
    device: &mut D,
) -> Result<MeshRecord>
where
    L: ImageLoader + ?Sized,
    D: GraphicsDevice + ?Sized,
{
    let mut vertices = assemble_vertices(mesh);
    let indices = assemble_indices(&mesh.polygons);
    if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
        return Err(SceneError::IndexOutOfRange {
            mesh: mesh.id,
            index,
            vertex_count: vertices.len(),
        });
    }
    if cache.config().generate_tangents && mesh.tangents.is_empty() && mesh.uvs().is_some() {
        generate_tangents(&mut vertices, &indices);
    }

    let mut bindings = Vec::new();
    if let Some(material) = material {
        for (kind, texture) in material.textures() {
            let record = db.texture(texture).ok_or(SceneError::UnknownTexture {
                id: texture,
                material: material.id,
            })?;
            let handle = cache.resolve(&record.path, kind, loader, device);
            bindings.push(TextureBinding { kind, handle });
        }
    }

    MeshRecord::upload(mesh.id, mesh.name.clone(), vertices, indices, bindings, device)
}

/// Consumes a scene database and builds a [`MeshRecord`] for each of its
/// meshes, pulling textures through one shared [`ResourceCache`].
pub struct MeshBuilder<'a, L: ?Sized, D: ?Sized> {
    loader: &'a L,
    device: &'a mut D,
    cache: ResourceCache,
}

impl<'a, L, D> MeshBuilder<'a, L, D>
where
    L: ImageLoader + ?Sized,
    D: GraphicsDevice + ?Sized,
{
    pub fn new(cache: ResourceCache, loader: &'a L, device: &'a mut D) -> Self {
        Self {
            loader,
            device,
            cache,
        }
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn into_cache(self) -> ResourceCache {
        self.cache
    }
}

impl<L, D> SceneConsumer for MeshBuilder<'_, L, D>
where
    L: ImageLoader + ?Sized,
    D: GraphicsDevice + ?Sized,
{
    type Output = Vec<MeshRecord>;

    fn consume(&mut self, db: &SceneDatabase) -> Result<Self::Output> {
        log_scene_stats(db);

        let mut meshes = Vec::with_capacity(db.meshes().len());
        for mesh in db.meshes() {
            let material = match mesh.material {
                Some(id) => Some(db.material(id).ok_or(SceneError::UnknownMaterial { id, mesh: mesh.id })?),
                None => None,
            };
            let record = build_mesh(mesh, material, db, &mut self.cache, self.loader, &mut *self.device)?;
            debug!(
                "mesh {} ({:?}): {} vertices, {} triangles, {} textures",
                record.id,
                record.name,
                record.vertices().len(),
                record.triangle_count(),
                record.bindings().len()
            );
            meshes.push(record);
        }

        info!(
            "built {} meshes, {} textures ({} failed to load)",
            meshes.len(),
            self.cache.len(),
            self.cache.failed_count()
        );
        Ok(meshes)
    }
}

fn log_scene_stats(db: &SceneDatabase) {
    info!(
        "scene {:?}: {} nodes, {} meshes, {} materials, {} textures, {} lights",
        db.name,
        db.nodes().len(),
        db.meshes().len(),
        db.materials().len(),
        db.textures().len(),
        db.lights().len()
    );
    if !db.aabb.is_empty() {
        info!(
            "scene bounds {:?} .. {:?}",
            Into::<[f32; 3]>::into(db.aabb.min),
            Into::<[f32; 3]>::into(db.aabb.max)
        );
    }
    for material in db.materials() {
        debug!("material {} ({:?})", material.id, material.name);
        for (key, value) in material.properties.iter() {
            debug!("  {key} = {value}");
        }
        for kind in TextureKind::ALL {
            if let Some(texture) = material.texture(kind).and_then(|id| db.texture(id)) {
                debug!("  {:?} texture {}", kind, texture.path.display());
            }
        }
    }
}
