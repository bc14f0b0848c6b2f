//! glTF 2.0 scene producer.
//!
//! Reads a `.gltf` or `.glb` file with the `gltf` crate and fills a
//! [`SceneDatabase`]:
//!
//! - a synthetic root node 0 holds the top-level nodes of the default scene,
//!   and node ids follow a depth-first walk from there
//! - every triangle primitive becomes one database mesh; nodes sharing a glTF
//!   mesh share its database meshes
//! - material textures are recorded by URI, relative to the glTF file;
//!   images embedded in buffers are skipped
//! - `KHR_lights_punctual` lights are placed with their node's world matrix

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use anyhow::{Context as _, bail};
use cgmath::{InnerSpace, Matrix4, SquareMatrix, Vector3, Vector4};
use gltf::khr_lights_punctual::Kind;
use log::{debug, warn};
use percent_encoding::percent_decode_str;

use crate::{
    data_structures::{
        database::{MaterialId, MeshData, MeshId, NodeId, NodeRecord, SceneDatabase, TextureId},
        light::{LightKind, LightRecord},
        material::{MaterialProperty, MaterialPropertyGroup, MaterialRecord, PropertyValue, TextureKind, property_key},
    },
    flow::SceneProducer,
    resources::load_binary,
};

#[derive(Clone, Debug)]
pub struct GltfProducer {
    path: PathBuf,
}

impl GltfProducer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory texture URIs are relative to.
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }

    pub fn load(&self) -> anyhow::Result<SceneDatabase> {
        let bytes = load_binary(&self.path)?;
        let gltf = gltf::Gltf::from_slice(&bytes)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        let buffers = gltf::import_buffers(&gltf.document, Some(self.base_dir()), gltf.blob.clone())
            .with_context(|| format!("loading buffers of {}", self.path.display()))?;

        let name = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut builder = DatabaseBuilder::new(SceneDatabase::new(name), &buffers);
        let root = builder.db.add_node(NodeRecord::new("root"));

        let scene = gltf.default_scene().or_else(|| gltf.scenes().next());
        match scene {
            Some(scene) => {
                for node in scene.nodes() {
                    builder.add_node(node, root, Matrix4::identity())?;
                }
            }
            None => warn!("{} contains no scene", self.path.display()),
        }
        Ok(builder.db)
    }
}

impl SceneProducer for GltfProducer {
    fn produce(&mut self) -> anyhow::Result<SceneDatabase> {
        self.load()
    }
}

struct DatabaseBuilder<'a> {
    db: SceneDatabase,
    buffers: &'a [gltf::buffer::Data],
    meshes: HashMap<usize, Vec<MeshId>>,
    materials: HashMap<Option<usize>, MaterialId>,
    textures: HashMap<String, TextureId>,
    visited: HashSet<usize>,
}

impl<'a> DatabaseBuilder<'a> {
    fn new(db: SceneDatabase, buffers: &'a [gltf::buffer::Data]) -> Self {
        Self {
            db,
            buffers,
            meshes: HashMap::new(),
            materials: HashMap::new(),
            textures: HashMap::new(),
            visited: HashSet::new(),
        }
    }

    fn add_node(&mut self, node: gltf::Node, parent: NodeId, parent_world: Matrix4<f32>) -> anyhow::Result<()> {
        if !self.visited.insert(node.index()) {
            bail!("glTF node {} is referenced more than once", node.index());
        }
        let (translation, [x, y, z, w], scale) = node.transform().decomposed();
        let world = parent_world * Matrix4::from(node.transform().matrix());

        let mut record = NodeRecord::new(node.name().unwrap_or_default())
            .with_parent(parent)
            .with_translation(translation)
            .with_rotation([w, x, y, z])
            .with_scale(scale);

        if let Some(mesh) = node.mesh() {
            record.meshes = self.add_mesh(&mesh, &world)?;
        }
        if let Some(light) = node.light() {
            let id = self.db.add_light(light_record(&light, &world));
            record.lights.push(id);
        }

        let id = self.db.add_node(record);
        for child in node.children() {
            self.add_node(child, id, world)?;
        }
        Ok(())
    }

    fn add_mesh(&mut self, mesh: &gltf::Mesh, world: &Matrix4<f32>) -> anyhow::Result<Vec<MeshId>> {
        for primitive in mesh.primitives() {
            let bounds = primitive.bounding_box();
            for corner in corners(bounds.min, bounds.max) {
                let p = world * corner;
                self.db.aabb.grow(p.truncate());
            }
        }
        if let Some(ids) = self.meshes.get(&mesh.index()) {
            return Ok(ids.clone());
        }

        let mut ids = Vec::new();
        let name = mesh.name().unwrap_or("mesh");
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                warn!(
                    "skipping primitive {} of mesh {:?}: {:?} is not supported",
                    primitive.index(),
                    name,
                    primitive.mode()
                );
                continue;
            }
            let mut data = self.read_primitive(&primitive)?;
            data.name = format!("{name}.{}", primitive.index());
            data.material = Some(self.material(&primitive.material()));
            debug!(
                "mesh {:?}: {} vertices, {} triangles",
                data.name,
                data.positions.len(),
                data.polygons.len()
            );
            ids.push(self.db.add_mesh(data));
        }
        self.meshes.insert(mesh.index(), ids.clone());
        Ok(ids)
    }

    fn read_primitive(&self, primitive: &gltf::Primitive) -> anyhow::Result<MeshData> {
        let reader = primitive.reader(|buffer| self.buffers.get(buffer.index()).map(|d| d.0.as_slice()));

        let mut data = MeshData::default();
        data.positions = reader
            .read_positions()
            .context("primitive has no POSITION attribute")?
            .collect();
        if let Some(normals) = reader.read_normals() {
            data.normals = normals.collect();
        }
        if let Some(tex_coords) = reader.read_tex_coords(0) {
            data.uv_sets.push(tex_coords.into_f32().collect());
        }
        if let Some(tangents) = reader.read_tangents() {
            // glTF stores the bitangent sign in w
            for (i, [x, y, z, sign]) in tangents.enumerate() {
                let tangent = Vector3::new(x, y, z);
                let normal: Vector3<f32> = data.normals.get(i).copied().unwrap_or_default().into();
                data.tangents.push(tangent.into());
                data.bitangents.push((normal.cross(tangent) * sign).into());
            }
        }

        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..data.positions.len() as u32).collect(),
        };
        if indices.len() % 3 != 0 {
            bail!("primitive has {} indices, not a triangle list", indices.len());
        }
        data.polygons = indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        Ok(data)
    }

    fn material(&mut self, material: &gltf::Material) -> MaterialId {
        if let Some(&id) = self.materials.get(&material.index()) {
            return id;
        }
        let pbr = material.pbr_metallic_roughness();
        let mut record = MaterialRecord::new(material.name().unwrap_or("default"));

        let textures = [
            (TextureKind::BaseColor, pbr.base_color_texture().map(|info| info.texture())),
            (TextureKind::Normal, material.normal_texture().map(|normal| normal.texture())),
            (
                TextureKind::MetalnessRoughness,
                pbr.metallic_roughness_texture().map(|info| info.texture()),
            ),
        ];
        for (kind, texture) in textures {
            let texture_id = texture.and_then(|t| self.texture(&t));
            record.set_texture(kind, texture_id);
            let key = property_key(group_of(kind), MaterialProperty::UseTexture);
            record.properties.insert(key, PropertyValue::Bool(texture_id.is_some()));
        }

        let props = &mut record.properties;
        props.insert(
            property_key(MaterialPropertyGroup::Metallic, MaterialProperty::Factor),
            PropertyValue::Float(pbr.metallic_factor()),
        );
        props.insert(
            property_key(MaterialPropertyGroup::Roughness, MaterialProperty::Factor),
            PropertyValue::Float(pbr.roughness_factor()),
        );
        if let Some(normal) = material.normal_texture() {
            props.insert(
                property_key(MaterialPropertyGroup::Normal, MaterialProperty::Factor),
                PropertyValue::Float(normal.scale()),
            );
        }
        if let Some(occlusion) = material.occlusion_texture() {
            props.insert(
                property_key(MaterialPropertyGroup::Occlusion, MaterialProperty::Factor),
                PropertyValue::Float(occlusion.strength()),
            );
        }
        props.insert(
            property_key(MaterialPropertyGroup::General, MaterialProperty::EnablePunctualLights),
            PropertyValue::Bool(true),
        );
        props.insert(
            property_key(MaterialPropertyGroup::General, MaterialProperty::EnableDirectionalLights),
            PropertyValue::Bool(true),
        );

        let id = self.db.add_material(record);
        self.materials.insert(material.index(), id);
        id
    }

    fn texture(&mut self, texture: &gltf::Texture) -> Option<TextureId> {
        match texture.source().source() {
            gltf::image::Source::Uri { uri, .. } if !uri.starts_with("data:") => {
                if let Some(&id) = self.textures.get(uri) {
                    return Some(id);
                }
                let id = self.db.add_texture(decode_uri(uri));
                self.textures.insert(uri.to_string(), id);
                Some(id)
            }
            _ => {
                warn!(
                    "texture {} is embedded in the file; only external images are supported",
                    texture.index()
                );
                None
            }
        }
    }
}

/// Image URIs are RFC 3986 references, so `base%20color.png` names the file
/// `base color.png`. Undecodable URIs are used as written.
fn decode_uri(uri: &str) -> String {
    match percent_decode_str(uri).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(err) => {
            warn!("image uri {uri:?} does not decode to UTF-8 ({err}), using it verbatim");
            uri.to_string()
        }
    }
}

fn group_of(kind: TextureKind) -> MaterialPropertyGroup {
    match kind {
        TextureKind::BaseColor => MaterialPropertyGroup::BaseColor,
        TextureKind::Normal => MaterialPropertyGroup::Normal,
        TextureKind::MetalnessRoughness => MaterialPropertyGroup::Metallic,
    }
}

fn light_record(light: &gltf::khr_lights_punctual::Light, world: &Matrix4<f32>) -> LightRecord {
    let position = (world * Vector4::new(0.0, 0.0, 0.0, 1.0)).truncate();
    let direction = (world * Vector4::new(0.0, 0.0, -1.0, 0.0)).truncate();
    let direction = if direction.magnitude2() > 0.0 {
        direction.normalize()
    } else {
        Vector3::new(0.0, 0.0, -1.0)
    };
    let kind = match light.kind() {
        Kind::Point => LightKind::Point,
        Kind::Directional => LightKind::Directional,
        Kind::Spot { .. } => LightKind::Spot,
    };
    LightRecord {
        id: 0,
        name: light.name().unwrap_or_default().to_string(),
        kind,
        position: position.into(),
        direction: direction.into(),
        color: light.color(),
        intensity: light.intensity(),
        range: light.range().unwrap_or(f32::INFINITY),
    }
}

fn corners(min: [f32; 3], max: [f32; 3]) -> impl Iterator<Item = Vector4<f32>> {
    (0..8).map(move |i| {
        Vector4::new(
            if i & 1 == 0 { min[0] } else { max[0] },
            if i & 2 == 0 { min[1] } else { max[1] },
            if i & 4 == 0 { min[2] } else { max[2] },
            1.0,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_fails_with_path() {
        let err = GltfProducer::new("no/such/scene.gltf").load().unwrap_err();
        assert!(format!("{err:#}").contains("no/such/scene.gltf"));
    }

    #[test]
    fn corners_span_the_box() {
        let all: Vec<_> = corners([0.0, 0.0, 0.0], [1.0, 2.0, 3.0]).collect();
        assert_eq!(all.len(), 8);
        assert!(all.contains(&Vector4::new(1.0, 2.0, 3.0, 1.0)));
        assert!(all.contains(&Vector4::new(0.0, 2.0, 0.0, 1.0)));
    }

    #[test]
    fn image_uris_are_percent_decoded() {
        assert_eq!(decode_uri("textures/base%20color.png"), "textures/base color.png");
        assert_eq!(decode_uri("plain.png"), "plain.png");
        assert_eq!(decode_uri("bad%FF.png"), "bad%FF.png");
    }
}
