//! In-memory scene database.
//!
//! This is the flat, id-indexed form a producer (for example the glTF loader)
//! fills in and the scene graph is built from. Records reference each other
//! only through ids, and an id is always the record's index in its table.
//!
//! Nothing here is trusted until [`SceneDatabase::validate`] has run: it checks
//! that every reference resolves, that the node table forms a single tree
//! rooted at node 0, and that every mesh and transform is well formed.

use std::{collections::HashSet, path::PathBuf};

use cgmath::{Vector3, Zero};
use log::warn;

use crate::{
    data_structures::{
        light::LightRecord,
        material::MaterialRecord,
        transform::Transform,
    },
    error::{Result, SceneError, TransformError},
};

pub type NodeId = u32;
pub type MeshId = u32;
pub type MaterialId = u32;
pub type TextureId = u32;
pub type LightId = u32;

/// Id of the node every traversal starts from.
pub const ROOT: NodeId = 0;

#[derive(Clone, Debug, PartialEq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub translation: [f32; 3],
    /// `(w, x, y, z)`
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub meshes: Vec<MeshId>,
    pub lights: Vec<LightId>,
}

impl NodeRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            parent: None,
            children: Vec::new(),
            translation: [0.0; 3],
            rotation: [1.0, 0.0, 0.0, 0.0],
            scale: [1.0; 3],
            meshes: Vec::new(),
            lights: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_translation(mut self, translation: [f32; 3]) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_rotation(mut self, rotation: [f32; 4]) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: [f32; 3]) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_mesh(mut self, mesh: MeshId) -> Self {
        self.meshes.push(mesh);
        self
    }

    pub fn with_light(mut self, light: LightId) -> Self {
        self.lights.push(light);
        self
    }

    /// The validated local transform of this node.
    pub fn transform(&self) -> Result<Transform, TransformError> {
        Transform::from_components(self.translation, self.rotation, self.scale)
    }
}

/// Raw mesh data as stored by a producer, before it is turned into a
/// device-ready [`crate::data_structures::mesh::MeshRecord`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub id: MeshId,
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tangents: Vec<[f32; 3]>,
    pub bitangents: Vec<[f32; 3]>,
    /// UV channels; only channel 0 is used for rendering.
    pub uv_sets: Vec<Vec<[f32; 2]>>,
    pub polygons: Vec<[u32; 3]>,
    pub material: Option<MaterialId>,
}

impl MeshData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn uvs(&self) -> Option<&[[f32; 2]]> {
        self.uv_sets.first().map(Vec::as_slice)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureRecord {
    pub id: TextureId,
    pub path: PathBuf,
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    /// An inverted box that grows to fit the first point added to it.
    pub fn empty() -> Self {
        Self {
            min: Vector3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Vector3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn grow(&mut self, point: Vector3<f32>) {
        self.min = Vector3::new(
            self.min.x.min(point.x),
            self.min.y.min(point.y),
            self.min.z.min(point.z),
        );
        self.max = Vector3::new(
            self.max.x.max(point.x),
            self.max.y.max(point.y),
            self.max.z.max(point.z),
        );
    }

    pub fn center(&self) -> Vector3<f32> {
        if self.is_empty() {
            return Vector3::zero();
        }
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vector3<f32> {
        if self.is_empty() {
            return Vector3::zero();
        }
        self.max - self.min
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

/// Flat tables of every record in a scene.
#[derive(Clone, Debug, Default)]
pub struct SceneDatabase {
    pub name: String,
    nodes: Vec<NodeRecord>,
    meshes: Vec<MeshData>,
    materials: Vec<MaterialRecord>,
    textures: Vec<TextureRecord>,
    lights: Vec<LightRecord>,
    pub aabb: Aabb,
}

impl SceneDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Appends a node and assigns its id. If the node names a parent that is
    /// already present, it is appended to that parent's child list.
    pub fn add_node(&mut self, mut node: NodeRecord) -> NodeId {
        let id = self.nodes.len() as NodeId;
        node.id = id;
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(p as usize)) {
            parent.children.push(id);
        }
        self.nodes.push(node);
        id
    }

    pub fn add_mesh(&mut self, mut mesh: MeshData) -> MeshId {
        let id = self.meshes.len() as MeshId;
        mesh.id = id;
        self.meshes.push(mesh);
        id
    }

    pub fn add_material(&mut self, mut material: MaterialRecord) -> MaterialId {
        let id = self.materials.len() as MaterialId;
        material.id = id;
        self.materials.push(material);
        id
    }

    pub fn add_texture(&mut self, path: impl Into<PathBuf>) -> TextureId {
        let id = self.textures.len() as TextureId;
        self.textures.push(TextureRecord {
            id,
            path: path.into(),
        });
        id
    }

    pub fn add_light(&mut self, mut light: LightRecord) -> LightId {
        let id = self.lights.len() as LightId;
        light.id = id;
        self.lights.push(light);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id as usize)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(id as usize)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshData> {
        self.meshes.get(id as usize)
    }

    pub fn material(&self, id: MaterialId) -> Option<&MaterialRecord> {
        self.materials.get(id as usize)
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureRecord> {
        self.textures.get(id as usize)
    }

    pub fn light(&self, id: LightId) -> Option<&LightRecord> {
        self.lights.get(id as usize)
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    pub fn meshes(&self) -> &[MeshData] {
        &self.meshes
    }

    pub fn materials(&self) -> &[MaterialRecord] {
        &self.materials
    }

    pub fn textures(&self) -> &[TextureRecord] {
        &self.textures
    }

    pub fn lights(&self) -> &[LightRecord] {
        &self.lights
    }

    /// Checks every structural invariant and returns the first violation.
    ///
    /// Parentless nodes that are not reachable from the root are logged and
    /// never drawn. An unreachable node that names a parent is an error.
    pub fn validate(&self) -> Result<()> {
        let root = self.node(ROOT).ok_or(SceneError::MissingRoot)?;
        if let Some(parent) = root.parent {
            return Err(SceneError::RootHasParent(parent));
        }

        for (index, node) in self.nodes.iter().enumerate() {
            if node.id as usize != index {
                return Err(SceneError::NodeIdMismatch { index, id: node.id });
            }
        }
        for node in &self.nodes {
            self.validate_node(node)?;
        }
        for mesh in &self.meshes {
            self.validate_mesh(mesh)?;
        }
        for material in &self.materials {
            if let Some((_, id)) = material.textures().find(|(_, id)| self.texture(*id).is_none()) {
                return Err(SceneError::UnknownTexture {
                    id,
                    material: material.id,
                });
            }
        }

        let reachable = self.reachable_from_root()?;
        if reachable.len() != self.nodes.len() {
            for node in self.nodes.iter().filter(|n| !reachable.contains(&n.id)) {
                self.check_parent_chain(node.id)?;
                // reachable nodes were entered through their parent's child list
                if let Some(parent) = node.parent {
                    return Err(SceneError::ParentNotReciprocated {
                        child: node.id,
                        parent,
                    });
                }
                warn!(
                    "node {} ({:?}) is not reachable from the root and will not be drawn",
                    node.id, node.name
                );
            }
        }
        Ok(())
    }

    fn validate_node(&self, node: &NodeRecord) -> Result<()> {
        if let Some(parent) = node.parent {
            if self.node(parent).is_none() {
                return Err(SceneError::UnknownNode {
                    id: parent,
                    referenced_by: node.id,
                });
            }
        }
        for &child in &node.children {
            let record = self.node(child).ok_or(SceneError::UnknownNode {
                id: child,
                referenced_by: node.id,
            })?;
            if record.parent != Some(node.id) {
                return Err(SceneError::ParentMismatch {
                    child,
                    listed_by: node.id,
                    actual: record.parent,
                });
            }
        }
        if let Some(&id) = node.meshes.iter().find(|&&m| self.mesh(m).is_none()) {
            return Err(SceneError::UnknownMesh { id, node: node.id });
        }
        if let Some(&id) = node.lights.iter().find(|&&l| self.light(l).is_none()) {
            return Err(SceneError::UnknownLight { id, node: node.id });
        }
        node.transform()
            .map_err(|source| SceneError::DegenerateTransform {
                node: node.id,
                source,
            })?;
        Ok(())
    }

    fn validate_mesh(&self, mesh: &MeshData) -> Result<()> {
        if let Some(id) = mesh.material {
            if self.material(id).is_none() {
                return Err(SceneError::UnknownMaterial { id, mesh: mesh.id });
            }
        }
        let vertex_count = mesh.vertex_count();
        if let Some(&index) = mesh.polygons.iter().flatten().find(|&&i| i as usize >= vertex_count) {
            return Err(SceneError::IndexOutOfRange {
                mesh: mesh.id,
                index,
                vertex_count,
            });
        }
        Ok(())
    }

    /// Depth-first walk over child lists. Reaching a node twice means the
    /// child lists do not form a tree.
    fn reachable_from_root(&self) -> Result<HashSet<NodeId>> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return Err(SceneError::Cycle(id));
            }
            if let Some(node) = self.node(id) {
                stack.extend(node.children.iter().rev());
            }
        }
        Ok(seen)
    }

    /// Follows parent links from `start`; revisiting a node means the chain loops.
    fn check_parent_chain(&self, start: NodeId) -> Result<()> {
        let mut seen = HashSet::new();
        let mut current = Some(start);
        while let Some(id) = current {
            if !seen.insert(id) {
                return Err(SceneError::Cycle(id));
            }
            current = self.node(id).and_then(|n| n.parent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::material::TextureKind;

    fn triangle() -> MeshData {
        MeshData {
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            polygons: vec![[0, 1, 2]],
            ..MeshData::new("tri")
        }
    }

    fn root_only() -> SceneDatabase {
        let mut db = SceneDatabase::new("test");
        db.add_node(NodeRecord::new("root"));
        db
    }

    #[test]
    fn add_node_registers_child_with_parent() {
        let mut db = root_only();
        let a = db.add_node(NodeRecord::new("a").with_parent(ROOT));
        let b = db.add_node(NodeRecord::new("b").with_parent(ROOT));
        assert_eq!(db.node(ROOT).unwrap().children, vec![a, b]);
        assert!(db.validate().is_ok());
    }

    #[test]
    fn empty_database_has_no_root() {
        let db = SceneDatabase::new("empty");
        assert!(matches!(db.validate(), Err(SceneError::MissingRoot)));
    }

    #[test]
    fn dangling_mesh_reference_names_node_and_mesh() {
        let mut db = root_only();
        db.add_node(NodeRecord::new("a").with_parent(ROOT).with_mesh(4));
        match db.validate() {
            Err(SceneError::UnknownMesh { id: 4, node: 1 }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dangling_texture_reference_is_reported() {
        let mut db = root_only();
        db.add_material(MaterialRecord::new("m").with_texture(TextureKind::Normal, 9));
        assert!(matches!(
            db.validate(),
            Err(SceneError::UnknownTexture { id: 9, material: 0 })
        ));
    }

    #[test]
    fn out_of_range_index_is_reported() {
        let mut db = root_only();
        let mut mesh = triangle();
        mesh.polygons.push([0, 2, 3]);
        db.add_mesh(mesh);
        assert!(matches!(
            db.validate(),
            Err(SceneError::IndexOutOfRange {
                mesh: 0,
                index: 3,
                vertex_count: 3
            })
        ));
    }

    #[test]
    fn child_listed_twice_is_a_cycle() {
        let mut db = root_only();
        let a = db.add_node(NodeRecord::new("a").with_parent(ROOT));
        db.node_mut(ROOT).unwrap().children.push(a);
        assert!(matches!(db.validate(), Err(SceneError::Cycle(1))));
    }

    #[test]
    fn detached_parent_loop_is_a_cycle() {
        let mut db = root_only();
        let a = db.add_node(NodeRecord::new("a"));
        let b = db.add_node(NodeRecord::new("b").with_parent(a));
        db.node_mut(a).unwrap().parent = Some(b);
        assert!(matches!(db.validate(), Err(SceneError::Cycle(_))));
    }

    #[test]
    fn parent_mismatch_is_reported() {
        let mut db = root_only();
        let a = db.add_node(NodeRecord::new("a").with_parent(ROOT));
        db.add_node(NodeRecord::new("b").with_parent(a));
        // root claims b as well
        db.node_mut(ROOT).unwrap().children.push(2);
        assert!(matches!(
            db.validate(),
            Err(SceneError::ParentMismatch {
                child: 2,
                listed_by: 0,
                actual: Some(1)
            })
        ));
    }

    #[test]
    fn zero_scale_node_is_rejected() {
        let mut db = root_only();
        db.add_node(NodeRecord::new("flat").with_parent(ROOT).with_scale([1.0, 0.0, 1.0]));
        assert!(matches!(
            db.validate(),
            Err(SceneError::DegenerateTransform { node: 1, .. })
        ));
    }

    #[test]
    fn drifted_node_id_is_reported() {
        let mut db = root_only();
        db.add_node(NodeRecord::new("a").with_parent(ROOT));
        db.node_mut(1).unwrap().id = 7;
        assert!(matches!(
            db.validate(),
            Err(SceneError::NodeIdMismatch { index: 1, id: 7 })
        ));
    }

    #[test]
    fn parent_link_without_child_entry_is_reported() {
        let mut db = root_only();
        let a = db.add_node(NodeRecord::new("a").with_parent(ROOT));
        let b = db.add_node(NodeRecord::new("b").with_parent(a));
        db.node_mut(a).unwrap().children.clear();
        assert!(matches!(
            db.validate(),
            Err(SceneError::ParentNotReciprocated { child, parent }) if child == b && parent == a
        ));
    }

    #[test]
    fn unreachable_orphan_is_tolerated() {
        let mut db = root_only();
        db.add_node(NodeRecord::new("orphan"));
        assert!(db.validate().is_ok());
    }

    #[test]
    fn aabb_grows_to_fit_points() {
        let mut aabb = Aabb::empty();
        assert!(aabb.is_empty());
        aabb.grow(Vector3::new(1.0, -1.0, 0.0));
        aabb.grow(Vector3::new(-1.0, 2.0, 4.0));
        assert_eq!(aabb.min, Vector3::new(-1.0, -1.0, 0.0));
        assert_eq!(aabb.max, Vector3::new(1.0, 2.0, 4.0));
        assert_eq!(aabb.center(), Vector3::new(0.0, 0.5, 2.0));
    }
}
