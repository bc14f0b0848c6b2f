//! Scene graph and hierarchical traversal.
//!
//! The graph is an arena: nodes live in one table indexed by id and refer to
//! their parent and children by id only. It is built from a validated
//! [`SceneDatabase`] and is read-only afterwards.
//!
//! World transforms are not stored. Every traversal starts at the root with an
//! identity matrix and computes `world = parent_world * local` on the way
//! down, visiting a node before its children and children left to right.

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    data_structures::{
        database::{LightId, MeshId, NodeId, ROOT, SceneDatabase},
        transform::Transform,
    },
    error::{Result, SceneError},
};

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub local: Transform,
    pub meshes: Vec<MeshId>,
    pub lights: Vec<LightId>,
}

/// One mesh reference of one node, placed in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCall {
    pub node: NodeId,
    pub mesh: MeshId,
    pub world: Matrix4<f32>,
}

#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<Node>,
}

impl SceneGraph {
    pub fn from_database(db: &SceneDatabase) -> Result<Self> {
        db.validate()?;
        let nodes = db
            .nodes()
            .iter()
            .map(|record| {
                let local = record
                    .transform()
                    .map_err(|source| SceneError::DegenerateTransform {
                        node: record.id,
                        source,
                    })?;
                Ok(Node {
                    id: record.id,
                    name: record.name.clone(),
                    parent: record.parent,
                    children: record.children.clone(),
                    local,
                    meshes: record.meshes.clone(),
                    lights: record.lights.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { nodes })
    }

    pub fn root(&self) -> Option<&Node> {
        self.node(ROOT)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first pre-order walk of the whole tree from the root.
    pub fn traverse(&self, visit: impl FnMut(&Node, &Matrix4<f32>)) {
        self.traverse_from(ROOT, Matrix4::identity(), visit);
    }

    /// Walks the subtree at `start`, treating `parent_world` as the world
    /// matrix of its parent. Unknown ids are skipped.
    pub fn traverse_from(
        &self,
        start: NodeId,
        parent_world: Matrix4<f32>,
        mut visit: impl FnMut(&Node, &Matrix4<f32>),
    ) {
        let mut stack = vec![(start, parent_world)];
        while let Some((id, parent_world)) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            let world = parent_world * node.local.compose();
            visit(node, &world);
            // reversed so the leftmost child is popped first
            stack.extend(node.children.iter().rev().map(|&child| (child, world)));
        }
    }

    /// World matrix of every node reachable from the root, in visit order.
    pub fn world_transforms(&self) -> Vec<(NodeId, Matrix4<f32>)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.traverse(|node, world| out.push((node.id, *world)));
        out
    }

    /// World matrix of a single node, computed along its parent chain.
    pub fn world_transform(&self, id: NodeId) -> Option<Matrix4<f32>> {
        let mut world = self.node(id)?.local.compose();
        let mut current = self.node(id)?.parent;
        let mut steps = 0;
        while let Some(parent) = current {
            let node = self.node(parent)?;
            world = node.local.compose() * world;
            current = node.parent;
            steps += 1;
            if steps > self.nodes.len() {
                return None;
            }
        }
        Some(world)
    }

    /// Every mesh reference reachable from the root, in draw order: a node's
    /// meshes in list order, then its children's.
    pub fn draw_calls(&self) -> Vec<DrawCall> {
        let mut calls = Vec::new();
        self.traverse(|node, world| {
            calls.extend(node.meshes.iter().map(|&mesh| DrawCall {
                node: node.id,
                mesh,
                world: *world,
            }));
        });
        calls
    }
}
