//! Error types for scene construction.
//!
//! Structural problems (dangling ids, broken trees, malformed meshes and
//! degenerate transforms) abort a load and surface as a single [`SceneError`]
//! naming the offending id. Resource-level problems such as an unreadable
//! texture never show up here; they are logged and replaced by a sentinel
//! handle (see [`crate::resources::cache`]).

use thiserror::Error;

use crate::data_structures::database::{LightId, MaterialId, MeshId, NodeId, TextureId};

/// Why a translation/rotation/scale triple was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TransformError {
    #[error("rotation quaternion is not unit length (|q| = {0})")]
    NonUnitRotation(f32),
    #[error("scale component is zero or not finite: {0:?}")]
    DegenerateScale([f32; 3]),
    #[error("translation is not finite: {0:?}")]
    NonFiniteTranslation([f32; 3]),
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("scene has no root node (expected node id 0)")]
    MissingRoot,

    #[error("root node 0 must not have a parent, found {0}")]
    RootHasParent(NodeId),

    #[error("node {referenced_by} references unknown node {id}")]
    UnknownNode { id: NodeId, referenced_by: NodeId },

    #[error("node {node} references unknown mesh {id}")]
    UnknownMesh { id: MeshId, node: NodeId },

    #[error("node {node} references unknown light {id}")]
    UnknownLight { id: LightId, node: NodeId },

    #[error("mesh {mesh} references unknown material {id}")]
    UnknownMaterial { id: MaterialId, mesh: MeshId },

    #[error("material {material} references unknown texture {id}")]
    UnknownTexture { id: TextureId, material: MaterialId },

    #[error("node {child} is listed as a child of {listed_by} but its parent is {actual:?}")]
    ParentMismatch {
        child: NodeId,
        listed_by: NodeId,
        actual: Option<NodeId>,
    },

    #[error("node stored at index {index} claims id {id}")]
    NodeIdMismatch { index: usize, id: NodeId },

    #[error("node {child} names {parent} as its parent but is not among its children")]
    ParentNotReciprocated { child: NodeId, parent: NodeId },

    #[error("node {0} is reachable twice from the root (cycle or shared child)")]
    Cycle(NodeId),

    #[error("mesh {mesh}: index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        mesh: MeshId,
        index: u32,
        vertex_count: usize,
    },

    #[error("mesh {mesh}: {len} indices do not form whole triangles")]
    IncompleteTriangles { mesh: MeshId, len: usize },

    #[error("node {node} has a degenerate transform: {source}")]
    DegenerateTransform {
        node: NodeId,
        #[source]
        source: TransformError,
    },

    #[error("graphics device rejected {label}: {source}")]
    Device {
        label: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("scene producer failed: {0}")]
    Produce(#[source] anyhow::Error),
}

pub type Result<T, E = SceneError> = std::result::Result<T, E>;
