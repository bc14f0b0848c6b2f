//! Engine data structures: the scene database, transforms, meshes, materials,
//! lights and the scene graph built from them.
//!
//! - `database` is the flat, id-indexed scene a producer fills in
//! - `transform` converts between translation/rotation/scale and matrices
//! - `material` and `light` hold per-record data passed on to the shaders
//! - `mesh` contains the device-ready mesh record and vertex layout
//! - `scene_graph` walks the node hierarchy and emits draw calls
//! - `texture` contains the GPU texture wrapper used by the wgpu backend

pub mod database;
pub mod light;
pub mod material;
pub mod mesh;
pub mod scene_graph;
pub mod texture;
pub mod transform;
