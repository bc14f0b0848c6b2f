//! flow-scene
//!
//! Scene-graph resolution and resource binding. A scene database (filled by a
//! producer such as the glTF loader) is validated and turned into a read-only
//! node hierarchy, device-ready meshes and a texture table in which every
//! distinct image is decoded and uploaded once. Each frame the hierarchy is
//! walked parent before child, world transforms are accumulated on the way
//! down and one draw is emitted per mesh reference.
//!
//! High-level modules
//! - `data_structures`: transforms, the scene database, meshes, materials,
//!   lights and the scene graph
//! - `resources`: image loading, the texture cache, mesh assembly and the glTF
//!   producer
//! - `device`: the graphics device seam and a headless device
//! - `flow`: the producer → processor → consumer pipeline and [`Scene`]
//! - `camera`: fly camera driven by explicit per-frame input
//! - `context`, `pipelines`, `render`: the wgpu backend
//! - `config`, `error`: configuration and error types
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod device;
pub mod error;
pub mod flow;
pub mod pipelines;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use config::SceneConfig;
pub use data_structures::{
    database::{NodeId, ROOT, SceneDatabase},
    scene_graph::{DrawCall, SceneGraph},
    transform::Transform,
};
pub use device::{DrawTarget, GraphicsDevice, HeadlessDevice, TextureHandle};
pub use error::{Result, SceneError, TransformError};
pub use flow::{Processor, Scene, SceneConsumer, SceneProducer};
pub use resources::{FileImageLoader, ImageLoader, RawImage, cache::ResourceCache, gltf_loader::GltfProducer};
