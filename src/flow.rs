//! Scene loading flow and the loaded scene.
//!
//! Loading follows a producer → processor → consumer pipeline:
//!
//! 1. a [`SceneProducer`] fills a [`SceneDatabase`] (for example
//!    [`crate::resources::gltf_loader::GltfProducer`])
//! 2. the [`Processor`] validates it; a structural problem stops the load here
//! 3. a [`SceneConsumer`] turns the database into something usable, such as
//!    the device-ready meshes built by [`MeshBuilder`]
//!
//! [`Scene`] runs this pipeline and owns everything it produced. Dropping the
//! scene releases the database, the graph, the meshes and the texture table
//! together.

use cgmath::{Matrix4, SquareMatrix};
use log::info;

use crate::{
    config::SceneConfig,
    data_structures::{
        database::{Aabb, MeshId, ROOT, SceneDatabase},
        light::{LightRecord, LightsUniform, NamedUniform, light_uniforms},
        mesh::MeshRecord,
        scene_graph::{DrawCall, SceneGraph},
    },
    device::{DrawTarget, GraphicsDevice},
    error::{Result, SceneError},
    resources::{ImageLoader, cache::ResourceCache, mesh::MeshBuilder},
};

/// Source of a scene database.
pub trait SceneProducer {
    fn produce(&mut self) -> anyhow::Result<SceneDatabase>;
}

impl<F> SceneProducer for F
where
    F: FnMut() -> anyhow::Result<SceneDatabase>,
{
    fn produce(&mut self) -> anyhow::Result<SceneDatabase> {
        self()
    }
}

/// Receives a validated scene database.
pub trait SceneConsumer {
    type Output;

    fn consume(&mut self, db: &SceneDatabase) -> Result<Self::Output>;
}

pub struct Processor<P, C> {
    producer: P,
    consumer: C,
}

impl<P: SceneProducer, C: SceneConsumer> Processor<P, C> {
    pub fn new(producer: P, consumer: C) -> Self {
        Self { producer, consumer }
    }

    /// Produces, validates and consumes one scene.
    pub fn run(&mut self) -> Result<(SceneDatabase, C::Output)> {
        let db = self.producer.produce().map_err(SceneError::Produce)?;
        db.validate()?;
        let output = self.consumer.consume(&db)?;
        Ok((db, output))
    }

    pub fn into_consumer(self) -> C {
        self.consumer
    }
}

/// A loaded scene: the database it came from, its node hierarchy, one
/// device-ready mesh per database mesh and the textures those meshes bind.
#[derive(Debug)]
pub struct Scene {
    database: SceneDatabase,
    graph: SceneGraph,
    meshes: Vec<MeshRecord>,
    textures: ResourceCache,
}

impl Scene {
    pub fn load<P, L, D>(producer: P, config: SceneConfig, loader: &L, device: &mut D) -> Result<Self>
    where
        P: SceneProducer,
        L: ImageLoader + ?Sized,
        D: GraphicsDevice + ?Sized,
    {
        let builder = MeshBuilder::new(ResourceCache::new(config), loader, device);
        let mut processor = Processor::new(producer, builder);
        let (database, meshes) = processor.run()?;
        let textures = processor.into_consumer().into_cache();
        let graph = SceneGraph::from_database(&database)?;
        info!(
            "loaded scene {:?}: {} draws per frame",
            database.name,
            graph.draw_calls().len()
        );
        Ok(Self {
            database,
            graph,
            meshes,
            textures,
        })
    }

    pub fn from_database<L, D>(
        database: SceneDatabase,
        config: SceneConfig,
        loader: &L,
        device: &mut D,
    ) -> Result<Self>
    where
        L: ImageLoader + ?Sized,
        D: GraphicsDevice + ?Sized,
    {
        let mut database = Some(database);
        Self::load(
            move || database.take().ok_or_else(|| anyhow::anyhow!("scene database already taken")),
            config,
            loader,
            device,
        )
    }

    pub fn database(&self) -> &SceneDatabase {
        &self.database
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn meshes(&self) -> &[MeshRecord] {
        &self.meshes
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshRecord> {
        self.meshes.get(id as usize)
    }

    pub fn textures(&self) -> &ResourceCache {
        &self.textures
    }

    pub fn aabb(&self) -> Aabb {
        self.database.aabb
    }

    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.graph.draw_calls()
    }

    /// Submits every mesh reference in hierarchy order and returns the number
    /// of draws issued.
    pub fn draw<T: DrawTarget + ?Sized>(&self, target: &mut T) -> usize {
        self.submit(self.draw_calls(), target)
    }

    /// Submits every mesh once with an identity transform, ignoring the
    /// hierarchy.
    pub fn draw_flat<T: DrawTarget + ?Sized>(&self, target: &mut T) -> usize {
        let calls = self
            .meshes
            .iter()
            .map(|mesh| DrawCall {
                node: ROOT,
                mesh: mesh.id,
                world: Matrix4::identity(),
            })
            .collect();
        self.submit(calls, target)
    }

    fn submit<T: DrawTarget + ?Sized>(&self, calls: Vec<DrawCall>, target: &mut T) -> usize {
        let mut count = 0;
        for call in &calls {
            if let Some(mesh) = self.mesh(call.mesh) {
                target.draw_mesh(call, mesh);
                count += 1;
            }
        }
        count
    }

    pub fn lights(&self) -> &[LightRecord] {
        self.database.lights()
    }

    pub fn light_uniforms(&self) -> Vec<NamedUniform> {
        light_uniforms(self.lights())
    }

    pub fn packed_lights(&self) -> LightsUniform {
        LightsUniform::from_records(self.lights())
    }
}
