use std::{
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use flow_scene::{
    ImageLoader, RawImage,
    data_structures::{
        database::{MaterialId, MeshData, MeshId, SceneDatabase},
        material::{MaterialRecord, TextureKind},
    },
};

/// Hands out a small solid image for every path, except those whose file stem
/// is listed as missing, and counts how often it was asked.
#[derive(Debug, Default)]
pub(crate) struct CountingLoader {
    calls: AtomicUsize,
    requested: Mutex<Vec<PathBuf>>,
    missing: Vec<String>,
    delay: Option<Duration>,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(stems: &[&str]) -> Self {
        Self {
            missing: stems.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Makes every load take at least `delay`, widening race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<PathBuf> {
        self.requested.lock().unwrap().clone()
    }
}

impl ImageLoader for CountingLoader {
    fn load(&self, path: &Path) -> anyhow::Result<RawImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(path.to_path_buf());
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        if self.missing.contains(&stem) {
            anyhow::bail!("{} not found", path.display());
        }
        Ok(RawImage::solid(2, 2, [200, 100, 50, 255]))
    }
}

/// A single textured triangle in the xy plane.
pub(crate) fn triangle(name: &str, material: Option<MaterialId>) -> MeshData {
    MeshData {
        positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        normals: vec![[0.0, 0.0, 1.0]; 3],
        uv_sets: vec![vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]],
        polygons: vec![[0, 1, 2]],
        material,
        ..MeshData::new(name)
    }
}

/// Adds a material binding the given texture paths and returns its id.
pub(crate) fn add_material(db: &mut SceneDatabase, name: &str, textures: &[(TextureKind, &str)]) -> MaterialId {
    let mut material = MaterialRecord::new(name);
    for (kind, path) in textures {
        let texture = db.add_texture(*path);
        material = material.with_texture(*kind, texture);
    }
    db.add_material(material)
}

/// Adds a triangle mesh using a material with the given textures.
pub(crate) fn add_textured_mesh(db: &mut SceneDatabase, name: &str, textures: &[(TextureKind, &str)]) -> MeshId {
    let material = add_material(db, name, textures);
    db.add_mesh(triangle(name, Some(material)))
}
