//! Load-once texture cache.
//!
//! Every texture a scene references goes through [`ResourceCache::resolve`].
//! The first request for a key decodes the image and uploads it; every later
//! request for the same key returns the stored handle without touching the
//! loader or the device. A texture that fails to load is remembered as
//! [`TextureHandle::MISSING`] and is not retried.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use log::{debug, warn};

use crate::{
    config::SceneConfig,
    data_structures::material::TextureKind,
    device::{GraphicsDevice, TextureHandle},
    resources::ImageLoader,
};

/// How a texture path is turned into a cache key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CacheKeyPolicy {
    /// File stem only: `a/wood.png` and `b/wood.jpg` share one entry.
    #[default]
    Stem,
    /// The path as stored in the scene.
    FullPath,
}

impl CacheKeyPolicy {
    pub fn key(self, path: &Path) -> String {
        match self {
            CacheKeyPolicy::Stem => texture_name(path),
            CacheKeyPolicy::FullPath => path.to_string_lossy().into_owned(),
        }
    }
}

/// The file stem of `path`, case preserved: `Models/Wood_Albedo.png` gives
/// `Wood_Albedo`. Both `/` and `\` separate directories on every platform.
pub fn texture_name(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let path = Path::new(&normalized);
    path.file_stem()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .into_owned()
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureResource {
    pub key: String,
    /// Path of the first request for this key.
    pub path: PathBuf,
    /// Kind of the first request for this key.
    pub kind: TextureKind,
    pub handle: TextureHandle,
}

impl TextureResource {
    pub fn is_loaded(&self) -> bool {
        !self.handle.is_missing()
    }
}

/// Texture table of one scene. Entries are never evicted.
#[derive(Debug)]
pub struct ResourceCache {
    entries: Vec<TextureResource>,
    index: HashMap<String, usize>,
    config: SceneConfig,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}

impl ResourceCache {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Handle of the texture stored under `path`, loading and uploading it on
    /// first use. Never fails: unreadable images and rejected uploads are
    /// logged and yield [`TextureHandle::MISSING`].
    pub fn resolve<L, D>(
        &mut self,
        path: &Path,
        kind: TextureKind,
        loader: &L,
        device: &mut D,
    ) -> TextureHandle
    where
        L: ImageLoader + ?Sized,
        D: GraphicsDevice + ?Sized,
    {
        let key = self.config.cache_key.key(path);
        if let Some(&i) = self.index.get(&key) {
            let entry = &self.entries[i];
            if entry.path != path {
                debug!(
                    "texture {} aliases {} under key {:?}",
                    path.display(),
                    entry.path.display(),
                    key
                );
            }
            if entry.kind != kind {
                warn!(
                    "texture {:?} requested as {:?} but was loaded as {:?}",
                    key, kind, entry.kind
                );
            }
            return entry.handle;
        }

        let handle = self.load(&key, path, kind, loader, device);
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(TextureResource {
            key,
            path: path.to_path_buf(),
            kind,
            handle,
        });
        handle
    }

    fn load<L, D>(
        &self,
        key: &str,
        path: &Path,
        kind: TextureKind,
        loader: &L,
        device: &mut D,
    ) -> TextureHandle
    where
        L: ImageLoader + ?Sized,
        D: GraphicsDevice + ?Sized,
    {
        let file = self.config.locate_texture(path);
        let image = match loader.load(&file) {
            Ok(image) => image,
            Err(e) => {
                warn!("could not load texture {:?} from {}: {e:#}", key, file.display());
                return TextureHandle::MISSING;
            }
        };
        match device.upload_texture(key, kind, &image) {
            Ok(handle) => {
                debug!(
                    "loaded texture {:?} ({}x{}, {} channels) as {:?}",
                    key, image.width, image.height, image.channels, kind
                );
                handle
            }
            Err(e) => {
                warn!("device rejected texture {:?}: {e:#}", key);
                TextureHandle::MISSING
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&TextureResource> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn get_by_path(&self, path: &Path) -> Option<&TextureResource> {
        self.get(&self.config.cache_key.key(path))
    }

    /// Entries in the order they were first requested.
    pub fn iter(&self) -> impl Iterator<Item = &TextureResource> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn loaded_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_loaded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.len() - self.loaded_count()
    }
}

/// A [`ResourceCache`] shared between threads.
///
/// The lock is held across decode and upload, so concurrent requests for the
/// same key load it once and all receive the same handle.
#[derive(Clone, Debug, Default)]
pub struct SharedResourceCache {
    inner: Arc<Mutex<ResourceCache>>,
}

impl SharedResourceCache {
    pub fn new(cache: ResourceCache) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    pub fn resolve<L, D>(
        &self,
        path: &Path,
        kind: TextureKind,
        loader: &L,
        device: &mut D,
    ) -> TextureHandle
    where
        L: ImageLoader + ?Sized,
        D: GraphicsDevice + ?Sized,
    {
        // A panic in another resolver leaves the table consistent: entries are
        // only pushed after a load finished.
        let mut cache = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.resolve(path, kind, loader, device)
    }

    pub fn len(&self) -> usize {
        self.with(ResourceCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` with the cache locked.
    pub fn with<R>(&self, f: impl FnOnce(&ResourceCache) -> R) -> R {
        let cache = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&cache)
    }

    /// The inner cache, if this is the last reference to it.
    pub fn into_inner(self) -> Option<ResourceCache> {
        Arc::into_inner(self.inner).map(|m| m.into_inner().unwrap_or_else(|p| p.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{device::HeadlessDevice, resources::RawImage};

    fn counting_loader(calls: &Cell<usize>) -> impl Fn(&Path) -> anyhow::Result<RawImage> + '_ {
        move |_| {
            calls.set(calls.get() + 1);
            Ok(RawImage::solid(2, 2, [255, 0, 0, 255]))
        }
    }

    #[test]
    fn second_resolve_is_a_hit() {
        let calls = Cell::new(0);
        let loader = counting_loader(&calls);
        let mut device = HeadlessDevice::new();
        let mut cache = ResourceCache::default();

        let a = cache.resolve(Path::new("tex/wood.png"), TextureKind::BaseColor, &loader, &mut device);
        let b = cache.resolve(Path::new("tex/wood.png"), TextureKind::BaseColor, &loader, &mut device);

        assert_eq!(a, b);
        assert_eq!(calls.get(), 1);
        assert_eq!(device.texture_uploads().len(), 1);
        assert_eq!(cache.get("wood").unwrap().handle, a);
    }

    #[test]
    fn backslash_paths_key_by_stem() {
        assert_eq!(texture_name(Path::new("textures\\albedo.png")), "albedo");
        assert_eq!(texture_name(Path::new("C:\\assets\\Wood_Albedo.PNG")), "Wood_Albedo");
        assert_eq!(
            CacheKeyPolicy::Stem.key(Path::new("a\\wood.png")),
            CacheKeyPolicy::Stem.key(Path::new("b/wood.jpg"))
        );
    }

    #[test]
    fn same_stem_aliases_under_stem_policy() {
        let calls = Cell::new(0);
        let loader = counting_loader(&calls);
        let mut device = HeadlessDevice::new();
        let mut cache = ResourceCache::default();

        let a = cache.resolve(Path::new("a/wood.png"), TextureKind::BaseColor, &loader, &mut device);
        let b = cache.resolve(Path::new("b/wood.jpg"), TextureKind::BaseColor, &loader, &mut device);
        assert_eq!(a, b);
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.get("wood").unwrap().path, PathBuf::from("a/wood.png"));
    }

    #[test]
    fn full_path_policy_keeps_same_stems_apart() {
        let calls = Cell::new(0);
        let loader = counting_loader(&calls);
        let mut device = HeadlessDevice::new();
        let mut cache = ResourceCache::new(SceneConfig::default().with_cache_key(CacheKeyPolicy::FullPath));

        let a = cache.resolve(Path::new("a/wood.png"), TextureKind::BaseColor, &loader, &mut device);
        let b = cache.resolve(Path::new("b/wood.png"), TextureKind::BaseColor, &loader, &mut device);
        assert_ne!(a, b);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn stem_keys_are_case_sensitive() {
        let calls = Cell::new(0);
        let loader = counting_loader(&calls);
        let mut device = HeadlessDevice::new();
        let mut cache = ResourceCache::default();

        cache.resolve(Path::new("Wood.png"), TextureKind::BaseColor, &loader, &mut device);
        cache.resolve(Path::new("wood.png"), TextureKind::BaseColor, &loader, &mut device);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failure_is_cached_as_missing() {
        let calls = Cell::new(0);
        let loader = |_: &Path| -> anyhow::Result<RawImage> {
            calls.set(calls.get() + 1);
            anyhow::bail!("no such file")
        };
        let mut device = HeadlessDevice::new();
        let mut cache = ResourceCache::default();

        for _ in 0..3 {
            let handle = cache.resolve(Path::new("gone.png"), TextureKind::Normal, &loader, &mut device);
            assert_eq!(handle, TextureHandle::MISSING);
        }
        assert_eq!(calls.get(), 1);
        assert_eq!((cache.loaded_count(), cache.failed_count()), (0, 1));
        assert!(device.texture_uploads().is_empty());
    }

    #[test]
    fn loader_receives_located_path() {
        let seen = std::cell::RefCell::new(Vec::new());
        let loader = |p: &Path| -> anyhow::Result<RawImage> {
            seen.borrow_mut().push(p.to_path_buf());
            Ok(RawImage::solid(1, 1, [0; 4]))
        };
        let mut device = HeadlessDevice::new();
        let mut cache = ResourceCache::new(SceneConfig::default().with_texture_dir("textures"));
        cache.resolve(Path::new("C:/art/Brick_Normal.tga"), TextureKind::Normal, &loader, &mut device);
        assert_eq!(seen.into_inner(), vec![PathBuf::from("textures/Brick_Normal.png")]);
    }
}
