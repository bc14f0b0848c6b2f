use std::path::{Path, PathBuf};

use crate::resources::cache::CacheKeyPolicy;

pub const ASSETS_ENV: &str = "FLOW_SCENE_ASSETS";
pub const TEXTURES_ENV: &str = "FLOW_SCENE_TEXTURES";

/// Where scene assets are found and how they are cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneConfig {
    /// Base directory relative texture paths are resolved against.
    pub asset_root: PathBuf,
    /// When set, textures are looked up as `<texture_dir>/<stem>.<texture_extension>`
    /// regardless of the directory stored in the scene.
    pub texture_dir: Option<PathBuf>,
    pub texture_extension: String,
    pub cache_key: CacheKeyPolicy,
    /// Derive tangents from UVs for meshes that were stored without them.
    pub generate_tangents: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            texture_dir: None,
            texture_extension: "png".to_string(),
            cache_key: CacheKeyPolicy::Stem,
            generate_tangents: true,
        }
    }
}

impl SceneConfig {
    /// Defaults overridden by `FLOW_SCENE_ASSETS` and `FLOW_SCENE_TEXTURES`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(root) = lookup(ASSETS_ENV).filter(|v| !v.is_empty()) {
            config.asset_root = root.into();
        }
        if let Some(dir) = lookup(TEXTURES_ENV).filter(|v| !v.is_empty()) {
            config.texture_dir = Some(dir.into());
        }
        config
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    pub fn with_texture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.texture_dir = Some(dir.into());
        self
    }

    pub fn with_texture_extension(mut self, extension: impl Into<String>) -> Self {
        self.texture_extension = extension.into();
        self
    }

    pub fn with_cache_key(mut self, policy: CacheKeyPolicy) -> Self {
        self.cache_key = policy;
        self
    }

    pub fn with_generate_tangents(mut self, generate: bool) -> Self {
        self.generate_tangents = generate;
        self
    }

    /// File a texture stored under `path` in the scene is read from.
    pub fn locate_texture(&self, path: &Path) -> PathBuf {
        match &self.texture_dir {
            Some(dir) => {
                let mut file = path.file_stem().unwrap_or(path.as_os_str()).to_os_string();
                file.push(".");
                file.push(&self.texture_extension);
                dir.join(file)
            }
            None if path.is_absolute() => path.to_path_buf(),
            None => self.asset_root.join(path),
        }
    }
}
