use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yml::Value;
use yaml_merge_keys::merge_keys_serde_yml;

use crate::interpreter::loader::{LoadPath, default_library_dir};
use crate::interpreter::watcher::DEFAULT_WATCH_INTERVAL;

/// Runtime settings. Every field is optional in YAML; command line flags
/// are applied on top by the player.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    /// Frames between checks of the watched scripts.
    pub watch_interval: u32,
    pub verbose: bool,
    pub load_paths: Vec<PathBuf>,
    pub default_load_path: bool,
    pub title: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            width: 500,
            height: 500,
            fps: 60.0,
            watch_interval: DEFAULT_WATCH_INTERVAL,
            verbose: false,
            load_paths: Vec::new(),
            default_load_path: true,
            title: None,
        }
    }
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let source = fs::read_to_string(path).map_err(|err| {
            format!("failed to read config '{}': {}", path.display(), err)
        })?;

        Self::from_yaml(&source).map_err(|err| {
            format!("invalid config '{}': {}", path.display(), err)
        })
    }

    pub fn from_yaml(source: &str) -> Result<Self, String> {
        let raw: Value = serde_yml::from_str(source)
            .map_err(|err| format!("failed to parse YAML: {}", err))?;

        // An empty document parses as null.
        if raw.is_null() {
            return Ok(Self::default());
        }

        let merged = merge_keys_serde_yml(raw)
            .map_err(|err| format!("failed to process merge keys: {}", err))?;

        serde_yml::from_value(merged)
            .map_err(|err| format!("failed to decode settings: {}", err))
    }

    /// The search path: `VIVO_PATH`, then `load_paths`, then the library
    /// directory unless disabled.
    pub fn load_path(&self) -> LoadPath {
        let default = if self.default_load_path {
            default_library_dir()
        } else {
            None
        };
        LoadPath::from_env(&self.load_paths, default)
    }
}
