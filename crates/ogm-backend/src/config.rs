use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::error::{BackendError, BackendResult};

/// Name of the marker file recording which backend owns a directory.
pub const MARKER_FILE: &str = "ogm.toml";

/// Backend family stored in a directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Graph,
    Map,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Graph => f.write_str("graph"),
            BackendKind::Map => f.write_str("map"),
        }
    }
}

/// Contents of the marker file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMarker {
    pub backend: BackendKind,
}

/// Configuration for opening a backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Storage directory. `None` opens a volatile in-memory backend.
    pub path: Option<PathBuf>,
    /// Whether writes become durable only on commit.
    pub transactional: bool,
    /// Capacity of the node-existence cache.
    pub node_cache_capacity: usize,
    /// Capacity of the reification cache.
    pub object_cache_capacity: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            path: None,
            transactional: false,
            node_cache_capacity: DEFAULT_CACHE_CAPACITY,
            object_cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl BackendConfig {
    /// Volatile backend with default caches.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Durable backend rooted at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    pub fn from_toml_str(s: &str) -> BackendResult<Self> {
        toml::from_str(s).map_err(|e| BackendError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> BackendResult<Self> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }
}

/// Verify that `dir` belongs to `kind`, claiming it if it is new.
///
/// A directory already claimed by another backend kind is rejected with
/// [`BackendError::InvalidStore`].
pub fn claim_directory(dir: &Path, kind: BackendKind) -> BackendResult<()> {
    fs::create_dir_all(dir)?;
    let marker_path = dir.join(MARKER_FILE);
    if marker_path.exists() {
        let raw = fs::read_to_string(&marker_path)?;
        let marker: StoreMarker =
            toml::from_str(&raw).map_err(|e| BackendError::Config(e.to_string()))?;
        if marker.backend != kind {
            return Err(BackendError::InvalidStore(format!(
                "{} holds a {} backend, not {}",
                dir.display(),
                marker.backend,
                kind
            )));
        }
        return Ok(());
    }
    let raw = toml::to_string(&StoreMarker { backend: kind })
        .map_err(|e| BackendError::Config(e.to_string()))?;
    fs::write(marker_path, raw)?;
    Ok(())
}

/// Read the marker of `dir`, if it has one.
pub fn read_marker(dir: &Path) -> BackendResult<Option<StoreMarker>> {
    let marker_path = dir.join(MARKER_FILE);
    if !marker_path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(marker_path)?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| BackendError::Config(e.to_string()))
}
