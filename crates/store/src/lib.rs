//! installplan-operator spec store: read-only view over the directory of
//! update specifications. Nothing is cached; every pass re-reads the disk.

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use ipo_core::UpdateSpec;
use tracing::debug;

const SPEC_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// The spec directory itself could not be listed.
#[derive(Debug, thiserror::Error)]
#[error("unable to open config directory {}: {source}", path.display())]
pub struct DirUnavailable {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A single spec file could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unable to read update spec {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid update spec {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SpecStore {
    dir: PathBuf,
}

impl SpecStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Regular `*.yml` / `*.yaml` files directly inside the directory, sorted.
    pub fn discover(&self) -> Result<Vec<PathBuf>, DirUnavailable> {
        let unavailable = |source| DirUnavailable { path: self.dir.clone(), source };
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(unavailable)? {
            let path = entry.map_err(unavailable)?.path();
            if is_spec_file(&path) {
                out.push(path);
            }
        }
        out.sort();
        debug!(dir = %self.dir.display(), count = out.len(), "discovered update specs");
        Ok(out)
    }

    pub fn load(&self, path: &Path) -> Result<UpdateSpec, StoreError> {
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Read { path: path.to_path_buf(), source })?;
        parse_spec(&text).map_err(|source| StoreError::Parse { path: path.to_path_buf(), source })
    }
}

fn is_spec_file(path: &Path) -> bool {
    let matches_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| SPEC_EXTENSIONS.contains(&e))
        .unwrap_or(false);
    // is_file follows symlinks, which mounted ConfigMaps rely on
    matches_ext && path.is_file()
}

pub fn parse_spec(text: &str) -> Result<UpdateSpec, serde_yaml::Error> {
    serde_yaml::from_str(text)
}
