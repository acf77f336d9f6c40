//! Resource path resolution.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chime_core::LoadError;
use parking_lot::RwLock;
use tracing::{debug, trace};

/// Maps resource paths to their raw bytes.
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    async fn resolve(&self, path: &str) -> Result<Bytes, LoadError>;
}

/// Resolves resource paths against a root directory.
///
/// Paths are relative to the root; a leading `/` is ignored. Paths that would
/// leave the root are reported as not found.
#[derive(Debug, Clone)]
pub struct DirResolver {
    root: PathBuf,
}

impl DirResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of a resource path.
    pub fn locate(&self, path: &str) -> Option<PathBuf> {
        let mut located = self.root.clone();
        for component in Path::new(path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => located.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(located)
    }
}

#[async_trait]
impl ResourceResolver for DirResolver {
    async fn resolve(&self, path: &str) -> Result<Bytes, LoadError> {
        let located = self
            .locate(path)
            .ok_or_else(|| LoadError::NotFound(format!("{path} (outside resource root)")))?;

        match tokio::fs::read(&located).await {
            Ok(data) => {
                debug!("Resolved {path} to {} ({} bytes)", located.display(), data.len());
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LoadError::NotFound(path.to_string()))
            }
            Err(e) => Err(LoadError::NotFound(format!("{path}: {e}"))),
        }
    }
}

/// In-memory resources, for embedded assets and tests.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `data` under `path`, replacing any previous entry.
    pub fn insert(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        self.entries.write().insert(path.into(), data.into());
    }

    pub fn remove(&self, path: &str) -> Option<Bytes> {
        self.entries.write().remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl ResourceResolver for MemoryResolver {
    async fn resolve(&self, path: &str) -> Result<Bytes, LoadError> {
        trace!("Resolving {path} from memory");
        self.entries
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(path.to_string()))
    }
}
