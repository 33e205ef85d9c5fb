//! Directory-backed module provider
//!
//! Module id `a/b/c` lives in `<root>/a/b/c.json`, a document of the form
//! `{"kind": "type" | "instance", "spec": ...}`. Synchronous requests only
//! see modules that were preloaded or fetched asynchronously before.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt};
use kiln_engine::{ModuleError, ModuleExport, ModuleProvider};
use serde_json::Value as Json;
use tracing::debug;

struct DirectoryInner {
    root: PathBuf,
    loaded: DashMap<String, ModuleExport>,
}

/// Modules stored as JSON files under a root directory
#[derive(Clone)]
pub struct DirectoryModules {
    inner: Arc<DirectoryInner>,
}

impl DirectoryModules {
    /// Provider over `root`; nothing is loaded yet
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DirectoryInner {
                root: root.into(),
                loaded: DashMap::new(),
            }),
        }
    }

    /// Module root
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// File a module id maps to.
    ///
    /// Ids must be relative `/`-separated paths without `.` or `..` segments.
    pub fn path_of(&self, id: &str) -> Result<PathBuf, ModuleError> {
        let invalid = |reason: &str| ModuleError::Invalid {
            id: id.to_string(),
            reason: reason.to_string(),
        };
        if id.is_empty() {
            return Err(invalid("empty module id"));
        }

        let relative = Path::new(id);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !plain || id.split('/').any(str::is_empty) {
            return Err(invalid("module ids are relative paths of plain segments"));
        }
        Ok(self.inner.root.join(format!("{}.json", id)))
    }

    /// Read a module now so synchronous requests can see it
    pub fn preload(&self, id: &str) -> Result<(), ModuleError> {
        let export = read_module(self.path_of(id)?, id)?;
        self.inner.loaded.insert(id.to_string(), export);
        Ok(())
    }

    /// Whether a module is available synchronously
    pub fn is_loaded(&self, id: &str) -> bool {
        self.inner.loaded.contains_key(id)
    }

    /// Ids of every `.json` module under the root, sorted
    pub fn discover(&self) -> std::io::Result<Vec<String>> {
        let mut ids = Vec::new();
        if self.inner.root.is_dir() {
            collect_ids(&self.inner.root, &self.inner.root, &mut ids)?;
        }
        ids.sort();
        Ok(ids)
    }
}

impl ModuleProvider for DirectoryModules {
    fn require_sync(&self, id: &str) -> Result<ModuleExport, ModuleError> {
        if let Some(export) = self.inner.loaded.get(id) {
            return Ok(export.clone());
        }
        match self.path_of(id) {
            Ok(path) if path.is_file() => Err(ModuleError::NotLoaded { id: id.to_string() }),
            Ok(_) => Err(ModuleError::NotFound { id: id.to_string() }),
            Err(err) => Err(err),
        }
    }

    fn require_async(&self, id: &str) -> BoxFuture<'static, Result<ModuleExport, ModuleError>> {
        if let Some(export) = self.inner.loaded.get(id) {
            return future::ready(Ok(export.clone())).boxed();
        }

        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        let path = self.path_of(&id);
        async move {
            let export = read_module(path?, &id)?;
            inner.loaded.insert(id, export.clone());
            Ok::<_, ModuleError>(export)
        }
        .boxed()
    }
}

fn read_module(path: PathBuf, id: &str) -> Result<ModuleExport, ModuleError> {
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ModuleError::NotFound { id: id.to_string() })
        }
        Err(err) => {
            return Err(ModuleError::Invalid {
                id: id.to_string(),
                reason: err.to_string(),
            })
        }
    };

    let document: Json = serde_json::from_str(&content).map_err(|err| ModuleError::Invalid {
        id: id.to_string(),
        reason: err.to_string(),
    })?;
    debug!(module = id, path = %path.display(), "read module");
    ModuleExport::from_document(id, &document)
}

fn collect_ids(root: &Path, dir: &Path, ids: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_ids(root, &path, ids)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            if let Ok(relative) = path.with_extension("").strip_prefix(root) {
                let id: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                ids.push(id.join("/"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_of() {
        let modules = DirectoryModules::new("/m");
        assert_eq!(
            modules.path_of("acme/theme").unwrap(),
            PathBuf::from("/m/acme/theme.json")
        );
        assert!(modules.path_of("").is_err());
        assert!(modules.path_of("../etc/passwd").is_err());
        assert!(modules.path_of("/abs").is_err());
        assert!(modules.path_of("a//b").is_err());
    }

    #[test]
    fn test_missing_module_is_not_found() {
        let modules = DirectoryModules::new("/nonexistent-kiln-root");
        assert_eq!(
            modules.require_sync("acme/x").unwrap_err(),
            ModuleError::NotFound { id: "acme/x".into() }
        );
        assert_eq!(
            futures::executor::block_on(modules.require_async("acme/x")).unwrap_err(),
            ModuleError::NotFound { id: "acme/x".into() }
        );
    }
}
