//! Module-loading collaborator
//!
//! The loader never reads modules itself. It asks a [`ModuleProvider`] for
//! the export of a module id, either synchronously (which fails unless the
//! module is already available) or asynchronously.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value as Json;
use thiserror::Error;

use crate::spec::TypeSpec;

/// What a module exports
#[derive(Debug, Clone)]
pub enum ModuleExport {
    /// A type specification
    Type(TypeSpec),
    /// An instance specification
    Instance(Json),
}

impl ModuleExport {
    /// Parse a module document: `{"kind": "type" | "instance", "spec": ...}`.
    ///
    /// Type specs without an `id` take the module id.
    pub fn from_document(id: &str, document: &Json) -> Result<ModuleExport, ModuleError> {
        let invalid = |reason: String| ModuleError::Invalid {
            id: id.to_string(),
            reason,
        };
        let kind = document
            .get("kind")
            .and_then(Json::as_str)
            .ok_or_else(|| invalid("missing string field 'kind'".into()))?;
        let spec = document
            .get("spec")
            .ok_or_else(|| invalid("missing field 'spec'".into()))?;

        match kind {
            "type" => {
                let mut spec = TypeSpec::from_json(spec).map_err(|e| invalid(e.to_string()))?;
                if spec.id.is_none() {
                    spec.id = Some(id.to_string());
                }
                Ok(ModuleExport::Type(spec))
            }
            "instance" => Ok(ModuleExport::Instance(spec.clone())),
            other => Err(invalid(format!("unknown module kind '{}'", other))),
        }
    }
}

/// Module-loading failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// Synchronous request for a module that has not been loaded yet
    #[error("module '{id}' is not loaded")]
    NotLoaded {
        /// Module id
        id: String,
    },

    /// No such module
    #[error("module '{id}' not found")]
    NotFound {
        /// Module id
        id: String,
    },

    /// The module exists but could not be read
    #[error("module '{id}' is invalid: {reason}")]
    Invalid {
        /// Module id
        id: String,
        /// What was wrong
        reason: String,
    },
}

impl ModuleError {
    /// Module id the error is about
    pub fn id(&self) -> &str {
        match self {
            ModuleError::NotLoaded { id }
            | ModuleError::NotFound { id }
            | ModuleError::Invalid { id, .. } => id,
        }
    }
}

/// Source of module exports
pub trait ModuleProvider: Send + Sync {
    /// Export of an already-available module
    fn require_sync(&self, id: &str) -> Result<ModuleExport, ModuleError>;

    /// Load a module, completing once it is available
    fn require_async(&self, id: &str) -> BoxFuture<'static, Result<ModuleExport, ModuleError>>;
}

#[derive(Default)]
struct MemoryInner {
    loaded: DashMap<String, ModuleExport>,
    lazy: DashMap<String, ModuleExport>,
}

/// In-memory module provider.
///
/// Modules added with [`MemoryModules::define`] are available synchronously;
/// those added with [`MemoryModules::define_lazy`] only become available
/// after an asynchronous request.
#[derive(Clone, Default)]
pub struct MemoryModules {
    inner: Arc<MemoryInner>,
}

impl MemoryModules {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an immediately available module
    pub fn define(&self, id: impl Into<String>, export: ModuleExport) {
        self.inner.loaded.insert(id.into(), export);
    }

    /// Add a module that must be loaded asynchronously first
    pub fn define_lazy(&self, id: impl Into<String>, export: ModuleExport) {
        self.inner.lazy.insert(id.into(), export);
    }

    /// Add an immediately available type module
    pub fn define_type(&self, id: impl Into<String>, spec: TypeSpec) {
        let id = id.into();
        let spec = TypeSpec {
            id: spec.id.or_else(|| Some(id.clone())),
            ..spec
        };
        self.define(id, ModuleExport::Type(spec));
    }

    /// Add an immediately available instance module
    pub fn define_instance(&self, id: impl Into<String>, spec: Json) {
        self.define(id, ModuleExport::Instance(spec));
    }

    /// Whether a module is available synchronously
    pub fn is_loaded(&self, id: &str) -> bool {
        self.inner.loaded.contains_key(id)
    }
}

impl ModuleProvider for MemoryModules {
    fn require_sync(&self, id: &str) -> Result<ModuleExport, ModuleError> {
        if let Some(export) = self.inner.loaded.get(id) {
            return Ok(export.clone());
        }
        if self.inner.lazy.contains_key(id) {
            return Err(ModuleError::NotLoaded { id: id.to_string() });
        }
        Err(ModuleError::NotFound { id: id.to_string() })
    }

    fn require_async(&self, id: &str) -> BoxFuture<'static, Result<ModuleExport, ModuleError>> {
        let result = match self.inner.lazy.remove(id) {
            Some((id, export)) => {
                self.inner.loaded.insert(id, export.clone());
                Ok(export)
            }
            None => self.require_sync(id),
        };
        future::ready(result).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn test_lazy_module_needs_async_load() {
        let modules = MemoryModules::new();
        modules.define_lazy("acme/a", ModuleExport::Instance(json!(1)));

        assert_eq!(
            modules.require_sync("acme/a").unwrap_err(),
            ModuleError::NotLoaded { id: "acme/a".into() }
        );
        assert!(block_on(modules.require_async("acme/a")).is_ok());
        assert!(modules.require_sync("acme/a").is_ok());
    }

    #[test]
    fn test_unknown_module() {
        let modules = MemoryModules::new();
        let err = block_on(modules.require_async("nope")).unwrap_err();
        assert_eq!(err, ModuleError::NotFound { id: "nope".into() });
        assert_eq!(err.id(), "nope");
    }

    #[test]
    fn test_document_type_takes_module_id() {
        let export = ModuleExport::from_document(
            "acme/order",
            &json!({"kind": "type", "spec": {"props": ["a"]}}),
        )
        .unwrap();
        match export {
            ModuleExport::Type(spec) => assert_eq!(spec.id.as_deref(), Some("acme/order")),
            ModuleExport::Instance(_) => panic!("expected a type export"),
        }
    }

    #[test]
    fn test_document_errors() {
        assert!(ModuleExport::from_document("x", &json!({"spec": {}})).is_err());
        assert!(ModuleExport::from_document("x", &json!({"kind": "widget", "spec": {}})).is_err());
    }
}
