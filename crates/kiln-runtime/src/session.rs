//! Resolution session over a module directory.
//!
//! A session owns one [`Loader`] built from a [`KilnConfig`] and a
//! [`DirectoryModules`] provider, and offers the sync/async entry points the
//! command line needs.
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_runtime::Session;
//!
//! let session = Session::with_root("modules")?;
//! let ty = futures::executor::block_on(session.resolve_async("acme/theme"))?;
//! println!("{}", session.describe(&ty).label);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_engine::{InstanceQuery, InstanceRegistration, Loader, Type, TypeKind, Value};
use serde::Serialize;
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::config::KilnConfig;
use crate::error::RuntimeError;
use crate::modules::DirectoryModules;

/// A loader bound to a module directory
pub struct Session {
    loader: Loader,
    modules: DirectoryModules,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.modules.root())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a session; preloads the configured modules
    pub fn from_config(config: KilnConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let modules = DirectoryModules::new(&config.modules.root);
        for id in &config.modules.preload {
            modules
                .preload(id)
                .map_err(|err| RuntimeError::Config(err.to_string()))?;
        }
        let loader = Loader::new(Arc::new(modules.clone()), config.loader)?;
        debug!(root = %modules.root().display(), "opened session");
        Ok(Self { loader, modules })
    }

    /// Build a session from a configuration file
    pub fn open(config_path: &Path) -> Result<Self, RuntimeError> {
        Self::from_config(KilnConfig::from_file(config_path)?)
    }

    /// Build a session over `root` with no aliases or known instances
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self, RuntimeError> {
        let mut config = KilnConfig::default();
        config.modules.root = root.into();
        Self::from_config(config)
    }

    /// Underlying loader
    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// Module provider
    pub fn modules(&self) -> &DirectoryModules {
        &self.modules
    }

    /// Resolve a type reference written on the command line.
    ///
    /// Text starting with `{`, `[` or `"` is parsed as JSON; anything else
    /// is an id.
    pub fn resolve(&self, reference: &str) -> Result<Type, RuntimeError> {
        Ok(self.loader.resolve_json(&parse_reference(reference)?)?)
    }

    /// Like [`Session::resolve`], loading modules from disk first
    pub async fn resolve_async(&self, reference: &str) -> Result<Type, RuntimeError> {
        Ok(self
            .loader
            .resolve_json_async(&parse_reference(reference)?)
            .await?)
    }

    /// Best-ranked instance of a type
    pub fn best_instance(&self, type_ref: &str, required: bool) -> Result<Option<Value>, RuntimeError> {
        Ok(self.loader.find_instance(&query(type_ref, required)?)?)
    }

    /// Like [`Session::best_instance`], loading every candidate first
    pub async fn best_instance_async(
        &self,
        type_ref: &str,
        required: bool,
    ) -> Result<Option<Value>, RuntimeError> {
        Ok(self
            .loader
            .find_instance_async(&query(type_ref, required)?)
            .await?)
    }

    /// Registrations of a type and its known subtypes, best first.
    ///
    /// Registration types that are not resolvable yet are skipped.
    pub fn registrations(&self, ty: &Type) -> Vec<InstanceRegistration> {
        self.loader.registrations_of(ty)
    }

    /// Like [`Session::registrations`], loading every registration type first
    pub async fn registrations_async(&self, ty: &Type) -> Vec<InstanceRegistration> {
        // An optional ranked search loads all candidate types
        if let Err(err) = self
            .loader
            .find_instance_async(&InstanceQuery::new(ty.clone()))
            .await
        {
            warn!(ty = %ty, %err, "ranked search failed");
        }
        self.loader.registrations_of(ty)
    }

    /// Serializable summary of a type
    pub fn describe(&self, ty: &Type) -> TypeSummary {
        TypeSummary::of(ty)
    }
}

fn parse_reference(reference: &str) -> Result<Json, RuntimeError> {
    let trimmed = reference.trim();
    if trimmed.starts_with(['{', '[', '"']) {
        Ok(serde_json::from_str(trimmed)?)
    } else {
        Ok(Json::String(trimmed.to_string()))
    }
}

fn query(type_ref: &str, required: bool) -> Result<InstanceQuery, RuntimeError> {
    let json = parse_reference(type_ref)?;
    let mut query = InstanceQuery::new(kiln_engine::TypeRef::classify(&json)?);
    query.is_required = required;
    Ok(query)
}

/// Printable description of a resolved type
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSummary {
    /// Id or synthetic name
    pub name: String,
    /// Display label
    pub label: Option<String>,
    /// Structural family
    pub kind: &'static str,
    /// Abstract flag
    pub is_abstract: bool,
    /// Ancestor names, nearest first
    pub ancestors: Vec<String>,
    /// Element type of a list type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    /// Declared and inherited properties
    pub properties: Vec<PropertySummary>,
}

/// Printable description of one property
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySummary {
    /// Property name
    pub name: String,
    /// Display label
    pub label: String,
    /// Value type name; the element type for list properties
    pub value_type: String,
    /// List-valued
    pub is_list: bool,
    /// Minimum number of values
    pub count_min: u32,
    /// Maximum number of values, `None` for unbounded
    pub count_max: Option<u32>,
}

impl TypeSummary {
    /// Summarize `ty`
    pub fn of(ty: &Type) -> Self {
        Self {
            name: ty.name(),
            label: ty.label(),
            kind: kind_name(ty.kind()),
            is_abstract: ty.is_abstract(),
            ancestors: ty.lineage().skip(1).map(|t| t.name()).collect(),
            element: ty.element_type().map(|t| t.name()),
            properties: ty
                .properties()
                .iter()
                .map(|p| PropertySummary {
                    name: p.name().to_string(),
                    label: p.label(),
                    value_type: p
                        .element_type()
                        .map_or_else(|| p.value_type().name(), |element| element.name()),
                    is_list: p.is_list(),
                    count_min: p.count_min(),
                    count_max: p.count_max(),
                })
                .collect(),
        }
    }
}

fn kind_name(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::Value => "value",
        TypeKind::Element => "element",
        TypeKind::Simple => "simple",
        TypeKind::Complex => "complex",
        TypeKind::List => "list",
    }
}
