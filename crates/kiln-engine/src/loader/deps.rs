//! Dependency collection for asynchronous resolution
//!
//! Walks a type reference, type specification or instance specification and
//! collects the module ids it needs that are not available yet. Temporary
//! ids, builtin ids and ids already in the type cache are skipped.

use serde_json::Value as Json;

use super::Loader;
use crate::property::PropsSpec;
use crate::spec::{TypeRef, TypeSpec};

/// Ordered, de-duplicated list of module ids
#[derive(Debug, Default)]
pub(crate) struct Dependencies {
    ids: Vec<String>,
}

impl Dependencies {
    /// Add a module id unless it is already available
    pub fn push(&mut self, loader: &Loader, id: &str) {
        if let Some(id) = loader.pending_id(id) {
            if !self.ids.contains(&id) {
                self.ids.push(id);
            }
        }
    }

    /// Dependencies of a type reference
    pub fn of_type_ref(&mut self, loader: &Loader, type_ref: &TypeRef) {
        match type_ref {
            TypeRef::Id(id) => self.push(loader, id),
            TypeRef::Type(_) => {}
            TypeRef::List(element) => self.of_type_ref(loader, element),
            TypeRef::Spec(spec) => self.of_spec(loader, spec),
        }
    }

    /// Dependencies of a type specification
    pub fn of_spec(&mut self, loader: &Loader, spec: &TypeSpec) {
        for type_ref in spec.base.iter().chain(&spec.of).chain(&spec.mixins) {
            self.of_type_ref(loader, type_ref);
        }

        let props = match &spec.props {
            Some(PropsSpec::List(specs)) => specs.iter().collect::<Vec<_>>(),
            Some(PropsSpec::Map(entries)) => entries.iter().map(|(_, s)| s).collect(),
            None => Vec::new(),
        };
        for prop in props {
            if let Some(value_type) = &prop.value_type {
                self.of_type_ref(loader, value_type);
            }
        }
    }

    /// Dependencies of an instance specification.
    ///
    /// Unparseable type references are skipped; the synchronous pass reports
    /// them.
    pub fn of_instance(&mut self, loader: &Loader, json: &Json) {
        match json {
            Json::Object(map) => {
                if let Some(special) = map.get("$instance") {
                    if let Some(id) = special.get("id").and_then(Json::as_str) {
                        self.push(loader, id);
                        if let Some(type_id) = loader.registered_type_id(id) {
                            self.push(loader, &type_id);
                        }
                    }
                    if let Some(type_ref) = special.get("type").and_then(|t| TypeRef::classify(t).ok()) {
                        self.of_type_ref(loader, &type_ref);
                    }
                    return;
                }
                for (key, value) in map {
                    if key == "_" {
                        if let Ok(type_ref) = TypeRef::classify(value) {
                            self.of_type_ref(loader, &type_ref);
                        }
                    } else {
                        self.of_instance(loader, value);
                    }
                }
            }
            Json::Array(items) => {
                for item in items {
                    self.of_instance(loader, item);
                }
            }
            _ => {}
        }
    }

    /// Whether nothing is missing
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Collected ids, in discovery order
    pub fn into_ids(self) -> Vec<String> {
        self.ids
    }
}
