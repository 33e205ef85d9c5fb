//! Type loader
//!
//! Resolves type references to types, building and caching them on first
//! use. Resolution is one synchronous algorithm; the asynchronous entry
//! points first collect every module the reference needs, request them all
//! at once, wait for all of them, and then run the synchronous algorithm.
//!
//! ```text
//! reference ──classify──▶ Id ──────▶ alias ─▶ temporary? ─▶ context
//!                        │                    cached?    ─▶ cache
//!                        │                    otherwise  ─▶ module provider
//!                        ├─▶ Type ───▶ must derive from this loader's roots
//!                        ├─▶ List ───▶ {base: list, of: element}
//!                        └─▶ Spec ───▶ extend base, configure, freeze
//! ```
//!
//! Temporary ids (`_:N`) are bound in the specification context of the root
//! specification being resolved, see [`crate::context`].

mod config;
mod deps;
mod instance;
mod ranking;

pub use config::{InstanceInfo, LoaderConfig};
pub use instance::{InstanceFilter, InstanceQuery};
pub use ranking::InstanceRegistration;

use std::cell::RefCell;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::builtin::Builtins;
use crate::class::{ClassDef, Type, TypeUid};
use crate::context::{is_temporary_id, SpecificationContext, SpecificationScope};
use crate::error::{KilnError, KilnResult};
use crate::module::{ModuleError, ModuleExport, ModuleProvider};
use crate::property::{PropsSpec, TypeResolver};
use crate::spec::{TypeRef, TypeSpec};
use crate::value::Value;

use deps::Dependencies;
use ranking::InstanceIndex;

thread_local! {
    // Module ids whose construction is in progress on this thread
    static RESOLVING: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Entry on this thread's resolving stack, popped on drop
struct ResolvingGuard {
    key: String,
}

impl ResolvingGuard {
    fn enter(key: &str, subject: &str) -> KilnResult<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|k| k == key) {
                let mut chain = stack.clone();
                chain.push(key.to_string());
                return Err(KilnError::invalid(
                    subject,
                    format!("circular reference: {}", chain.join(" -> ")),
                ));
            }
            stack.push(key.to_string());
            Ok(ResolvingGuard {
                key: key.to_string(),
            })
        })
    }
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(popped.as_deref(), Some(self.key.as_str()));
        });
    }
}

fn module_error(name: &str, err: ModuleError) -> KilnError {
    KilnError::invalid(name, err.to_string())
}

/// Resolves type and instance references against a module provider
pub struct Loader {
    modules: Arc<dyn ModuleProvider>,
    aliases: FxHashMap<String, String>,
    builtins: Builtins,
    types: DashMap<String, Type>,
    list_types: DashMap<(TypeUid, TypeUid), Type>,
    instances: RwLock<InstanceIndex>,
    loaded_instances: DashMap<String, Value>,
}

impl Loader {
    /// Create a loader; the configuration is consumed once
    pub fn new(modules: Arc<dyn ModuleProvider>, config: LoaderConfig) -> KilnResult<Self> {
        config.validate()?;
        let builtins = Builtins::new()?;

        let types = DashMap::new();
        for ty in builtins.all() {
            if let Some(id) = ty.id() {
                types.insert(id.to_string(), ty.clone());
            }
        }

        let mut index = InstanceIndex::default();
        for (id, info) in &config.instances {
            index.register(id, &info.type_id, info.ranking);
        }

        debug!(
            aliases = config.aliases.len(),
            instances = index.len(),
            "created loader"
        );

        Ok(Self {
            modules,
            aliases: config.aliases.into_iter().collect(),
            builtins,
            types,
            list_types: DashMap::new(),
            instances: RwLock::new(index),
            loaded_instances: DashMap::new(),
        })
    }

    /// Create a loader with no aliases or known instances
    pub fn with_modules(modules: impl ModuleProvider + 'static) -> KilnResult<Self> {
        Self::new(Arc::new(modules), LoaderConfig::default())
    }

    /// Builtin roots of this loader
    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// Apply alias translation
    pub fn translate<'a>(&'a self, id: &'a str) -> &'a str {
        self.aliases.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Cached type by (translated) permanent id
    pub fn cached(&self, id: &str) -> Option<Type> {
        self.types.get(self.translate(id)).map(|t| t.value().clone())
    }

    /// Translated module id if it still has to be loaded
    pub(crate) fn pending_id(&self, id: &str) -> Option<String> {
        if id.is_empty() || is_temporary_id(id) {
            return None;
        }
        let id = self.translate(id);
        if self.types.contains_key(id) || self.loaded_instances.contains_key(id) {
            return None;
        }
        Some(id.to_string())
    }

    /// Resolve a type reference synchronously
    pub fn resolve(&self, type_ref: &TypeRef) -> KilnResult<Type> {
        match type_ref {
            TypeRef::Id(id) => self.resolve_id(id),
            TypeRef::Type(ty) => self.adopt(ty),
            TypeRef::List(element) => self.resolve_spec(&TypeSpec::list_of((**element).clone())),
            TypeRef::Spec(spec) => self.resolve_spec(spec),
        }
    }

    /// Classify and resolve a JSON type reference synchronously
    pub fn resolve_json(&self, json: &Json) -> KilnResult<Type> {
        self.resolve(&TypeRef::classify(json)?)
    }

    /// Resolve an identifier synchronously.
    ///
    /// Fails unless the module is already available to the provider.
    pub fn resolve_id(&self, id: &str) -> KilnResult<Type> {
        if id.is_empty() {
            return Err(KilnError::required("typeRef"));
        }
        let id = self.translate(id);
        if is_temporary_id(id) {
            return SpecificationContext::lookup(id);
        }
        if let Some(ty) = self.types.get(id) {
            return Ok(ty.value().clone());
        }

        let _guard = ResolvingGuard::enter(id, "typeRef")?;
        let export = self
            .modules
            .require_sync(id)
            .map_err(|err| module_error("typeRef", err))?;

        match export {
            ModuleExport::Type(mut spec) => {
                spec.id = Some(id.to_string());
                debug!(id, "building type module");
                self.build(&spec, SpecificationScope::enter_new())
            }
            ModuleExport::Instance(_) => Err(KilnError::invalid(
                "typeRef",
                format!("module '{}' exports an instance, not a type", id),
            )),
        }
    }

    /// Resolve a generic object specification synchronously.
    ///
    /// Nested specifications share the active specification context; a root
    /// call opens one.
    pub fn resolve_spec(&self, spec: &TypeSpec) -> KilnResult<Type> {
        self.build(spec, SpecificationScope::enter())
    }

    fn build(&self, spec: &TypeSpec, scope: SpecificationScope) -> KilnResult<Type> {
        if let Some(id) = &spec.id {
            if let Some(existing) = self.declared(&scope, id) {
                debug!(id = %id, "specification already declared");
                return Ok(existing);
            }
        }

        let base = match &spec.base {
            Some(base) => self.resolve(base)?,
            None => self.builtins.complex.clone(),
        };
        let element = match &spec.of {
            Some(of) => Some(self.resolve_element(&base, of)?),
            None => None,
        };
        if let (true, Some(element)) = (spec.is_list_shorthand(), &element) {
            return self.list_type(&base, element);
        }
        let mixins = spec
            .mixins
            .iter()
            .map(|m| self.resolve(m))
            .collect::<KilnResult<Vec<_>>>()?;

        let permanent_id = spec.id.clone().filter(|id| !is_temporary_id(id));
        let ty = base.extend(ClassDef {
            id: permanent_id.clone(),
            is_abstract: spec.is_abstract,
            members: spec.members.clone(),
            statics: spec.statics.clone(),
            mixins,
        })?;

        // Bound before configuration so properties can refer back to it
        if let Some(temp_id) = spec.id.as_deref().filter(|id| is_temporary_id(id)) {
            if !scope.context().bind(temp_id, ty.clone()) {
                return SpecificationContext::lookup(temp_id);
            }
        }

        self.configure_new(&ty, spec, element)?;
        ty.freeze();

        let ty = match permanent_id {
            Some(id) => self.types.entry(id).or_insert(ty).value().clone(),
            None => ty,
        };
        debug!(ty = %ty, base = %base, properties = ty.property_count(), "resolved specification");
        Ok(ty)
    }

    fn declared(&self, scope: &SpecificationScope, id: &str) -> Option<Type> {
        if is_temporary_id(id) {
            scope.context().get(id)
        } else {
            self.types.get(id).map(|t| t.value().clone())
        }
    }

    fn adopt(&self, ty: &Type) -> KilnResult<Type> {
        if ty.is_subtype_of(&self.builtins.value) {
            Ok(ty.clone())
        } else {
            Err(KilnError::invalid(
                "typeRef",
                format!("type '{}' does not derive from this loader's 'value' type", ty),
            ))
        }
    }

    fn resolve_element(&self, base: &Type, of: &TypeRef) -> KilnResult<Type> {
        if !base.is_list() {
            return Err(KilnError::invalid(
                "of",
                format!("'of' requires a list base type; '{}' is not a list type", base),
            ));
        }
        let element = self.resolve(of)?;
        if !element.is_subtype_of(&self.builtins.element) {
            return Err(KilnError::invalid(
                "of",
                format!("element type '{}' must derive from 'element'", element),
            ));
        }
        Ok(element)
    }

    /// Anonymous list type of `element`, one per (base, element) pair
    fn list_type(&self, base: &Type, element: &Type) -> KilnResult<Type> {
        let key = (base.uid(), element.uid());
        if let Some(ty) = self.list_types.get(&key) {
            return Ok(ty.value().clone());
        }
        let ty = base.extend(ClassDef::default())?;
        ty.set_element_type(element.clone())?;
        ty.freeze();
        Ok(self.list_types.entry(key).or_insert(ty).value().clone())
    }

    fn configure_new(&self, ty: &Type, spec: &TypeSpec, element: Option<Type>) -> KilnResult<()> {
        ty.configure_attrs(spec.attrs.clone());
        if !spec.config.is_empty() {
            ty.configure_entries(spec.config.clone());
        }
        if let Some(element) = element {
            ty.set_element_type(element)?;
        }
        if let Some(props) = &spec.props {
            self.configure_props(ty, props.clone())?;
        }
        Ok(())
    }

    fn configure_props(&self, ty: &Type, props: PropsSpec) -> KilnResult<()> {
        if !ty.is_complex() {
            return Err(KilnError::invalid(
                "props",
                format!("type '{}' is not a complex type and cannot declare properties", ty),
            ));
        }
        let mut collection = ty.props_snapshot();
        collection.configure(props, ty, self)?;
        ty.replace_props(collection);
        Ok(())
    }

    /// Reconfigure value-level attributes of a resolved type.
    ///
    /// Labels, descriptions, configuration entries and attributes of
    /// properties the type owns may change; structure may not.
    pub fn configure_type(&self, ty: &Type, spec: &TypeSpec) -> KilnResult<()> {
        if spec.base.is_some()
            || spec.of.is_some()
            || !spec.mixins.is_empty()
            || !spec.members.is_empty()
            || !spec.statics.is_empty()
        {
            return Err(KilnError::operation(
                "configure",
                format!("structure of type '{}' is fixed once resolved", ty),
            ));
        }
        ty.configure_attrs(spec.attrs.clone());
        if !spec.config.is_empty() {
            ty.configure_entries(spec.config.clone());
        }
        if let Some(props) = &spec.props {
            self.configure_props(ty, props.clone())?;
        }
        Ok(())
    }

    /// Resolve a type reference, loading missing modules first
    pub async fn resolve_async(&self, type_ref: &TypeRef) -> KilnResult<Type> {
        let mut deps = Dependencies::default();
        deps.of_type_ref(self, type_ref);
        self.load_dependencies(deps, true).await?;
        self.resolve(type_ref)
    }

    /// Classify and resolve a JSON type reference, loading missing modules first
    pub async fn resolve_json_async(&self, json: &Json) -> KilnResult<Type> {
        let type_ref = TypeRef::classify(json)?;
        self.resolve_async(&type_ref).await
    }

    /// Request every dependency, and those of the fetched modules, in rounds.
    ///
    /// Each round issues all of its requests before awaiting any. With
    /// `strict` unset, failed modules are logged and skipped.
    async fn load_dependencies(&self, deps: Dependencies, strict: bool) -> KilnResult<()> {
        let mut requested = FxHashSet::default();
        let mut pending = deps.into_ids();

        while !pending.is_empty() {
            let round: Vec<String> = pending
                .drain(..)
                .filter(|id| requested.insert(id.clone()))
                .collect();
            if round.is_empty() {
                break;
            }

            debug!(count = round.len(), modules = ?round, "requesting modules");
            let results = join_all(round.iter().map(|id| self.modules.require_async(id))).await;

            let mut next = Dependencies::default();
            let mut failure = None;
            for (id, result) in round.iter().zip(results) {
                match result {
                    Ok(ModuleExport::Type(spec)) => next.of_spec(self, &spec),
                    Ok(ModuleExport::Instance(json)) => next.of_instance(self, &json),
                    Err(err) if strict => {
                        failure.get_or_insert(err);
                    }
                    Err(err) => warn!(module = %id, %err, "module unavailable"),
                }
            }
            if let Some(err) = failure {
                return Err(module_error("typeRef", err));
            }
            pending = next.into_ids();
        }
        Ok(())
    }
}

impl TypeResolver for Loader {
    fn resolve_type(&self, type_ref: &TypeRef) -> KilnResult<Type> {
        self.resolve(type_ref)
    }

    fn default_value_type(&self) -> Type {
        self.builtins.value.clone()
    }
}
