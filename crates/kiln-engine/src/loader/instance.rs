//! Instance resolution and ranked discovery
//!
//! Instance references come in three shapes:
//!
//! - `{"$instance": {"id": ...}}` or `{"$instance": {"type": ..., "isRequired": ...}}`:
//!   a registered instance by id, or the best-ranked match for a type
//! - `{"_": typeRef, ...fields}`: an inline-typed specification
//! - a bare primitive, defaulted to `string`, `number` or `boolean`
//!
//! Anything else needs a base type to construct against.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use super::deps::Dependencies;
use super::{module_error, InstanceRegistration, Loader, ResolvingGuard};
use crate::class::{Type, TypeKind};
use crate::error::{KilnError, KilnResult};
use crate::list::ListValue;
use crate::module::ModuleExport;
use crate::spec::TypeRef;
use crate::value::{ComplexValue, Primitive, SimpleValue, Value};

/// Predicate applied to ranked candidates
pub type InstanceFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Ranked instance search
#[derive(Clone)]
pub struct InstanceQuery {
    /// Type the instance must be of
    pub type_ref: TypeRef,
    /// Fail instead of returning `None` when nothing matches
    pub is_required: bool,
    /// Extra predicate
    pub filter: Option<InstanceFilter>,
}

impl InstanceQuery {
    /// Optional search for an instance of `type_ref`
    pub fn new(type_ref: impl Into<TypeRef>) -> Self {
        Self {
            type_ref: type_ref.into(),
            is_required: false,
            filter: None,
        }
    }

    /// Fail when nothing matches
    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    /// Only accept candidates passing `filter`
    pub fn with_filter(mut self, filter: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    fn from_map(map: &Map<String, Json>) -> KilnResult<Self> {
        let type_ref = match map.get("type") {
            None | Some(Json::Null) => return Err(KilnError::required("type")),
            Some(json) => TypeRef::classify(json)?,
        };
        let is_required = match map.get("isRequired") {
            None | Some(Json::Null) => false,
            Some(Json::Bool(b)) => *b,
            Some(other) => {
                return Err(KilnError::invalid(
                    "isRequired",
                    format!("expected a boolean, got {}", other),
                ))
            }
        };
        Ok(Self {
            type_ref,
            is_required,
            filter: None,
        })
    }

    fn accepts(&self, value: &Value) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(value))
    }
}

impl fmt::Debug for InstanceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceQuery")
            .field("type_ref", &self.type_ref)
            .field("is_required", &self.is_required)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl Loader {
    /// Resolve an instance reference synchronously.
    ///
    /// `base`, when given, is the type the result must conform to; it also
    /// types untyped objects and arrays. `null` yields `None`.
    pub fn get_instance(&self, inst_ref: &Json, base: Option<&Type>) -> KilnResult<Option<Value>> {
        match inst_ref {
            Json::Null => Ok(None),
            Json::Object(map) if map.contains_key("$instance") => {
                let value = self.special_instance(&map["$instance"])?;
                if let (Some(value), Some(base)) = (&value, base) {
                    check_conforms(value.value_type(), base)?;
                }
                Ok(value)
            }
            Json::Object(map) if map.contains_key("_") => {
                let ty = self.resolve_json(&map["_"])?;
                if let Some(base) = base {
                    check_conforms(&ty, base)?;
                }
                let fields: Map<String, Json> = map
                    .iter()
                    .filter(|(key, _)| key.as_str() != "_")
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                self.create(&ty, &Json::Object(fields)).map(Some)
            }
            Json::Bool(_) | Json::Number(_) | Json::String(_) => {
                let ty = self.primitive_type(inst_ref, base)?;
                self.create(&ty, inst_ref).map(Some)
            }
            other => match base {
                Some(base) => self.create(base, other).map(Some),
                None => Err(KilnError::invalid(
                    "instRef",
                    format!("untyped instance specification {} needs a base type", other),
                )),
            },
        }
    }

    /// Resolve an instance reference, loading missing modules first.
    ///
    /// Ranked searches wait for every candidate to load; candidates that
    /// fail to load are treated as absent.
    pub async fn get_instance_async(
        &self,
        inst_ref: &Json,
        base: Option<&Type>,
    ) -> KilnResult<Option<Value>> {
        let mut deps = Dependencies::default();
        deps.of_instance(self, inst_ref);
        self.load_dependencies(deps, true).await?;

        let mut queries = Vec::new();
        collect_queries(inst_ref, &mut queries);
        for type_ref in queries {
            let ty = self.resolve_async(&type_ref).await?;
            self.load_candidates(&ty).await;
        }

        self.get_instance(inst_ref, base)
    }

    /// Construct a value of `ty` from an instance specification
    pub fn create(&self, ty: &Type, spec: &Json) -> KilnResult<Value> {
        if ty.is_abstract() {
            return Err(KilnError::operation(
                "create",
                format!("type '{}' is abstract", ty),
            ));
        }

        match ty.kind() {
            TypeKind::Simple => self.create_simple(ty, spec),
            TypeKind::Complex => self.create_complex(ty, spec),
            TypeKind::List => {
                let items = spec.as_array().ok_or_else(|| {
                    KilnError::invalid(
                        "instRef",
                        format!("list type '{}' expects an array, got {}", ty, spec),
                    )
                })?;
                let list = ListValue::new(ty.clone());
                list.add(self.create_elements(items, ty.element_type().as_ref())?)?;
                Ok(Value::List(list))
            }
            TypeKind::Value | TypeKind::Element => Err(KilnError::operation(
                "create",
                format!("type '{}' has no instance representation", ty),
            )),
        }
    }

    fn create_simple(&self, ty: &Type, spec: &Json) -> KilnResult<Value> {
        let kind = ty.primitive().ok_or_else(|| {
            KilnError::operation("create", format!("simple type '{}' has no primitive", ty))
        })?;

        let (raw, formatted) = match spec {
            Json::Object(map) => {
                let formatted = match map.get("f") {
                    None | Some(Json::Null) => None,
                    Some(Json::String(f)) => Some(f.clone()),
                    Some(other) => {
                        return Err(KilnError::invalid(
                            "f",
                            format!("formatted text must be a string, got {}", other),
                        ))
                    }
                };
                (map.get("v").unwrap_or(&Json::Null), formatted)
            }
            other => (other, None),
        };

        match Primitive::from_json(raw) {
            Some(primitive) if primitive.kind() == kind => Ok(Value::Simple(SimpleValue::new(
                ty.clone(),
                primitive,
                formatted,
            ))),
            _ => Err(KilnError::invalid(
                "instRef",
                format!("type '{}' expects a {} value, got {}", ty, kind, raw),
            )),
        }
    }

    fn create_complex(&self, ty: &Type, spec: &Json) -> KilnResult<Value> {
        let fields = spec.as_object().ok_or_else(|| {
            KilnError::invalid(
                "instRef",
                format!("complex type '{}' expects an object, got {}", ty, spec),
            )
        })?;

        let value = ComplexValue::new(ty.clone());
        for (name, field) in fields {
            if name == "_" {
                continue;
            }
            let property = ty.property(name).ok_or_else(|| {
                KilnError::invalid(name, format!("type '{}' has no property '{}'", ty, name))
            })?;

            if property.is_list() {
                let items: &[Json] = match field {
                    Json::Array(items) => items,
                    Json::Null => &[],
                    other => {
                        return Err(KilnError::invalid(
                            name,
                            format!("list property '{}' expects an array, got {}", name, other),
                        ))
                    }
                };
                let elements = self.create_elements(items, property.element_type().as_ref())?;
                value.list(name)?.add(elements)?;
            } else {
                let field_value = self.get_instance(field, Some(property.value_type()))?;
                value.set(name, field_value)?;
            }
        }
        Ok(Value::Complex(value))
    }

    fn create_elements(&self, items: &[Json], element: Option<&Type>) -> KilnResult<Vec<Value>> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            if let Some(value) = self.get_instance(item, element)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn primitive_type(&self, json: &Json, base: Option<&Type>) -> KilnResult<Type> {
        let kind = Primitive::from_json(json)
            .map(|p| p.kind())
            .ok_or_else(|| KilnError::invalid("instRef", format!("{} is not a primitive", json)))?;
        let default = self.builtins.for_primitive(kind);

        match base {
            None => Ok(default.clone()),
            Some(base) if base.primitive() == Some(kind) && !base.is_abstract() => Ok(base.clone()),
            Some(base) if default.is_subtype_of(base) => Ok(default.clone()),
            Some(base) => Err(KilnError::invalid(
                "instRef",
                format!("{} value {} is not compatible with type '{}'", kind, json, base),
            )),
        }
    }

    fn special_instance(&self, special: &Json) -> KilnResult<Option<Value>> {
        let map = special.as_object().ok_or_else(|| {
            KilnError::invalid("$instance", format!("expected an object, got {}", special))
        })?;

        if let Some(id) = map.get("id") {
            let id = id.as_str().ok_or_else(|| {
                KilnError::invalid("id", format!("expected a string, got {}", id))
            })?;
            return self.instance_by_id(id).map(Some);
        }
        self.find_instance(&InstanceQuery::from_map(map)?)
    }

    /// Load an instance module by id (cached)
    pub fn instance_by_id(&self, id: &str) -> KilnResult<Value> {
        if id.is_empty() {
            return Err(KilnError::required("id"));
        }
        let id = self.translate(id);
        if let Some(value) = self.loaded_instances.get(id) {
            return Ok(value.value().clone());
        }

        let _guard = ResolvingGuard::enter(&format!("instance {}", id), "instRef")?;
        let spec = match self
            .modules
            .require_sync(id)
            .map_err(|err| module_error("instRef", err))?
        {
            ModuleExport::Instance(spec) => spec,
            ModuleExport::Type(_) => {
                return Err(KilnError::invalid(
                    "instRef",
                    format!("module '{}' exports a type, not an instance", id),
                ))
            }
        };

        let base = match self.registered_type_id(id) {
            Some(type_id) => Some(self.resolve_id(&type_id)?),
            None => None,
        };
        let value = self.get_instance(&spec, base.as_ref())?.ok_or_else(|| {
            KilnError::invalid("instRef", format!("module '{}' exports a null instance", id))
        })?;

        debug!(instance = id, ty = %value.value_type(), "loaded instance");
        Ok(self
            .loaded_instances
            .entry(id.to_string())
            .or_insert(value)
            .value()
            .clone())
    }

    /// Best-ranked registered instance matching the query
    pub fn find_instance(&self, query: &InstanceQuery) -> KilnResult<Option<Value>> {
        let ty = self.resolve(&query.type_ref)?;
        self.find_ranked(&ty, query)
    }

    /// Ranked search that first loads every candidate
    pub async fn find_instance_async(&self, query: &InstanceQuery) -> KilnResult<Option<Value>> {
        let ty = self.resolve_async(&query.type_ref).await?;
        self.load_candidates(&ty).await;
        self.find_ranked(&ty, query)
    }

    fn find_ranked(&self, ty: &Type, query: &InstanceQuery) -> KilnResult<Option<Value>> {
        let mut last_error = None;
        for registration in self.registrations_of(ty) {
            match self.instance_by_id(&registration.id) {
                Ok(value) if !value.value_type().is_subtype_of(ty) => {
                    warn!(
                        instance = %registration.id,
                        declared = %registration.type_id,
                        actual = %value.value_type(),
                        "registered instance does not match its declared type"
                    );
                }
                Ok(value) if query.accepts(&value) => {
                    debug!(instance = %registration.id, ty = %ty, "found ranked instance");
                    return Ok(Some(value));
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(instance = %registration.id, %err, "skipping unloadable instance");
                    last_error = Some(err);
                }
            }
        }

        if !query.is_required {
            return Ok(None);
        }
        Err(match last_error {
            Some(err) => KilnError::operation(
                "getInstance",
                format!("no instance of type '{}' could be loaded: {}", ty, err),
            ),
            None => KilnError::operation(
                "getInstance",
                format!("no instance of type '{}' is available", ty),
            ),
        })
    }

    /// Load the types of every registration bucket and the candidate
    /// instances of `ty`; failures are logged and skipped.
    async fn load_candidates(&self, ty: &Type) {
        let type_ids = self.instances.read().type_ids();

        let mut deps = Dependencies::default();
        for type_id in &type_ids {
            deps.push(self, type_id);
        }
        // Non-strict loading never fails
        let _ = self.load_dependencies(deps, false).await;

        let mut deps = Dependencies::default();
        for registration in self.registrations_of(ty) {
            deps.push(self, &registration.id);
        }
        let _ = self.load_dependencies(deps, false).await;
    }

    /// Register a known instance after construction
    pub fn register_instance(
        &self,
        id: &str,
        type_id: &str,
        ranking: f64,
    ) -> KilnResult<InstanceRegistration> {
        if id.is_empty() {
            return Err(KilnError::required("id"));
        }
        if type_id.is_empty() {
            return Err(KilnError::required("typeId"));
        }
        if !ranking.is_finite() {
            return Err(KilnError::invalid("ranking", "ranking must be finite"));
        }
        let registration = self.instances.write().register(id, type_id, ranking);
        debug!(instance = id, ty = type_id, ranking, "registered instance");
        Ok(registration)
    }

    /// Registrations of `ty` and its known subtypes, best first.
    ///
    /// Bucket types that are not cached yet are resolved first; a bucket
    /// whose type cannot be loaded is logged and left out.
    pub fn registrations_of(&self, ty: &Type) -> Vec<InstanceRegistration> {
        let type_ids = self.instances.read().type_ids();
        let matching: Vec<String> = type_ids
            .into_iter()
            .filter(|type_id| {
                if Some(self.translate(type_id)) == ty.id() {
                    return true;
                }
                match self.resolve_id(type_id) {
                    Ok(bucket) => bucket.is_subtype_of(ty),
                    Err(err) => {
                        warn!(ty = %type_id, %err, "skipping unloadable registration type");
                        false
                    }
                }
            })
            .collect();
        self.instances.read().ranked(&matching)
    }

    /// Declared type id of a registered instance
    pub fn registered_type_id(&self, id: &str) -> Option<String> {
        self.instances.read().find(self.translate(id)).map(|r| r.type_id.clone())
    }
}

fn check_conforms(ty: &Type, base: &Type) -> KilnResult<()> {
    if ty.is_subtype_of(base) {
        Ok(())
    } else {
        Err(KilnError::invalid(
            "instRef",
            format!("instance type '{}' does not conform to '{}'", ty, base),
        ))
    }
}

/// Type references of every ranked query nested in an instance spec
fn collect_queries(json: &Json, out: &mut Vec<TypeRef>) {
    match json {
        Json::Object(map) => {
            if let Some(special) = map.get("$instance") {
                if let Some(type_ref) = special.get("type").and_then(|t| TypeRef::classify(t).ok()) {
                    out.push(type_ref);
                }
                return;
            }
            for value in map.values() {
                collect_queries(value, out);
            }
        }
        Json::Array(items) => {
            for item in items {
                collect_queries(item, out);
            }
        }
        _ => {}
    }
}
