//! Runtime values
//!
//! Instances produced by the loader. Values are identity-bearing handles:
//! cloning a [`Value`] shares the instance, and [`Value::same`] compares by
//! identity. Simple values wrap a primitive, complex values hold one slot
//! per property and list values are [`ListValue`]s.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{json, Map, Value as Json};

use crate::class::{Member, PrimitiveKind, Receiver, Type};
use crate::error::{KilnError, KilnResult};
use crate::list::{ListValue, SetOptions};

static NEXT_INSTANCE_UID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn generate_instance_uid() -> u64 {
    NEXT_INSTANCE_UID.fetch_add(1, AtomicOrdering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Walk {
    Spec,
    Validate,
}

thread_local! {
    static VISITING: RefCell<FxHashSet<(Walk, u64)>> = RefCell::new(FxHashSet::default());
}

/// Marks a complex or list value as being walked on this thread.
///
/// Nested walks ([`Value::to_spec`], [`Value::validate`]) enter one guard per
/// value; a value reached again through a cycle yields no guard.
struct VisitGuard {
    key: (Walk, u64),
    active: bool,
}

impl VisitGuard {
    fn enter(walk: Walk, value: &Value) -> Option<Self> {
        let uid = match value {
            Value::Simple(_) => {
                return Some(VisitGuard {
                    key: (walk, 0),
                    active: false,
                })
            }
            Value::Complex(v) => v.uid(),
            Value::List(v) => v.uid(),
        };
        let key = (walk, uid);
        if !VISITING.with(|visiting| visiting.borrow_mut().insert(key)) {
            return None;
        }
        Some(VisitGuard { key, active: true })
    }
}

impl Drop for VisitGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        VISITING.with(|visiting| {
            visiting.borrow_mut().remove(&self.key);
        });
    }
}

/// Primitive payload of a simple value
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Truth value
    Boolean(bool),
    /// Floating point number
    Number(f64),
    /// Text
    String(String),
}

impl Primitive {
    /// Read a JSON primitive
    pub fn from_json(json: &Json) -> Option<Primitive> {
        match json {
            Json::Bool(b) => Some(Primitive::Boolean(*b)),
            Json::Number(n) => n.as_f64().map(Primitive::Number),
            Json::String(s) => Some(Primitive::String(s.clone())),
            _ => None,
        }
    }

    /// Primitive family
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::Boolean(_) => PrimitiveKind::Boolean,
            Primitive::Number(_) => PrimitiveKind::Number,
            Primitive::String(_) => PrimitiveKind::String,
        }
    }

    /// Canonical text, used as the list key
    pub fn key(&self) -> String {
        match self {
            Primitive::Boolean(b) => b.to_string(),
            Primitive::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Primitive::Number(n) => n.to_string(),
            Primitive::String(s) => s.clone(),
        }
    }

    /// JSON form
    pub fn to_json(&self) -> Json {
        match self {
            Primitive::Boolean(b) => json!(b),
            Primitive::Number(n) => json!(n),
            Primitive::String(s) => json!(s),
        }
    }

    /// Order two primitives of the same family
    pub fn compare(&self, other: &Primitive) -> Option<Ordering> {
        match (self, other) {
            (Primitive::Boolean(a), Primitive::Boolean(b)) => Some(a.cmp(b)),
            (Primitive::Number(a), Primitive::Number(b)) => a.partial_cmp(b),
            (Primitive::String(a), Primitive::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

struct SimpleInner {
    ty: Type,
    value: Primitive,
    formatted: RwLock<Option<String>>,
}

/// Instance of a simple type
#[derive(Clone)]
pub struct SimpleValue(Arc<SimpleInner>);

impl SimpleValue {
    pub(crate) fn new(ty: Type, value: Primitive, formatted: Option<String>) -> Self {
        SimpleValue(Arc::new(SimpleInner {
            ty,
            value,
            formatted: RwLock::new(formatted),
        }))
    }

    /// Primitive payload
    pub fn primitive(&self) -> &Primitive {
        &self.0.value
    }

    /// Formatted text, if any
    pub fn formatted(&self) -> Option<String> {
        self.0.formatted.read().clone()
    }

    /// Replace the formatted text
    pub fn set_formatted(&self, formatted: Option<String>) {
        *self.0.formatted.write() = formatted;
    }
}

enum Slot {
    Single(Option<Value>),
    Many(ListValue),
}

struct ComplexInner {
    uid: u64,
    ty: Type,
    slots: RwLock<FxHashMap<String, Slot>>,
}

/// Instance of a complex type: one slot per property
#[derive(Clone)]
pub struct ComplexValue(Arc<ComplexInner>);

impl ComplexValue {
    /// Empty instance; list properties start as empty lists
    pub(crate) fn new(ty: Type) -> Self {
        let slots = ty
            .properties()
            .into_iter()
            .map(|p| {
                let slot = if p.is_list() {
                    Slot::Many(ListValue::new(p.value_type().clone()))
                } else {
                    Slot::Single(None)
                };
                (p.name().to_string(), slot)
            })
            .collect();
        ComplexValue(Arc::new(ComplexInner {
            uid: generate_instance_uid(),
            ty,
            slots: RwLock::new(slots),
        }))
    }

    /// Instance uid
    pub fn uid(&self) -> u64 {
        self.0.uid
    }

    fn unknown(&self, name: &str) -> KilnError {
        KilnError::invalid(
            name,
            format!("type '{}' has no property '{}'", self.0.ty, name),
        )
    }

    /// Value of a property; list properties yield their list
    pub fn get(&self, name: &str) -> KilnResult<Option<Value>> {
        match self.0.slots.read().get(name) {
            Some(Slot::Single(value)) => Ok(value.clone()),
            Some(Slot::Many(list)) => Ok(Some(Value::List(list.clone()))),
            None => Err(self.unknown(name)),
        }
    }

    /// List of a list property
    pub fn list(&self, name: &str) -> KilnResult<ListValue> {
        match self.0.slots.read().get(name) {
            Some(Slot::Many(list)) => Ok(list.clone()),
            Some(Slot::Single(_)) => Err(KilnError::invalid(
                name,
                format!("property '{}' is not a list property", name),
            )),
            None => Err(self.unknown(name)),
        }
    }

    /// Set a property value.
    ///
    /// For list properties the list's contents are reconciled with the given
    /// list (`None` clears it); the list handle itself never changes.
    pub fn set(&self, name: &str, value: Option<Value>) -> KilnResult<()> {
        let property = self.0.ty.property(name).ok_or_else(|| self.unknown(name))?;

        if property.is_list() {
            let list = self.list(name)?;
            return match value {
                None => {
                    list.clear();
                    Ok(())
                }
                Some(Value::List(source)) => {
                    if source.same(&list) {
                        return Ok(());
                    }
                    let elements = source.to_array();
                    if elements.iter().any(|e| e.reaches(self.uid())) {
                        return Err(KilnError::invalid(
                            name,
                            format!("property '{}' would make the instance contain itself", name),
                        ));
                    }
                    list.set(elements, SetOptions::default())
                }
                Some(other) => Err(KilnError::invalid(
                    name,
                    format!("list property '{}' cannot hold a {} value", name, other.value_type()),
                )),
            };
        }

        if let Some(v) = &value {
            if !v.value_type().is_subtype_of(property.value_type()) {
                return Err(KilnError::invalid(
                    name,
                    format!(
                        "value of type '{}' is not assignable to property '{}' of type '{}'",
                        v.value_type(),
                        name,
                        property.value_type()
                    ),
                ));
            }
            if v.reaches(self.uid()) {
                return Err(KilnError::invalid(
                    name,
                    format!("property '{}' would make the instance contain itself", name),
                ));
            }
        }
        self.0
            .slots
            .write()
            .insert(name.to_string(), Slot::Single(value));
        Ok(())
    }

    /// Copy property values from `other`, skipping values that do not fit
    fn copy_from(&self, other: &ComplexValue) {
        if Arc::ptr_eq(&self.0, &other.0) {
            return;
        }
        for property in self.0.ty.properties() {
            let Ok(incoming) = other.get(property.name()) else {
                continue;
            };
            if let Err(err) = self.set(property.name(), incoming) {
                tracing::debug!(property = property.name(), %err, "skipped property during update");
            }
        }
    }
}

/// Runtime value
#[derive(Clone)]
pub enum Value {
    /// Primitive-backed value
    Simple(SimpleValue),
    /// Property-bearing value
    Complex(ComplexValue),
    /// Keyed list
    List(ListValue),
}

impl Value {
    /// Type of the value
    pub fn value_type(&self) -> &Type {
        match self {
            Value::Simple(v) => &v.0.ty,
            Value::Complex(v) => &v.0.ty,
            Value::List(v) => v.list_type(),
        }
    }

    /// Natural key: primitive text for simple values, `#<uid>` otherwise.
    ///
    /// Primitive text starting with `#` gains a second `#`, so `"#7"` keys
    /// as `##7` and never collides with the instance of uid 7.
    pub fn key(&self) -> String {
        match self {
            Value::Simple(v) => {
                let key = v.primitive().key();
                if key.starts_with('#') {
                    format!("#{}", key)
                } else {
                    key
                }
            }
            Value::Complex(v) => format!("#{}", v.uid()),
            Value::List(v) => format!("#{}", v.uid()),
        }
    }

    /// Whether the instance of `uid` is this value or nested inside it
    pub(crate) fn reaches(&self, uid: u64) -> bool {
        let mut seen = FxHashSet::default();
        let mut pending = vec![self.clone()];
        while let Some(value) = pending.pop() {
            let own = match &value {
                Value::Simple(_) => continue,
                Value::Complex(v) => v.uid(),
                Value::List(v) => v.uid(),
            };
            if own == uid {
                return true;
            }
            if !seen.insert(own) {
                continue;
            }
            match &value {
                Value::Complex(v) => {
                    for property in v.0.ty.properties() {
                        if let Ok(Some(nested)) = v.get(property.name()) {
                            pending.push(nested);
                        }
                    }
                }
                Value::List(v) => pending.extend(v.to_array()),
                Value::Simple(_) => {}
            }
        }
        false
    }

    /// Identity comparison
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Simple(a), Value::Simple(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Value::Complex(a), Value::Complex(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Value::List(a), Value::List(b)) => a.same(b),
            _ => false,
        }
    }

    /// Simple payload, if any
    pub fn as_simple(&self) -> Option<&SimpleValue> {
        match self {
            Value::Simple(v) => Some(v),
            _ => None,
        }
    }

    /// Complex payload, if any
    pub fn as_complex(&self) -> Option<&ComplexValue> {
        match self {
            Value::Complex(v) => Some(v),
            _ => None,
        }
    }

    /// List payload, if any
    pub fn as_list(&self) -> Option<&ListValue> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Update this element in place from an element with the same key.
    ///
    /// Simple values take the formatted text, complex values the property
    /// values; lists reconcile their contents.
    pub fn update_from(&self, other: &Value) {
        if self.same(other) {
            return;
        }
        match (self, other) {
            (Value::Simple(a), Value::Simple(b)) => a.set_formatted(b.formatted()),
            (Value::Complex(a), Value::Complex(b)) => a.copy_from(b),
            (Value::List(a), Value::List(b)) => {
                if let Err(err) = a.set(b.to_array(), SetOptions::default()) {
                    tracing::debug!(%err, "skipped list update");
                }
            }
            _ => {}
        }
    }

    /// Instance specification that recreates this value.
    ///
    /// A value reached again through a cycle is left out of its parent.
    pub fn to_spec(&self) -> Json {
        self.spec_once().unwrap_or(Json::Null)
    }

    fn spec_once(&self) -> Option<Json> {
        let _guard = VisitGuard::enter(Walk::Spec, self)?;
        Some(match self {
            Value::Simple(v) => match v.formatted() {
                Some(f) => json!({"v": v.primitive().to_json(), "f": f}),
                None => v.primitive().to_json(),
            },
            Value::Complex(v) => {
                let mut map = Map::new();
                for property in v.0.ty.properties() {
                    match v.get(property.name()) {
                        Ok(Some(Value::List(list))) if list.count() == 0 => {}
                        Ok(Some(value)) => {
                            if let Some(spec) = value.spec_once() {
                                map.insert(property.name().to_string(), spec);
                            }
                        }
                        _ => {}
                    }
                }
                Json::Object(map)
            }
            Value::List(v) => Json::Array(v.to_array().iter().filter_map(Value::spec_once).collect()),
        })
    }

    /// Call an instance-level method
    pub fn invoke(&self, name: &str, args: &[Json]) -> KilnResult<Json> {
        match self.value_type().member(name) {
            Some(Member::Method(slot)) => slot.call(Receiver::Instance(self), name, args),
            Some(_) => Err(KilnError::invalid(
                "name",
                format!("'{}' on type '{}' is not a method", name, self.value_type()),
            )),
            None => Err(KilnError::invalid(
                "name",
                format!("type '{}' has no method '{}'", self.value_type(), name),
            )),
        }
    }

    /// Read an accessor or field member
    pub fn read_member(&self, name: &str) -> KilnResult<Json> {
        match self.value_type().member(name) {
            Some(Member::Accessor(slot)) => slot.get(Receiver::Instance(self), name),
            Some(Member::Field(value)) => Ok(value),
            Some(Member::Method(_)) => Err(KilnError::invalid(
                "name",
                format!("'{}' on type '{}' is a method", name, self.value_type()),
            )),
            None => Err(KilnError::invalid(
                "name",
                format!("type '{}' has no member '{}'", self.value_type(), name),
            )),
        }
    }

    /// Write through an accessor member
    pub fn write_member(&self, name: &str, value: Json) -> KilnResult<()> {
        match self.value_type().member(name) {
            Some(Member::Accessor(slot)) => slot.set(Receiver::Instance(self), name, value),
            Some(_) => Err(KilnError::operation(
                name,
                format!("member '{}' of type '{}' is not writable", name, self.value_type()),
            )),
            None => Err(KilnError::invalid(
                "name",
                format!("type '{}' has no member '{}'", self.value_type(), name),
            )),
        }
    }

    /// Run the type's `validate` method; an empty list means valid.
    ///
    /// A value already being validated further up the stack reports nothing.
    pub fn validate(&self) -> KilnResult<Vec<String>> {
        let Some(_guard) = VisitGuard::enter(Walk::Validate, self) else {
            return Ok(Vec::new());
        };
        let result = self.invoke("validate", &[])?;
        match result {
            Json::Array(items) => Ok(items
                .into_iter()
                .map(|item| match item {
                    Json::String(s) => s,
                    other => other.to_string(),
                })
                .collect()),
            Json::Null => Ok(Vec::new()),
            other => Err(KilnError::operation(
                "validate",
                format!("expected a list of messages, got {}", other),
            )),
        }
    }
}

impl From<ListValue> for Value {
    fn from(list: ListValue) -> Self {
        Value::List(list)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.value_type(), self.to_spec())
    }
}
