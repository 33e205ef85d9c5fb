//! Member tables and override wiring
//!
//! A type's own members live in a [`MemberTable`]; lookups walk the ancestor
//! chain. When a member is defined over an inherited one, the new slot keeps
//! an explicit handle to the overridden slot, which the implementation reaches
//! through [`Invocation::call_base`] (or `get_base`/`set_base` for accessors).
//!
//! Accessor pairs merge field by field: overriding only the getter keeps the
//! inherited setter and vice versa.
//!
//! Conflicts are rejected: a method or accessor can never replace a plain
//! field, a field can never replace a method or accessor, and methods and
//! accessors never replace one another.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;

use super::Type;
use crate::error::{KilnError, KilnResult};
use crate::value::Value;

/// Method implementation
pub type MethodFn = Arc<dyn Fn(&Invocation<'_>, &[Json]) -> KilnResult<Json> + Send + Sync>;

/// Accessor getter implementation
pub type GetterFn = Arc<dyn Fn(&Invocation<'_>) -> KilnResult<Json> + Send + Sync>;

/// Accessor setter implementation
pub type SetterFn = Arc<dyn Fn(&Invocation<'_>, Json) -> KilnResult<()> + Send + Sync>;

/// Member definition as supplied to `extend`
#[derive(Clone)]
pub enum MemberDef {
    /// Callable member
    Method(MethodFn),
    /// Computed member; either half may be absent
    Accessor {
        /// Getter half
        get: Option<GetterFn>,
        /// Setter half
        set: Option<SetterFn>,
    },
    /// Plain data member
    Field(Json),
}

impl MemberDef {
    /// Define a method
    pub fn method<F>(f: F) -> Self
    where
        F: Fn(&Invocation<'_>, &[Json]) -> KilnResult<Json> + Send + Sync + 'static,
    {
        MemberDef::Method(Arc::new(f))
    }

    /// Define an abstract contract method
    ///
    /// Invoking it without an override fails with `NotImplemented`.
    pub fn abstract_method() -> Self {
        MemberDef::method(|inv, _| Err(KilnError::not_implemented(inv.name())))
    }

    /// Define only the getter half of an accessor
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> KilnResult<Json> + Send + Sync + 'static,
    {
        MemberDef::Accessor {
            get: Some(Arc::new(f)),
            set: None,
        }
    }

    /// Define only the setter half of an accessor
    pub fn setter<F>(f: F) -> Self
    where
        F: Fn(&Invocation<'_>, Json) -> KilnResult<()> + Send + Sync + 'static,
    {
        MemberDef::Accessor {
            get: None,
            set: Some(Arc::new(f)),
        }
    }

    /// Define both halves of an accessor
    pub fn accessor<G, S>(get: G, set: S) -> Self
    where
        G: Fn(&Invocation<'_>) -> KilnResult<Json> + Send + Sync + 'static,
        S: Fn(&Invocation<'_>, Json) -> KilnResult<()> + Send + Sync + 'static,
    {
        MemberDef::Accessor {
            get: Some(Arc::new(get)),
            set: Some(Arc::new(set)),
        }
    }

    /// Define a plain field
    pub fn field(value: impl Into<Json>) -> Self {
        MemberDef::Field(value.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            MemberDef::Method(_) => "method",
            MemberDef::Accessor { .. } => "accessor",
            MemberDef::Field(_) => "field",
        }
    }
}

impl fmt::Debug for MemberDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberDef::Field(v) => write!(f, "Field({})", v),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Method slot with a handle to the implementation it overrides
pub struct MethodSlot {
    func: MethodFn,
    base: Option<Arc<MethodSlot>>,
}

impl MethodSlot {
    /// Invoke this implementation
    pub fn call(&self, receiver: Receiver<'_>, name: &str, args: &[Json]) -> KilnResult<Json> {
        let inv = Invocation {
            receiver,
            name,
            base: self.base.as_deref().map_or(Base::None, Base::Method),
        };
        (self.func)(&inv, args)
    }

    /// Whether this slot overrides an inherited implementation
    pub fn has_base(&self) -> bool {
        self.base.is_some()
    }
}

/// Getter slot
pub struct GetterSlot {
    func: GetterFn,
    base: Option<Arc<GetterSlot>>,
}

impl GetterSlot {
    fn call(&self, receiver: Receiver<'_>, name: &str) -> KilnResult<Json> {
        let inv = Invocation {
            receiver,
            name,
            base: self.base.as_deref().map_or(Base::None, Base::Getter),
        };
        (self.func)(&inv)
    }
}

/// Setter slot
pub struct SetterSlot {
    func: SetterFn,
    base: Option<Arc<SetterSlot>>,
}

impl SetterSlot {
    fn call(&self, receiver: Receiver<'_>, name: &str, value: Json) -> KilnResult<()> {
        let inv = Invocation {
            receiver,
            name,
            base: self.base.as_deref().map_or(Base::None, Base::Setter),
        };
        (self.func)(&inv, value)
    }
}

/// Accessor slot pair
#[derive(Clone, Default)]
pub struct AccessorSlot {
    get: Option<Arc<GetterSlot>>,
    set: Option<Arc<SetterSlot>>,
}

impl AccessorSlot {
    /// Read through the getter
    pub fn get(&self, receiver: Receiver<'_>, name: &str) -> KilnResult<Json> {
        match &self.get {
            Some(slot) => slot.call(receiver, name),
            None => Err(KilnError::operation(
                name,
                format!("accessor '{}' has no getter", name),
            )),
        }
    }

    /// Write through the setter
    pub fn set(&self, receiver: Receiver<'_>, name: &str, value: Json) -> KilnResult<()> {
        match &self.set {
            Some(slot) => slot.call(receiver, name, value),
            None => Err(KilnError::operation(
                name,
                format!("accessor '{}' is read-only", name),
            )),
        }
    }

    /// Whether a getter is present
    pub fn has_getter(&self) -> bool {
        self.get.is_some()
    }

    /// Whether a setter is present
    pub fn has_setter(&self) -> bool {
        self.set.is_some()
    }
}

/// Resolved member
#[derive(Clone)]
pub enum Member {
    /// Method slot
    Method(Arc<MethodSlot>),
    /// Accessor pair
    Accessor(AccessorSlot),
    /// Plain field
    Field(Json),
}

impl Member {
    fn kind(&self) -> &'static str {
        match self {
            Member::Method(_) => "method",
            Member::Accessor(_) => "accessor",
            Member::Field(_) => "field",
        }
    }

    /// Build the member that results from defining `def` over `inherited`.
    ///
    /// Nothing in `inherited` is modified.
    pub(crate) fn define(name: &str, def: MemberDef, inherited: Option<&Member>) -> KilnResult<Member> {
        match (def, inherited) {
            (MemberDef::Method(func), None) => Ok(Member::Method(Arc::new(MethodSlot { func, base: None }))),
            (MemberDef::Method(func), Some(Member::Method(base))) => Ok(Member::Method(Arc::new(MethodSlot {
                func,
                base: Some(base.clone()),
            }))),
            (MemberDef::Accessor { get, set }, None) => Ok(Member::Accessor(AccessorSlot {
                get: get.map(|func| Arc::new(GetterSlot { func, base: None })),
                set: set.map(|func| Arc::new(SetterSlot { func, base: None })),
            })),
            (MemberDef::Accessor { get, set }, Some(Member::Accessor(base))) => {
                let get = match get {
                    Some(func) => Some(Arc::new(GetterSlot {
                        func,
                        base: base.get.clone(),
                    })),
                    None => base.get.clone(),
                };
                let set = match set {
                    Some(func) => Some(Arc::new(SetterSlot {
                        func,
                        base: base.set.clone(),
                    })),
                    None => base.set.clone(),
                };
                Ok(Member::Accessor(AccessorSlot { get, set }))
            }
            (MemberDef::Field(value), None | Some(Member::Field(_))) => Ok(Member::Field(value)),
            (def, Some(existing)) => Err(KilnError::invalid(
                name,
                format!(
                    "cannot define a {} over an inherited {}",
                    def.kind(),
                    existing.kind()
                ),
            )),
        }
    }

    /// Re-home a member from a mixin onto a new owner.
    ///
    /// The mixin's implementations are reused; their base handles are rewired
    /// to `inherited`, the member the owner would otherwise see.
    pub(crate) fn remix(name: &str, member: &Member, inherited: Option<&Member>) -> KilnResult<Member> {
        let def = match member {
            Member::Method(slot) => MemberDef::Method(slot.func.clone()),
            Member::Accessor(slot) => MemberDef::Accessor {
                get: slot.get.as_ref().map(|s| s.func.clone()),
                set: slot.set.as_ref().map(|s| s.func.clone()),
            },
            Member::Field(value) => MemberDef::Field(value.clone()),
        };
        Member::define(name, def, inherited)
    }
}

/// Receiver of a member invocation
#[derive(Clone, Copy)]
pub enum Receiver<'a> {
    /// Instance-level member
    Instance(&'a Value),
    /// Class-level member
    Type(&'a Type),
}

impl<'a> Receiver<'a> {
    /// Type the member is being looked up on
    pub fn value_type(&self) -> &'a Type {
        match *self {
            Receiver::Instance(value) => value.value_type(),
            Receiver::Type(ty) => ty,
        }
    }

    /// Instance receiver, if any
    pub fn instance(&self) -> Option<&'a Value> {
        match *self {
            Receiver::Instance(value) => Some(value),
            Receiver::Type(_) => None,
        }
    }
}

#[derive(Clone, Copy)]
enum Base<'a> {
    None,
    Method(&'a MethodSlot),
    Getter(&'a GetterSlot),
    Setter(&'a SetterSlot),
}

/// Context handed to a member implementation
pub struct Invocation<'a> {
    receiver: Receiver<'a>,
    name: &'a str,
    base: Base<'a>,
}

impl<'a> Invocation<'a> {
    /// Receiver of the call
    pub fn receiver(&self) -> Receiver<'a> {
        self.receiver
    }

    /// Instance receiver, if this is an instance-level call
    pub fn instance(&self) -> Option<&'a Value> {
        self.receiver.instance()
    }

    /// Member name
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Whether an overridden implementation exists
    pub fn has_base(&self) -> bool {
        !matches!(self.base, Base::None)
    }

    /// Call the overridden method
    pub fn call_base(&self, args: &[Json]) -> KilnResult<Json> {
        match self.base {
            Base::Method(slot) => slot.call(self.receiver, self.name, args),
            _ => Err(KilnError::not_implemented(self.name)),
        }
    }

    /// Call the overridden getter
    pub fn get_base(&self) -> KilnResult<Json> {
        match self.base {
            Base::Getter(slot) => slot.call(self.receiver, self.name),
            _ => Err(KilnError::not_implemented(self.name)),
        }
    }

    /// Call the overridden setter
    pub fn set_base(&self, value: Json) -> KilnResult<()> {
        match self.base {
            Base::Setter(slot) => slot.call(self.receiver, self.name, value),
            _ => Err(KilnError::not_implemented(self.name)),
        }
    }
}

/// Own members of one type, in definition order
#[derive(Default)]
pub struct MemberTable {
    members: RwLock<FxHashMap<String, Member>>,
    order: RwLock<Vec<String>>,
}

impl MemberTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an own member
    pub fn get(&self, name: &str) -> Option<Member> {
        self.members.read().get(name).cloned()
    }

    /// Insert or replace an own member
    pub(crate) fn insert(&self, name: &str, member: Member) {
        let mut members = self.members.write();
        if members.insert(name.to_string(), member).is_none() {
            self.order.write().push(name.to_string());
        }
    }

    /// Own members in definition order
    pub fn entries(&self) -> Vec<(String, Member)> {
        let members = self.members.read();
        self.order
            .read()
            .iter()
            .filter_map(|name| members.get(name).map(|m| (name.clone(), m.clone())))
            .collect()
    }

    /// Own member names in definition order
    pub fn names(&self) -> Vec<String> {
        self.order.read().clone()
    }

    /// Number of own members
    pub fn len(&self) -> usize {
        self.order.read().len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &'static str) -> MemberDef {
        MemberDef::method(move |_, _| Ok(json!(s)))
    }

    #[test]
    fn test_method_over_method_keeps_base() {
        let base = Member::define("greet", text("base"), None).unwrap();
        let child = Member::define("greet", text("child"), Some(&base)).unwrap();

        match child {
            Member::Method(slot) => assert!(slot.has_base()),
            _ => panic!("expected a method"),
        }
    }

    #[test]
    fn test_accessor_merge_keeps_inherited_setter() {
        let base = Member::define(
            "size",
            MemberDef::accessor(|_| Ok(json!(1)), |_, _| Ok(())),
            None,
        )
        .unwrap();
        let child = Member::define("size", MemberDef::getter(|_| Ok(json!(2))), Some(&base)).unwrap();

        match child {
            Member::Accessor(slot) => {
                assert!(slot.has_getter());
                assert!(slot.has_setter());
            }
            _ => panic!("expected an accessor"),
        }
    }

    #[test]
    fn test_method_over_field_is_rejected() {
        let base = Member::define("size", MemberDef::field(3), None).unwrap();
        let err = Member::define("size", text("x"), Some(&base)).err().unwrap();
        assert!(matches!(err, KilnError::ArgumentInvalid { .. }));
        assert!(err.to_string().contains("method over an inherited field"));
    }

    #[test]
    fn test_field_over_field_replaces() {
        let base = Member::define("size", MemberDef::field(3), None).unwrap();
        match Member::define("size", MemberDef::field(4), Some(&base)).unwrap() {
            Member::Field(v) => assert_eq!(v, json!(4)),
            _ => panic!("expected a field"),
        }
    }

    #[test]
    fn test_table_keeps_definition_order() {
        let table = MemberTable::new();
        table.insert("b", Member::Field(json!(1)));
        table.insert("a", Member::Field(json!(2)));
        table.insert("b", Member::Field(json!(3)));

        assert_eq!(table.names(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(table.len(), 2);
    }
}
