//! Class system
//!
//! Types are created by extending a base type with a [`ClassDef`]. The new
//! type keeps an explicit handle to its ancestor; member lookups walk that
//! chain, and every override carries a handle to the implementation it
//! replaces (see [`member`]). Extension never mutates the base, so any
//! number of independent subtypes can share one ancestor.
//!
//! A type descriptor is configured right after creation (attributes,
//! element type, properties) and then frozen: afterwards only value-level
//! attributes such as labels can change.

mod member;

pub use member::{
    AccessorSlot, GetterFn, Invocation, Member, MemberDef, MemberTable, MethodFn, MethodSlot,
    Receiver, SetterFn,
};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use heck::ToTitleCase;
use parking_lot::RwLock;
use serde_json::{Map, Value as Json};

use crate::attr::{self, Inheritable};
use crate::error::{KilnError, KilnResult};
use crate::property::{Property, PropertyCollection};

/// Unique identifier of a type descriptor within the process
pub type TypeUid = usize;

/// Global counter for type descriptor uids
static NEXT_TYPE_UID: AtomicUsize = AtomicUsize::new(1);

fn generate_type_uid() -> TypeUid {
    NEXT_TYPE_UID.fetch_add(1, Ordering::Relaxed)
}

/// Structural family of a type, fixed by its builtin root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// The root of all types
    Value,
    /// Things that can be list elements
    Element,
    /// Primitive-backed values
    Simple,
    /// Property-bearing structured values
    Complex,
    /// Ordered keyed containers
    List,
}

/// Primitive backing a simple type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// Text
    String,
    /// Floating point number
    Number,
    /// Truth value
    Boolean,
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveKind::String => write!(f, "string"),
            PrimitiveKind::Number => write!(f, "number"),
            PrimitiveKind::Boolean => write!(f, "boolean"),
        }
    }
}

/// Type-level display attributes
#[derive(Debug, Clone, Default)]
pub struct TypeAttrs {
    /// Display label
    pub label: Inheritable<String>,
    /// Longer description
    pub description: Inheritable<String>,
    /// Grouping category
    pub category: Inheritable<String>,
    /// Help link
    pub help_url: Inheritable<String>,
    /// Whether pickers should offer the type
    pub is_browsable: Inheritable<bool>,
}

/// Partial update of [`TypeAttrs`]; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct TypeAttrsPatch {
    /// Display label
    pub label: Option<Inheritable<String>>,
    /// Longer description
    pub description: Option<Inheritable<String>>,
    /// Grouping category
    pub category: Option<Inheritable<String>>,
    /// Help link
    pub help_url: Option<Inheritable<String>>,
    /// Whether pickers should offer the type
    pub is_browsable: Option<Inheritable<bool>>,
}

impl TypeAttrsPatch {
    /// Read the attribute keys of a specification object
    pub fn from_map(map: &Map<String, Json>) -> KilnResult<Self> {
        Ok(Self {
            label: attr::string_patch(map, "label")?,
            description: attr::string_patch(map, "description")?,
            category: attr::string_patch(map, "category")?,
            help_url: attr::string_patch(map, "helpUrl")?,
            is_browsable: attr::bool_patch(map, "isBrowsable")?,
        })
    }

    /// Keys consumed by [`TypeAttrsPatch::from_map`]
    pub const KEYS: [&'static str; 5] = ["label", "description", "category", "helpUrl", "isBrowsable"];

    /// Whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.help_url.is_none()
            && self.is_browsable.is_none()
    }
}

/// Class-level specification handed to [`Type::extend`]
#[derive(Debug, Clone, Default)]
pub struct ClassDef {
    /// Permanent identifier, `None` for anonymous types
    pub id: Option<String>,
    /// Whether direct instantiation is forbidden
    pub is_abstract: bool,
    /// Instance-level members
    pub members: Vec<(String, MemberDef)>,
    /// Class-level members
    pub statics: Vec<(String, MemberDef)>,
    /// Types whose members are mixed in before `members` are applied
    pub mixins: Vec<Type>,
}

/// Metadata attached to an instance constructor
pub struct TypeDescriptor {
    uid: TypeUid,
    id: Option<String>,
    ancestor: Option<Type>,
    kind: TypeKind,
    primitive: Option<PrimitiveKind>,
    is_abstract: bool,
    members: MemberTable,
    statics: MemberTable,
    attrs: RwLock<TypeAttrs>,
    config: RwLock<Map<String, Json>>,
    props: RwLock<PropertyCollection>,
    element_type: RwLock<Option<Type>>,
    frozen: AtomicBool,
}

/// Shared handle to a type descriptor; compares by identity
#[derive(Clone)]
pub struct Type(Arc<TypeDescriptor>);

impl Type {
    /// Create a root type (no ancestor)
    pub(crate) fn root(id: &str, kind: TypeKind, is_abstract: bool, members: Vec<(String, MemberDef)>) -> KilnResult<Type> {
        let ty = Type(Arc::new(TypeDescriptor {
            uid: generate_type_uid(),
            id: Some(id.to_string()),
            ancestor: None,
            kind,
            primitive: None,
            is_abstract,
            members: MemberTable::new(),
            statics: MemberTable::new(),
            attrs: RwLock::new(TypeAttrs::default()),
            config: RwLock::new(Map::new()),
            props: RwLock::new(PropertyCollection::new()),
            element_type: RwLock::new(None),
            frozen: AtomicBool::new(false),
        }));
        for (name, def) in members {
            let member = Member::define(&name, def, None)?;
            ty.0.members.insert(&name, member);
        }
        Ok(ty)
    }

    /// Create a subtype of this type
    pub fn extend(&self, def: ClassDef) -> KilnResult<Type> {
        self.extend_as(def, self.0.kind, self.0.primitive)
    }

    /// Create a subtype that narrows the structural family
    pub(crate) fn extend_as(
        &self,
        def: ClassDef,
        kind: TypeKind,
        primitive: Option<PrimitiveKind>,
    ) -> KilnResult<Type> {
        let ClassDef {
            id,
            is_abstract,
            members,
            statics,
            mixins,
        } = def;

        let props = if kind == TypeKind::Complex {
            self.0.props.read().inherit()
        } else {
            PropertyCollection::new()
        };

        let ty = Type(Arc::new(TypeDescriptor {
            uid: generate_type_uid(),
            id,
            ancestor: Some(self.clone()),
            kind,
            primitive,
            is_abstract,
            members: MemberTable::new(),
            statics: MemberTable::new(),
            attrs: RwLock::new(TypeAttrs::default()),
            config: RwLock::new(Map::new()),
            props: RwLock::new(props),
            element_type: RwLock::new(self.element_type()),
            frozen: AtomicBool::new(false),
        }));

        for mixin in &mixins {
            ty.mix(mixin)?;
        }

        for (name, def) in members {
            let inherited = ty.member(&name);
            let member = Member::define(&name, def, inherited.as_ref())?;
            ty.0.members.insert(&name, member);
        }

        for (name, def) in statics {
            let inherited = ty.static_member(&name);
            let member = Member::define(&name, def, inherited.as_ref())?;
            ty.0.statics.insert(&name, member);
        }

        tracing::trace!(
            ty = %ty.name(),
            base = %self.name(),
            members = ty.0.members.len(),
            statics = ty.0.statics.len(),
            mixins = mixins.len(),
            "extended type"
        );

        Ok(ty)
    }

    /// Mix the members `mixin` contributes beyond this type's own chain.
    ///
    /// Walks the mixin's chain up to the first ancestor this type already
    /// derives from; nearer definitions win. The mixin itself is untouched.
    fn mix(&self, mixin: &Type) -> KilnResult<()> {
        let mut layers = Vec::new();
        let mut current = Some(mixin.clone());
        while let Some(layer) = current {
            if self.is_subtype_of(&layer) {
                break;
            }
            current = layer.ancestor().cloned();
            layers.push(layer);
        }

        for layer in layers.iter().rev() {
            for (name, member) in layer.0.members.entries() {
                let inherited = self.member(&name);
                let mixed = Member::remix(&name, &member, inherited.as_ref())?;
                self.0.members.insert(&name, mixed);
            }
            for (name, member) in layer.0.statics.entries() {
                let inherited = self.static_member(&name);
                let mixed = Member::remix(&name, &member, inherited.as_ref())?;
                self.0.statics.insert(&name, mixed);
            }
        }
        Ok(())
    }

    /// Process-unique uid
    pub fn uid(&self) -> TypeUid {
        self.0.uid
    }

    /// Permanent identifier, `None` for anonymous types
    pub fn id(&self) -> Option<&str> {
        self.0.id.as_deref()
    }

    /// Identifier or a synthetic name for anonymous types
    pub fn name(&self) -> String {
        match &self.0.id {
            Some(id) => id.clone(),
            None => format!("<anonymous #{}>", self.0.uid),
        }
    }

    /// Immediate ancestor
    pub fn ancestor(&self) -> Option<&Type> {
        self.0.ancestor.as_ref()
    }

    /// This type followed by its ancestors, nearest first
    pub fn lineage(&self) -> impl Iterator<Item = Type> {
        std::iter::successors(Some(self.clone()), |t| t.ancestor().cloned())
    }

    /// Structural family
    pub fn kind(&self) -> TypeKind {
        self.0.kind
    }

    /// Backing primitive of simple types
    pub fn primitive(&self) -> Option<PrimitiveKind> {
        self.0.primitive
    }

    /// Whether direct instantiation is forbidden
    pub fn is_abstract(&self) -> bool {
        self.0.is_abstract
    }

    /// Whether this is a list type
    pub fn is_list(&self) -> bool {
        self.0.kind == TypeKind::List
    }

    /// Whether this is a complex type
    pub fn is_complex(&self) -> bool {
        self.0.kind == TypeKind::Complex
    }

    /// Whether this is a simple type
    pub fn is_simple(&self) -> bool {
        self.0.kind == TypeKind::Simple
    }

    /// Whether this type equals `other` or derives from it
    pub fn is_subtype_of(&self, other: &Type) -> bool {
        self.lineage().any(|t| t == *other)
    }

    /// Instance-level member, searching the ancestor chain
    pub fn member(&self, name: &str) -> Option<Member> {
        self.lineage().find_map(|t| t.0.members.get(name))
    }

    /// Class-level member, searching the ancestor chain
    pub fn static_member(&self, name: &str) -> Option<Member> {
        self.lineage().find_map(|t| t.0.statics.get(name))
    }

    /// Members defined (or mixed in) on this type itself
    pub fn own_members(&self) -> &MemberTable {
        &self.0.members
    }

    /// Call a class-level method
    pub fn invoke_static(&self, name: &str, args: &[Json]) -> KilnResult<Json> {
        match self.static_member(name) {
            Some(Member::Method(slot)) => slot.call(Receiver::Type(self), name, args),
            Some(_) => Err(KilnError::invalid(
                "name",
                format!("'{}' on type '{}' is not a method", name, self.name()),
            )),
            None => Err(KilnError::invalid(
                "name",
                format!("type '{}' has no class-level method '{}'", self.name(), name),
            )),
        }
    }

    /// Display label: explicit, else derived from the id, else inherited
    pub fn label(&self) -> Option<String> {
        self.0.attrs.read().label.resolve_or_else(|| {
            match self.id() {
                Some(id) => Some(label_from_id(id)),
                None => self.ancestor().and_then(|a| a.label()),
            }
        })
    }

    /// Description, inherited from the ancestor when not set
    pub fn description(&self) -> Option<String> {
        self.0
            .attrs
            .read()
            .description
            .resolve_or_else(|| self.ancestor().and_then(|a| a.description()))
    }

    /// Category, inherited from the ancestor when not set
    pub fn category(&self) -> Option<String> {
        self.0
            .attrs
            .read()
            .category
            .resolve_or_else(|| self.ancestor().and_then(|a| a.category()))
    }

    /// Help link, inherited from the ancestor when not set
    pub fn help_url(&self) -> Option<String> {
        self.0
            .attrs
            .read()
            .help_url
            .resolve_or_else(|| self.ancestor().and_then(|a| a.help_url()))
    }

    /// Whether the type is browsable; defaults to `true`
    pub fn is_browsable(&self) -> bool {
        self.0
            .attrs
            .read()
            .is_browsable
            .resolve_or_else(|| self.ancestor().map(|a| a.is_browsable()))
            .unwrap_or(true)
    }

    /// Set or reset (`None`) the label
    pub fn set_label(&self, label: Option<String>) {
        self.0.attrs.write().label = Inheritable::from_option(label);
    }

    /// Set or reset (`None`) the description
    pub fn set_description(&self, description: Option<String>) {
        self.0.attrs.write().description = Inheritable::from_option(description);
    }

    /// Apply an attribute patch
    pub fn configure_attrs(&self, patch: TypeAttrsPatch) {
        let mut attrs = self.0.attrs.write();
        attr::apply(&mut attrs.label, patch.label);
        attr::apply(&mut attrs.description, patch.description);
        attr::apply(&mut attrs.category, patch.category);
        attr::apply(&mut attrs.help_url, patch.help_url);
        attr::apply(&mut attrs.is_browsable, patch.is_browsable);
    }

    /// Arbitrary configuration entry, inherited from the ancestor when absent
    pub fn config(&self, key: &str) -> Option<Json> {
        self.0
            .config
            .read()
            .get(key)
            .cloned()
            .or_else(|| self.ancestor().and_then(|a| a.config(key)))
    }

    /// Merge arbitrary configuration entries
    pub fn configure_entries(&self, entries: Map<String, Json>) {
        let mut config = self.0.config.write();
        for (key, value) in entries {
            config.insert(key, value);
        }
    }

    /// Element type of list types
    pub fn element_type(&self) -> Option<Type> {
        self.0.element_type.read().clone()
    }

    pub(crate) fn set_element_type(&self, element: Type) -> KilnResult<()> {
        if self.is_frozen() {
            return Err(KilnError::operation(
                "of",
                format!("type '{}' is already configured", self.name()),
            ));
        }
        if !self.is_list() {
            return Err(KilnError::invalid(
                "of",
                format!("type '{}' is not a list type", self.name()),
            ));
        }
        *self.0.element_type.write() = Some(element);
        Ok(())
    }

    /// Declared properties, in declaration order (complex types only)
    pub fn properties(&self) -> Vec<Property> {
        self.0.props.read().iter().cloned().collect()
    }

    /// Property by name
    pub fn property(&self, name: &str) -> Option<Property> {
        self.0.props.read().get(name).cloned()
    }

    /// Number of declared properties
    pub fn property_count(&self) -> usize {
        self.0.props.read().len()
    }

    /// Working copy of the property collection.
    ///
    /// Configuration edits the copy and commits it with `replace_props`, so
    /// no lock is held while property value types resolve.
    pub(crate) fn props_snapshot(&self) -> PropertyCollection {
        self.0.props.read().clone()
    }

    pub(crate) fn replace_props(&self, props: PropertyCollection) {
        *self.0.props.write() = props;
    }

    /// Close the type to structural changes
    pub fn freeze(&self) {
        self.0.frozen.store(true, Ordering::Release);
    }

    /// Whether structural configuration is closed
    pub fn is_frozen(&self) -> bool {
        self.0.frozen.load(Ordering::Acquire)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.uid.hash(state);
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.name())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Title-cased last segment of an id: `acme/orderLine` -> `Order Line`
pub fn label_from_id(id: &str) -> String {
    let tail = id.rsplit(['/', '.', ':']).next().unwrap_or(id);
    tail.to_title_case()
}
