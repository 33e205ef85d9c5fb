//! Property model
//!
//! Properties are the named, typed slots of complex types. A property is
//! owned by the type that declares it. A subtype redeclaring an inherited
//! name produces a *sub-property* that keeps a handle to the property it
//! overrides; its value type must be equal to or narrower than the
//! ancestor's and its cardinality must match.
//!
//! Display and validation attributes inherit along that chain and fall back
//! to a default at the root property.

mod collection;

pub use collection::{PropertyCollection, PropsSpec};

use std::fmt;
use std::sync::Arc;

use heck::ToTitleCase;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde_json::{Map, Value as Json};

use crate::attr::{self, Inheritable};
use crate::class::{Type, TypeUid};
use crate::error::{KilnError, KilnResult};
use crate::spec::TypeRef;

/// Resolves property value types while a type is being configured.
///
/// Resolution here is always synchronous: declaring a property never
/// suspends, so the value type must already be loadable.
pub trait TypeResolver {
    /// Resolve a type reference
    fn resolve_type(&self, type_ref: &TypeRef) -> KilnResult<Type>;

    /// Value type used when a property spec names none
    fn default_value_type(&self) -> Type;
}

/// Property declaration or redeclaration
#[derive(Debug, Clone, Default)]
pub struct PropertySpec {
    /// Property name
    pub name: Option<String>,
    /// Value type reference; list-typed values make a list property
    pub value_type: Option<TypeRef>,
    /// Display label
    pub label: Option<Inheritable<String>>,
    /// Longer description
    pub description: Option<Inheritable<String>>,
    /// Grouping category
    pub category: Option<Inheritable<String>>,
    /// Help link
    pub help_url: Option<Inheritable<String>>,
    /// Whether editors should show the property
    pub is_browsable: Option<Inheritable<bool>>,
    /// Minimum number of values
    pub count_min: Option<Inheritable<u32>>,
    /// Maximum number of values
    pub count_max: Option<Inheritable<u32>>,
}

impl PropertySpec {
    /// Spec with only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set the value type
    pub fn of_type(mut self, value_type: impl Into<TypeRef>) -> Self {
        self.value_type = Some(value_type.into());
        self
    }

    /// Set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(Inheritable::Explicit(label.into()));
        self
    }

    /// Parse a string name or a property spec object
    pub fn from_json(json: &Json) -> KilnResult<Self> {
        match json {
            Json::String(name) => Ok(Self::named(name.clone())),
            Json::Object(map) => Self::from_map(map),
            other => Err(KilnError::invalid(
                "props",
                format!("expected a property name or spec object, got {}", other),
            )),
        }
    }

    fn from_map(map: &Map<String, Json>) -> KilnResult<Self> {
        let name = match map.get("name") {
            None | Some(Json::Null) => None,
            Some(Json::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(KilnError::invalid(
                    "name",
                    format!("expected a string, got {}", other),
                ))
            }
        };
        let value_type = match map.get("valueType").or_else(|| map.get("type")) {
            None | Some(Json::Null) => None,
            Some(json) => Some(TypeRef::classify(json)?),
        };
        Ok(Self {
            name,
            value_type,
            label: attr::string_patch(map, "label")?,
            description: attr::string_patch(map, "description")?,
            category: attr::string_patch(map, "category")?,
            help_url: attr::string_patch(map, "helpUrl")?,
            is_browsable: attr::bool_patch(map, "isBrowsable")?,
            count_min: attr::count_patch(map, "countMin")?,
            count_max: attr::count_patch(map, "countMax")?,
        })
    }

    fn has_attrs(&self) -> bool {
        self.label.is_some()
            || self.description.is_some()
            || self.category.is_some()
            || self.help_url.is_some()
            || self.is_browsable.is_some()
            || self.count_min.is_some()
            || self.count_max.is_some()
    }
}

#[derive(Debug, Clone, Default)]
struct PropertyAttrs {
    label: Inheritable<String>,
    description: Inheritable<String>,
    category: Inheritable<String>,
    help_url: Inheritable<String>,
    is_browsable: Inheritable<bool>,
    count_min: Inheritable<u32>,
    count_max: Inheritable<u32>,
}

struct PropertyInner {
    name: String,
    index: usize,
    declaring_type: TypeUid,
    declaring_name: String,
    ancestor: Option<Property>,
    value_type: Type,
    attrs: RwLock<PropertyAttrs>,
    // Read from the value type once, at first use
    description_default: OnceCell<Option<String>>,
    browsable_default: OnceCell<bool>,
}

/// Shared handle to a property declaration; compares by identity
#[derive(Clone)]
pub struct Property(Arc<PropertyInner>);

impl Property {
    /// Declare a new root property on `declaring`
    pub fn declare(
        spec: &PropertySpec,
        declaring: &Type,
        ordinal: usize,
        resolver: &dyn TypeResolver,
    ) -> KilnResult<Property> {
        let name = match spec.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(KilnError::required("name")),
        };
        let value_type = match &spec.value_type {
            Some(type_ref) => resolver.resolve_type(type_ref)?,
            None => resolver.default_value_type(),
        };

        let property = Property::new(name, ordinal, declaring, None, value_type);
        property.configure_attrs(spec);

        tracing::trace!(
            property = name,
            declaring = %declaring,
            value_type = %property.value_type(),
            "declared property"
        );
        Ok(property)
    }

    /// Redeclare this (inherited) property on the subtype `declaring`
    pub fn override_with(
        &self,
        spec: &PropertySpec,
        declaring: &Type,
        resolver: &dyn TypeResolver,
    ) -> KilnResult<Property> {
        if let Some(name) = spec.name.as_deref() {
            if name != self.name() {
                return Err(KilnError::invalid(
                    "name",
                    format!(
                        "sub-property '{}' cannot rename inherited property '{}'",
                        name,
                        self.name()
                    ),
                ));
            }
        }

        let value_type = match &spec.value_type {
            Some(type_ref) => {
                let value_type = resolver.resolve_type(type_ref)?;
                self.check_narrowing(&value_type)?;
                value_type
            }
            None => self.value_type().clone(),
        };

        let property = Property::new(
            self.name(),
            self.index(),
            declaring,
            Some(self.clone()),
            value_type,
        );
        property.configure_attrs(spec);

        tracing::trace!(
            property = self.name(),
            declaring = %declaring,
            ancestor = %self.0.declaring_name,
            "overrode property"
        );
        Ok(property)
    }

    /// Reconfigure a property owned by the type being configured.
    ///
    /// Only value-level attributes may change; the value type is structural.
    pub fn reconfigure(&self, spec: &PropertySpec, resolver: &dyn TypeResolver) -> KilnResult<()> {
        if let Some(type_ref) = &spec.value_type {
            let value_type = resolver.resolve_type(type_ref)?;
            if value_type != *self.value_type() {
                return Err(KilnError::operation(
                    "valueType",
                    format!(
                        "value type of property '{}' cannot change once declared",
                        self.name()
                    ),
                ));
            }
        }
        self.configure_attrs(spec);
        Ok(())
    }

    fn new(
        name: &str,
        index: usize,
        declaring: &Type,
        ancestor: Option<Property>,
        value_type: Type,
    ) -> Property {
        Property(Arc::new(PropertyInner {
            name: name.to_string(),
            index,
            declaring_type: declaring.uid(),
            declaring_name: declaring.name(),
            ancestor,
            value_type,
            attrs: RwLock::new(PropertyAttrs::default()),
            description_default: OnceCell::new(),
            browsable_default: OnceCell::new(),
        }))
    }

    fn check_narrowing(&self, value_type: &Type) -> KilnResult<()> {
        let ancestor_type = self.value_type();
        if value_type.is_list() != ancestor_type.is_list() {
            return Err(KilnError::invalid(
                self.name(),
                format!(
                    "sub-property must keep the {} cardinality of property '{}' declared on '{}'",
                    if self.is_list() { "list" } else { "singular" },
                    self.name(),
                    self.0.declaring_name
                ),
            ));
        }

        let narrows = match (value_type.is_list(), ancestor_type.element_type(), value_type.element_type()) {
            (true, Some(base_elem), Some(elem)) => {
                value_type.is_subtype_of(ancestor_type) || elem.is_subtype_of(&base_elem)
            }
            _ => value_type.is_subtype_of(ancestor_type),
        };
        if !narrows {
            return Err(KilnError::invalid(
                self.name(),
                format!(
                    "value type '{}' is not a subtype of '{}', the value type of the inherited property",
                    value_type, ancestor_type
                ),
            ));
        }
        Ok(())
    }

    /// Apply the attribute part of a spec
    pub fn configure_attrs(&self, spec: &PropertySpec) {
        if !spec.has_attrs() {
            return;
        }
        let mut attrs = self.0.attrs.write();
        attr::apply(&mut attrs.label, spec.label.clone());
        attr::apply(&mut attrs.description, spec.description.clone());
        attr::apply(&mut attrs.category, spec.category.clone());
        attr::apply(&mut attrs.help_url, spec.help_url.clone());
        attr::apply(&mut attrs.is_browsable, spec.is_browsable.clone());
        attr::apply(&mut attrs.count_min, spec.count_min.clone());
        attr::apply(&mut attrs.count_max, spec.count_max.clone());
    }

    /// Property name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Position within the declaring type's collection
    pub fn index(&self) -> usize {
        self.0.index
    }

    /// Value type
    pub fn value_type(&self) -> &Type {
        &self.0.value_type
    }

    /// Element type of list properties
    pub fn element_type(&self) -> Option<Type> {
        if self.is_list() {
            self.0.value_type.element_type()
        } else {
            None
        }
    }

    /// Whether the property holds a list of values
    pub fn is_list(&self) -> bool {
        self.0.value_type.is_list()
    }

    /// Property this one overrides
    pub fn ancestor(&self) -> Option<&Property> {
        self.0.ancestor.as_ref()
    }

    /// Whether this is a root declaration
    pub fn is_root(&self) -> bool {
        self.0.ancestor.is_none()
    }

    /// Uid of the declaring type
    pub fn declaring_type(&self) -> TypeUid {
        self.0.declaring_type
    }

    /// Label: explicit, inherited, else the title-cased name
    pub fn label(&self) -> String {
        self.0
            .attrs
            .read()
            .label
            .resolve_or_else(|| self.ancestor().map(|a| a.label()))
            .unwrap_or_else(|| title_from_name(self.name()))
    }

    /// Description: explicit, inherited, else the value type's description
    pub fn description(&self) -> Option<String> {
        self.0.attrs.read().description.resolve_or_else(|| match self.ancestor() {
            Some(a) => a.description(),
            None => self
                .0
                .description_default
                .get_or_init(|| self.0.value_type.description())
                .clone(),
        })
    }

    /// Category: explicit or inherited
    pub fn category(&self) -> Option<String> {
        self.0
            .attrs
            .read()
            .category
            .resolve_or_else(|| self.ancestor().and_then(|a| a.category()))
    }

    /// Help link: explicit or inherited
    pub fn help_url(&self) -> Option<String> {
        self.0
            .attrs
            .read()
            .help_url
            .resolve_or_else(|| self.ancestor().and_then(|a| a.help_url()))
    }

    /// Browsable flag: explicit, inherited, else the value type's flag
    pub fn is_browsable(&self) -> bool {
        self.0
            .attrs
            .read()
            .is_browsable
            .resolve_or_else(|| {
                Some(match self.ancestor() {
                    Some(a) => a.is_browsable(),
                    None => *self
                        .0
                        .browsable_default
                        .get_or_init(|| self.0.value_type.is_browsable()),
                })
            })
            .unwrap_or(true)
    }

    /// Minimum number of values; defaults to 0
    pub fn count_min(&self) -> u32 {
        self.0
            .attrs
            .read()
            .count_min
            .resolve_or_else(|| self.ancestor().map(|a| a.count_min()))
            .unwrap_or(0)
    }

    /// Maximum number of values; `None` means unbounded.
    ///
    /// Defaults to 1 for singular properties and unbounded for lists.
    pub fn count_max(&self) -> Option<u32> {
        let explicit = self.0.attrs.read().count_max.explicit().copied();
        match explicit {
            Some(max) => Some(max),
            None => match self.ancestor() {
                Some(a) => a.count_max(),
                None if self.is_list() => None,
                None => Some(1),
            },
        }
    }

    /// Set or reset (`None`) the label
    pub fn set_label(&self, label: Option<String>) {
        self.0.attrs.write().label = Inheritable::from_option(label);
    }

    /// Set or reset (`None`) the description
    pub fn set_description(&self, description: Option<String>) {
        self.0.attrs.write().description = Inheritable::from_option(description);
    }

    /// Set or reset (`None`) the category
    pub fn set_category(&self, category: Option<String>) {
        self.0.attrs.write().category = Inheritable::from_option(category);
    }

    /// Set or reset (`None`) the help link
    pub fn set_help_url(&self, help_url: Option<String>) {
        self.0.attrs.write().help_url = Inheritable::from_option(help_url);
    }

    /// Set or reset (`None`) the browsable flag
    pub fn set_browsable(&self, is_browsable: Option<bool>) {
        self.0.attrs.write().is_browsable = Inheritable::from_option(is_browsable);
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Property {}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.0.name)
            .field("declaring", &self.0.declaring_name)
            .field("value_type", &self.0.value_type)
            .finish()
    }
}

/// Default label for a property name: `firstName` -> `First Name`
pub fn title_from_name(name: &str) -> String {
    name.to_title_case()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassDef, TypeKind};
    use rustc_hash::FxHashMap;
    use serde_json::json;

    /// Resolver over a fixed id table
    struct Table {
        types: FxHashMap<String, Type>,
        default: Type,
    }

    impl TypeResolver for Table {
        fn resolve_type(&self, type_ref: &TypeRef) -> KilnResult<Type> {
            match type_ref {
                TypeRef::Id(id) => self
                    .types
                    .get(id)
                    .cloned()
                    .ok_or_else(|| KilnError::invalid("typeRef", format!("unknown '{}'", id))),
                TypeRef::Type(ty) => Ok(ty.clone()),
                _ => Err(KilnError::invalid("typeRef", "unsupported in test")),
            }
        }

        fn default_value_type(&self) -> Type {
            self.default.clone()
        }
    }

    fn fixture() -> (Table, Type) {
        let value = Type::root("value", TypeKind::Value, true, Vec::new()).unwrap();
        let named = |base: &Type, id: &str| {
            base.extend(ClassDef {
                id: Some(id.to_string()),
                ..ClassDef::default()
            })
            .unwrap()
        };
        let element = named(&value, "element");
        let animal = named(&element, "animal");
        let dog = named(&animal, "dog");
        let rock = named(&element, "rock");
        let list = value
            .extend_as(
                ClassDef {
                    id: Some("list".into()),
                    ..ClassDef::default()
                },
                TypeKind::List,
                None,
            )
            .unwrap();
        let owner = value
            .extend_as(
                ClassDef {
                    id: Some("owner".into()),
                    ..ClassDef::default()
                },
                TypeKind::Complex,
                None,
            )
            .unwrap();

        let mut types = FxHashMap::default();
        for ty in [&element, &animal, &dog, &rock, &list] {
            types.insert(ty.name(), ty.clone());
        }
        (
            Table {
                types,
                default: element,
            },
            owner,
        )
    }

    #[test]
    fn test_declare_defaults() {
        let (resolver, owner) = fixture();
        let p = Property::declare(&PropertySpec::named("firstName"), &owner, 0, &resolver).unwrap();

        assert_eq!(p.name(), "firstName");
        assert_eq!(p.label(), "First Name");
        assert_eq!(p.value_type().id(), Some("element"));
        assert!(!p.is_list());
        assert_eq!(p.count_min(), 0);
        assert_eq!(p.count_max(), Some(1));
        assert!(p.is_browsable());
        assert!(p.is_root());
    }

    #[test]
    fn test_declare_requires_name() {
        let (resolver, owner) = fixture();
        let err = Property::declare(&PropertySpec::default(), &owner, 0, &resolver).unwrap_err();
        assert_eq!(err, KilnError::required("name"));

        let err = Property::declare(&PropertySpec::named(""), &owner, 0, &resolver).unwrap_err();
        assert_eq!(err, KilnError::required("name"));
    }

    #[test]
    fn test_override_accepts_subtype() {
        let (resolver, owner) = fixture();
        let sub_owner = owner.extend(ClassDef::default()).unwrap();
        let base = Property::declare(&PropertySpec::named("pet").of_type("animal"), &owner, 3, &resolver).unwrap();

        let sub = base
            .override_with(&PropertySpec::named("pet").of_type("dog"), &sub_owner, &resolver)
            .unwrap();
        assert_eq!(sub.value_type().id(), Some("dog"));
        assert_eq!(sub.index(), 3);
        assert_eq!(sub.ancestor(), Some(&base));
    }

    #[test]
    fn test_override_rejects_unrelated_type() {
        let (resolver, owner) = fixture();
        let base = Property::declare(&PropertySpec::named("pet").of_type("animal"), &owner, 0, &resolver).unwrap();

        let err = base
            .override_with(&PropertySpec::named("pet").of_type("rock"), &owner, &resolver)
            .unwrap_err();
        assert!(matches!(err, KilnError::ArgumentInvalid { .. }));

        let err = base
            .override_with(&PropertySpec::named("pet").of_type("element"), &owner, &resolver)
            .unwrap_err();
        assert!(err.to_string().contains("is not a subtype of"));
    }

    #[test]
    fn test_override_rejects_cardinality_change() {
        let (resolver, owner) = fixture();
        let base = Property::declare(&PropertySpec::named("pet").of_type("animal"), &owner, 0, &resolver).unwrap();

        let err = base
            .override_with(&PropertySpec::named("pet").of_type("list"), &owner, &resolver)
            .unwrap_err();
        assert!(matches!(err, KilnError::ArgumentInvalid { .. }));
        assert!(err.to_string().contains("cardinality"));
    }

    #[test]
    fn test_attributes_inherit_along_chain() {
        let (resolver, owner) = fixture();
        let base_spec = PropertySpec::from_json(&json!({
            "name": "pet",
            "valueType": "animal",
            "label": "Companion",
            "category": "Family",
        }))
        .unwrap();
        let base = Property::declare(&base_spec, &owner, 0, &resolver).unwrap();
        let sub = base
            .override_with(&PropertySpec::named("pet"), &owner, &resolver)
            .unwrap();

        assert_eq!(sub.label(), "Companion");
        assert_eq!(sub.category().as_deref(), Some("Family"));

        sub.set_label(Some(String::new()));
        assert_eq!(sub.label(), "");

        sub.set_label(None);
        assert_eq!(sub.label(), "Companion");

        base.set_label(None);
        assert_eq!(sub.label(), "Pet");
    }

    #[test]
    fn test_description_defaults_to_value_type_once() {
        let (resolver, owner) = fixture();
        let animal = resolver.resolve_type(&TypeRef::from("animal")).unwrap();
        animal.set_description(Some("A living thing".into()));

        let p = Property::declare(&PropertySpec::named("pet").of_type("animal"), &owner, 0, &resolver).unwrap();
        assert_eq!(p.description().as_deref(), Some("A living thing"));

        animal.set_description(Some("Changed".into()));
        assert_eq!(p.description().as_deref(), Some("A living thing"));
    }

    #[test]
    fn test_spec_from_json_rejects_bad_shapes() {
        assert!(PropertySpec::from_json(&json!(3)).is_err());
        assert!(PropertySpec::from_json(&json!({"name": 1})).is_err());
        let spec = PropertySpec::from_json(&json!({"name": "a", "label": null})).unwrap();
        assert_eq!(spec.label, Some(Inheritable::Inherited));
    }
}
