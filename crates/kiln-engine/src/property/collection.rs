//! Ordered property collection of one complex type

use rustc_hash::FxHashMap;
use serde_json::Value as Json;

use super::{Property, PropertySpec, TypeResolver};
use crate::class::Type;
use crate::error::{KilnError, KilnResult};

/// `props` as written in a type specification
#[derive(Debug, Clone)]
pub enum PropsSpec {
    /// Ordered list of property specs
    List(Vec<PropertySpec>),
    /// Name-keyed map, in key order
    Map(Vec<(String, PropertySpec)>),
}

impl PropsSpec {
    /// Parse an array of names/specs or a name-keyed object
    pub fn from_json(json: &Json) -> KilnResult<Self> {
        match json {
            Json::Array(items) => items
                .iter()
                .map(PropertySpec::from_json)
                .collect::<KilnResult<Vec<_>>>()
                .map(PropsSpec::List),
            Json::Object(map) => map
                .iter()
                .map(|(key, value)| {
                    let spec = match value {
                        // `{"a": "string"}` names the value type
                        Json::String(_) | Json::Array(_) => PropertySpec {
                            value_type: Some(crate::spec::TypeRef::classify(value)?),
                            ..PropertySpec::default()
                        },
                        Json::Null => PropertySpec::default(),
                        other => PropertySpec::from_json(other)?,
                    };
                    Ok((key.clone(), spec))
                })
                .collect::<KilnResult<Vec<_>>>()
                .map(PropsSpec::Map),
            other => Err(KilnError::invalid(
                "props",
                format!("expected an array or an object, got {}", other),
            )),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        match self {
            PropsSpec::List(specs) => specs.len(),
            PropsSpec::Map(entries) => entries.len(),
        }
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten to named specs, checking map keys against spec names
    fn into_named(self) -> KilnResult<Vec<PropertySpec>> {
        match self {
            PropsSpec::List(specs) => Ok(specs),
            PropsSpec::Map(entries) => entries
                .into_iter()
                .map(|(key, mut spec)| match spec.name.as_deref() {
                    Some(name) if name != key => Err(KilnError::invalid(
                        "props",
                        format!(
                            "property spec named '{}' is registered under the key '{}'",
                            name, key
                        ),
                    )),
                    _ => {
                        spec.name = Some(key);
                        Ok(spec)
                    }
                })
                .collect(),
        }
    }
}

impl From<Vec<PropertySpec>> for PropsSpec {
    fn from(specs: Vec<PropertySpec>) -> Self {
        PropsSpec::List(specs)
    }
}

/// Properties of a type in declaration order, inherited ones first
#[derive(Debug, Clone, Default)]
pub struct PropertyCollection {
    props: Vec<Property>,
    index: FxHashMap<String, usize>,
}

impl PropertyCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Starting collection of a subtype: the same property handles
    pub fn inherit(&self) -> Self {
        self.clone()
    }

    /// Property by name
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.index.get(name).map(|&i| &self.props[i])
    }

    /// Whether a property of that name exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Properties in declaration order
    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.props.iter()
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Apply a `props` configuration on behalf of `declaring`.
    ///
    /// New names are declared, inherited names are overridden in place and
    /// names already owned by `declaring` are reconfigured. Once the type is
    /// frozen only the last kind of change is accepted.
    pub fn configure(
        &mut self,
        spec: PropsSpec,
        declaring: &Type,
        resolver: &dyn TypeResolver,
    ) -> KilnResult<()> {
        let frozen = declaring.is_frozen();

        for spec in spec.into_named()? {
            let name = match spec.name.as_deref() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => return Err(KilnError::required("name")),
            };

            match self.index.get(&name).copied() {
                Some(i) if self.props[i].declaring_type() == declaring.uid() => {
                    self.props[i].reconfigure(&spec, resolver)?;
                }
                Some(i) => {
                    if frozen {
                        return Err(frozen_error(declaring, &name));
                    }
                    let sub = self.props[i].override_with(&spec, declaring, resolver)?;
                    self.props[i] = sub;
                }
                None => {
                    if frozen {
                        return Err(frozen_error(declaring, &name));
                    }
                    let property = Property::declare(&spec, declaring, self.props.len(), resolver)?;
                    self.index.insert(name, self.props.len());
                    self.props.push(property);
                }
            }
        }
        Ok(())
    }
}

fn frozen_error(declaring: &Type, name: &str) -> KilnError {
    KilnError::operation(
        "props",
        format!(
            "type '{}' is already configured; property '{}' cannot be declared",
            declaring, name
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassDef, TypeKind};
    use crate::spec::TypeRef;
    use serde_json::json;

    struct Fixed(Type);

    impl TypeResolver for Fixed {
        fn resolve_type(&self, _: &TypeRef) -> KilnResult<Type> {
            Ok(self.0.clone())
        }

        fn default_value_type(&self) -> Type {
            self.0.clone()
        }
    }

    fn complex() -> (Type, Fixed) {
        let value = Type::root("value", TypeKind::Value, true, Vec::new()).unwrap();
        let complex = value
            .extend_as(
                ClassDef {
                    id: Some("complex".into()),
                    ..ClassDef::default()
                },
                TypeKind::Complex,
                None,
            )
            .unwrap();
        (complex, Fixed(value))
    }

    #[test]
    fn test_list_form_preserves_order() {
        let (owner, resolver) = complex();
        let mut props = PropertyCollection::new();
        let spec = PropsSpec::from_json(&json!(["b", "a", {"name": "c"}])).unwrap();
        props.configure(spec, &owner, &resolver).unwrap();

        let names: Vec<_> = props.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(props.get("a").unwrap().index(), 1);
    }

    #[test]
    fn test_map_form_name_must_match_key() {
        let (owner, resolver) = complex();
        let mut props = PropertyCollection::new();

        let spec = PropsSpec::from_json(&json!({"a": {"name": "b"}})).unwrap();
        let err = props.configure(spec, &owner, &resolver).unwrap_err();
        assert!(matches!(err, KilnError::ArgumentInvalid { ref name, .. } if name == "props"));
        assert!(props.is_empty());

        let spec = PropsSpec::from_json(&json!({"a": {"name": "a"}, "b": {}})).unwrap();
        props.configure(spec, &owner, &resolver).unwrap();
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_subtype_overrides_in_place() {
        let (owner, resolver) = complex();
        let mut base = PropertyCollection::new();
        base.configure(PropsSpec::from_json(&json!(["a", "b"])).unwrap(), &owner, &resolver)
            .unwrap();

        let sub_owner = owner.extend(ClassDef::default()).unwrap();
        let mut sub = base.inherit();
        sub.configure(
            PropsSpec::from_json(&json!([{"name": "a", "label": "Alpha"}])).unwrap(),
            &sub_owner,
            &resolver,
        )
        .unwrap();

        let a = sub.get("a").unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(a.label(), "Alpha");
        assert_eq!(a.ancestor(), base.get("a"));
        assert_eq!(base.get("a").unwrap().label(), "A");
        assert_eq!(sub.get("b"), base.get("b"));
    }

    #[test]
    fn test_frozen_type_rejects_new_properties() {
        let (owner, resolver) = complex();
        let mut props = PropertyCollection::new();
        props.configure(PropsSpec::from_json(&json!(["a"])).unwrap(), &owner, &resolver)
            .unwrap();
        owner.freeze();

        let err = props
            .configure(PropsSpec::from_json(&json!(["z"])).unwrap(), &owner, &resolver)
            .unwrap_err();
        assert!(matches!(err, KilnError::OperationInvalid { .. }));

        // Value-level attributes stay configurable
        props
            .configure(
                PropsSpec::from_json(&json!([{"name": "a", "label": "Renamed"}])).unwrap(),
                &owner,
                &resolver,
            )
            .unwrap();
        assert_eq!(props.get("a").unwrap().label(), "Renamed");
    }

    #[test]
    fn test_rejects_non_collection_shape() {
        assert!(PropsSpec::from_json(&json!("a")).is_err());
    }
}
