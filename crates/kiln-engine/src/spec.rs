//! Type references and generic type specifications
//!
//! A [`TypeRef`] is the serializable handle callers hand to the loader: an
//! identifier, an already-built type, a one-element list shorthand, or a
//! generic object specification ([`TypeSpec`]). Parsing only classifies the
//! shape; nothing is resolved here.

use serde_json::{Map, Value as Json};

use crate::class::{MemberDef, Type, TypeAttrsPatch};
use crate::error::{KilnError, KilnResult};
use crate::property::{PropertySpec, PropsSpec};

/// Reference to a type, classified by shape
#[derive(Debug, Clone)]
pub enum TypeRef {
    /// Permanent, alias or temporary identifier
    Id(String),
    /// Already-built type
    Type(Type),
    /// List of the referenced element type (`["x"]`)
    List(Box<TypeRef>),
    /// Generic object specification
    Spec(Box<TypeSpec>),
}

impl TypeRef {
    /// Classify a JSON type reference
    pub fn classify(json: &Json) -> KilnResult<TypeRef> {
        match json {
            Json::Null => Err(KilnError::required("typeRef")),
            Json::String(id) if id.is_empty() => Err(KilnError::required("typeRef")),
            Json::String(id) => Ok(TypeRef::Id(id.clone())),
            Json::Array(items) if items.len() == 1 => {
                Ok(TypeRef::List(Box::new(TypeRef::classify(&items[0])?)))
            }
            Json::Array(items) => Err(KilnError::invalid(
                "typeRef",
                format!(
                    "list shorthand must name exactly one element type, got {}",
                    items.len()
                ),
            )),
            Json::Object(_) => Ok(TypeRef::Spec(Box::new(TypeSpec::from_json(json)?))),
            other => Err(KilnError::invalid(
                "typeRef",
                format!("unsupported type reference {}", other),
            )),
        }
    }

    /// List of `element`
    pub fn list_of(element: impl Into<TypeRef>) -> TypeRef {
        TypeRef::List(Box::new(element.into()))
    }

    /// Identifier, if this is an id reference
    pub fn as_id(&self) -> Option<&str> {
        match self {
            TypeRef::Id(id) => Some(id),
            _ => None,
        }
    }
}

impl From<&str> for TypeRef {
    fn from(id: &str) -> Self {
        TypeRef::Id(id.to_string())
    }
}

impl From<String> for TypeRef {
    fn from(id: String) -> Self {
        TypeRef::Id(id)
    }
}

impl From<Type> for TypeRef {
    fn from(ty: Type) -> Self {
        TypeRef::Type(ty)
    }
}

impl From<&Type> for TypeRef {
    fn from(ty: &Type) -> Self {
        TypeRef::Type(ty.clone())
    }
}

impl From<TypeSpec> for TypeRef {
    fn from(spec: TypeSpec) -> Self {
        TypeRef::Spec(Box::new(spec))
    }
}

/// Generic object specification: `{id?, base?, of?, props?, mixins?, ...}`
///
/// Keys other than the structural ones and the type attributes are kept as
/// arbitrary configuration entries.
#[derive(Debug, Clone, Default)]
pub struct TypeSpec {
    /// Permanent or temporary identifier
    pub id: Option<String>,
    /// Base type; `complex` when absent
    pub base: Option<TypeRef>,
    /// Element type of list types
    pub of: Option<TypeRef>,
    /// Property declarations
    pub props: Option<PropsSpec>,
    /// Types whose members are mixed in
    pub mixins: Vec<TypeRef>,
    /// Whether direct instantiation is forbidden
    pub is_abstract: bool,
    /// Display attributes
    pub attrs: TypeAttrsPatch,
    /// Arbitrary configuration entries
    pub config: Map<String, Json>,
    /// Instance-level members (programmatic only)
    pub members: Vec<(String, MemberDef)>,
    /// Class-level members (programmatic only)
    pub statics: Vec<(String, MemberDef)>,
}

const STRUCTURAL_KEYS: [&str; 6] = ["id", "base", "of", "props", "mixins", "isAbstract"];

impl TypeSpec {
    /// Empty specification
    pub fn new() -> Self {
        Self::default()
    }

    /// `{base: list, of: element}`
    pub fn list_of(element: impl Into<TypeRef>) -> Self {
        Self {
            base: Some(TypeRef::from("list")),
            of: Some(element.into()),
            ..Self::default()
        }
    }

    /// Parse a JSON object specification
    pub fn from_json(json: &Json) -> KilnResult<Self> {
        let map = json.as_object().ok_or_else(|| {
            KilnError::invalid("typeRef", format!("expected a specification object, got {}", json))
        })?;

        let id = match map.get("id") {
            None | Some(Json::Null) => None,
            Some(Json::String(id)) if id.is_empty() => return Err(KilnError::required("id")),
            Some(Json::String(id)) => Some(id.clone()),
            Some(other) => {
                return Err(KilnError::invalid(
                    "id",
                    format!("expected a string, got {}", other),
                ))
            }
        };

        let optional_ref = |key: &str| -> KilnResult<Option<TypeRef>> {
            match map.get(key) {
                None | Some(Json::Null) => Ok(None),
                Some(json) => TypeRef::classify(json).map(Some),
            }
        };

        let mixins = match map.get("mixins") {
            None | Some(Json::Null) => Vec::new(),
            Some(Json::Array(items)) => items
                .iter()
                .map(TypeRef::classify)
                .collect::<KilnResult<Vec<_>>>()?,
            Some(single) => vec![TypeRef::classify(single)?],
        };

        let is_abstract = match map.get("isAbstract") {
            None | Some(Json::Null) => false,
            Some(Json::Bool(b)) => *b,
            Some(other) => {
                return Err(KilnError::invalid(
                    "isAbstract",
                    format!("expected a boolean, got {}", other),
                ))
            }
        };

        let props = match map.get("props") {
            None | Some(Json::Null) => None,
            Some(json) => Some(PropsSpec::from_json(json)?),
        };

        let mut config = Map::new();
        for (key, value) in map {
            if STRUCTURAL_KEYS.contains(&key.as_str()) || TypeAttrsPatch::KEYS.contains(&key.as_str()) {
                continue;
            }
            if key == "config" {
                match value {
                    Json::Object(entries) => config.extend(entries.clone()),
                    other => {
                        return Err(KilnError::invalid(
                            "config",
                            format!("expected an object, got {}", other),
                        ))
                    }
                }
            } else {
                config.insert(key.clone(), value.clone());
            }
        }

        Ok(Self {
            id,
            base: optional_ref("base")?,
            of: optional_ref("of")?,
            props,
            mixins,
            is_abstract,
            attrs: TypeAttrsPatch::from_map(map)?,
            config,
            members: Vec::new(),
            statics: Vec::new(),
        })
    }

    /// Set the identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the base type
    pub fn with_base(mut self, base: impl Into<TypeRef>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Set the element type
    pub fn with_of(mut self, element: impl Into<TypeRef>) -> Self {
        self.of = Some(element.into());
        self
    }

    /// Set the property declarations
    pub fn with_props(mut self, props: impl Into<PropsSpec>) -> Self {
        self.props = Some(props.into());
        self
    }

    /// Append a property declaration (list form)
    pub fn with_prop(mut self, prop: PropertySpec) -> Self {
        match &mut self.props {
            Some(PropsSpec::List(specs)) => specs.push(prop),
            Some(PropsSpec::Map(entries)) => {
                let key = prop.name.clone().unwrap_or_default();
                entries.push((key, prop));
            }
            None => self.props = Some(PropsSpec::List(vec![prop])),
        }
        self
    }

    /// Add a mixin
    pub fn with_mixin(mut self, mixin: impl Into<TypeRef>) -> Self {
        self.mixins.push(mixin.into());
        self
    }

    /// Mark abstract
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Add an instance-level member
    pub fn with_member(mut self, name: impl Into<String>, def: MemberDef) -> Self {
        self.members.push((name.into(), def));
        self
    }

    /// Add a class-level member
    pub fn with_static(mut self, name: impl Into<String>, def: MemberDef) -> Self {
        self.statics.push((name.into(), def));
        self
    }

    /// Whether this is just `{base?, of}`: an anonymous list of an element type
    pub fn is_list_shorthand(&self) -> bool {
        self.of.is_some()
            && self.id.is_none()
            && self.props.is_none()
            && self.mixins.is_empty()
            && !self.is_abstract
            && self.attrs.is_empty()
            && self.config.is_empty()
            && self.members.is_empty()
            && self.statics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_shapes() {
        assert!(matches!(TypeRef::classify(&json!("acme/a")).unwrap(), TypeRef::Id(_)));
        assert!(matches!(TypeRef::classify(&json!(["x"])).unwrap(), TypeRef::List(_)));
        assert!(matches!(
            TypeRef::classify(&json!({"base": "complex"})).unwrap(),
            TypeRef::Spec(_)
        ));
    }

    #[test]
    fn test_classify_errors() {
        assert_eq!(
            TypeRef::classify(&json!(null)).unwrap_err(),
            KilnError::required("typeRef")
        );
        assert_eq!(
            TypeRef::classify(&json!("")).unwrap_err(),
            KilnError::required("typeRef")
        );
        assert!(matches!(
            TypeRef::classify(&json!(["a", "b"])).unwrap_err(),
            KilnError::ArgumentInvalid { .. }
        ));
        assert!(matches!(
            TypeRef::classify(&json!(42)).unwrap_err(),
            KilnError::ArgumentInvalid { .. }
        ));
    }

    #[test]
    fn test_spec_keeps_unknown_keys_as_config() {
        let spec = TypeSpec::from_json(&json!({
            "id": "acme/order",
            "label": "Order",
            "icon": "cart",
            "config": {"pageSize": 20},
            "props": ["a"],
        }))
        .unwrap();

        assert_eq!(spec.id.as_deref(), Some("acme/order"));
        assert_eq!(spec.config.get("icon"), Some(&json!("cart")));
        assert_eq!(spec.config.get("pageSize"), Some(&json!(20)));
        assert!(!spec.config.contains_key("label"));
        assert!(spec.attrs.label.is_some());
        assert!(!spec.is_list_shorthand());
    }

    #[test]
    fn test_list_shorthand_detection() {
        assert!(TypeSpec::from_json(&json!({"base": "list", "of": "x"}))
            .unwrap()
            .is_list_shorthand());
        assert!(!TypeSpec::from_json(&json!({"base": "list", "of": "x", "id": "_:1"}))
            .unwrap()
            .is_list_shorthand());
        assert!(TypeSpec::list_of("x").is_list_shorthand());
    }

    #[test]
    fn test_single_mixin_accepted() {
        let spec = TypeSpec::from_json(&json!({"mixins": "acme/m"})).unwrap();
        assert_eq!(spec.mixins.len(), 1);
    }
}
