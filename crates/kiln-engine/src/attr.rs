//! Inheritable attribute values
//!
//! Display and validation attributes of types and properties are either set
//! explicitly on the owner or inherited from its ancestor, falling back to a
//! default at the root of the chain. The distinction is kept as a tag rather
//! than as an absent value, so an explicit empty string stays empty.

use serde_json::{Map, Value as Json};

use crate::error::{KilnError, KilnResult};

/// Explicit or inherited attribute value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Inheritable<T> {
    /// Defer to the ancestor, or to the default at the root
    #[default]
    Inherited,
    /// Value set on this owner
    Explicit(T),
}

impl<T: Clone> Inheritable<T> {
    /// Build from an optional value: `None` resets to inherited
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Inheritable::Explicit(v),
            None => Inheritable::Inherited,
        }
    }

    /// Explicit value, if set
    pub fn explicit(&self) -> Option<&T> {
        match self {
            Inheritable::Explicit(v) => Some(v),
            Inheritable::Inherited => None,
        }
    }

    /// Whether a value is set on this owner
    pub fn is_explicit(&self) -> bool {
        matches!(self, Inheritable::Explicit(_))
    }

    /// Explicit value, or whatever `inherit` yields
    pub fn resolve_or_else(&self, inherit: impl FnOnce() -> Option<T>) -> Option<T> {
        match self {
            Inheritable::Explicit(v) => Some(v.clone()),
            Inheritable::Inherited => inherit(),
        }
    }
}

/// Read a string attribute patch from a specification object.
///
/// Absent keys yield `None` (leave as is), `null` resets to inherited and a
/// string (empty or not) is stored verbatim.
pub(crate) fn string_patch(map: &Map<String, Json>, key: &str) -> KilnResult<Option<Inheritable<String>>> {
    match map.get(key) {
        None => Ok(None),
        Some(Json::Null) => Ok(Some(Inheritable::Inherited)),
        Some(Json::String(s)) => Ok(Some(Inheritable::Explicit(s.clone()))),
        Some(other) => Err(KilnError::invalid(
            key,
            format!("expected a string or null, got {}", other),
        )),
    }
}

/// Read a boolean attribute patch from a specification object.
pub(crate) fn bool_patch(map: &Map<String, Json>, key: &str) -> KilnResult<Option<Inheritable<bool>>> {
    match map.get(key) {
        None => Ok(None),
        Some(Json::Null) => Ok(Some(Inheritable::Inherited)),
        Some(Json::Bool(b)) => Ok(Some(Inheritable::Explicit(*b))),
        Some(other) => Err(KilnError::invalid(
            key,
            format!("expected a boolean or null, got {}", other),
        )),
    }
}

/// Read a count attribute patch from a specification object.
pub(crate) fn count_patch(map: &Map<String, Json>, key: &str) -> KilnResult<Option<Inheritable<u32>>> {
    match map.get(key) {
        None => Ok(None),
        Some(Json::Null) => Ok(Some(Inheritable::Inherited)),
        Some(Json::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(|n| Some(Inheritable::Explicit(n)))
            .ok_or_else(|| KilnError::invalid(key, format!("expected a non-negative count, got {}", n))),
        Some(other) => Err(KilnError::invalid(
            key,
            format!("expected a count or null, got {}", other),
        )),
    }
}

/// Apply an optional patch onto a slot
pub(crate) fn apply<T>(slot: &mut Inheritable<T>, patch: Option<Inheritable<T>>) {
    if let Some(value) = patch {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Json) -> Map<String, Json> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_string_patch_distinguishes_null_and_empty() {
        let map = obj(json!({"label": null, "description": ""}));

        assert_eq!(string_patch(&map, "label").unwrap(), Some(Inheritable::Inherited));
        assert_eq!(
            string_patch(&map, "description").unwrap(),
            Some(Inheritable::Explicit(String::new()))
        );
        assert_eq!(string_patch(&map, "category").unwrap(), None);
    }

    #[test]
    fn test_patch_type_mismatch() {
        let map = obj(json!({"isBrowsable": "yes", "countMin": -1}));
        assert!(bool_patch(&map, "isBrowsable").is_err());
        assert!(count_patch(&map, "countMin").is_err());
    }

    #[test]
    fn test_resolve_or_else() {
        let explicit = Inheritable::Explicit("a".to_string());
        let inherited: Inheritable<String> = Inheritable::Inherited;

        assert_eq!(explicit.resolve_or_else(|| Some("b".into())), Some("a".into()));
        assert_eq!(inherited.resolve_or_else(|| Some("b".into())), Some("b".into()));
    }
}
