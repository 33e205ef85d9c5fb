//! Builtin root types
//!
//! Every loader owns one set of roots:
//!
//! ```text
//! value (abstract)
//! ├── element (abstract)
//! │   ├── simple (abstract) ── string, number, boolean
//! │   └── complex
//! └── list
//! ```
//!
//! Their ids are standard-loaded and never requested from the module
//! provider.

use std::cmp::Ordering;

use serde_json::{json, Value as Json};

use crate::class::{ClassDef, Invocation, MemberDef, PrimitiveKind, Type, TypeKind};
use crate::error::{KilnError, KilnResult};
use crate::value::{Primitive, Value};

/// Ids of the builtin roots
pub const BUILTIN_IDS: [&str; 8] = [
    "value", "element", "simple", "string", "number", "boolean", "complex", "list",
];

/// Whether `id` names a builtin root
pub fn is_builtin(id: &str) -> bool {
    BUILTIN_IDS.contains(&id)
}

/// The builtin root types of one loader
#[derive(Debug, Clone)]
pub struct Builtins {
    /// Root of all types
    pub value: Type,
    /// Root of list element types
    pub element: Type,
    /// Root of primitive-backed types
    pub simple: Type,
    /// Text
    pub string: Type,
    /// Number
    pub number: Type,
    /// Truth value
    pub boolean: Type,
    /// Root of property-bearing types
    pub complex: Type,
    /// Root of list types
    pub list: Type,
}

impl Builtins {
    /// Build a fresh set of roots
    pub fn new() -> KilnResult<Self> {
        let value = Type::root(
            "value",
            TypeKind::Value,
            true,
            vec![("validate".into(), MemberDef::method(|_, _| Ok(json!([]))))],
        )?;

        let element = value.extend_as(
            ClassDef {
                id: Some("element".into()),
                is_abstract: true,
                members: vec![("compare".into(), MemberDef::abstract_method())],
                ..ClassDef::default()
            },
            TypeKind::Element,
            None,
        )?;

        let simple = element.extend_as(
            ClassDef {
                id: Some("simple".into()),
                is_abstract: true,
                members: vec![("compare".into(), MemberDef::method(compare_simple))],
                ..ClassDef::default()
            },
            TypeKind::Simple,
            None,
        )?;

        let primitive = |id: &str, kind: PrimitiveKind| {
            simple.extend_as(
                ClassDef {
                    id: Some(id.to_string()),
                    ..ClassDef::default()
                },
                TypeKind::Simple,
                Some(kind),
            )
        };
        let string = primitive("string", PrimitiveKind::String)?;
        let number = primitive("number", PrimitiveKind::Number)?;
        let boolean = primitive("boolean", PrimitiveKind::Boolean)?;

        let complex = element.extend_as(
            ClassDef {
                id: Some("complex".into()),
                members: vec![("validate".into(), MemberDef::method(validate_complex))],
                ..ClassDef::default()
            },
            TypeKind::Complex,
            None,
        )?;

        let list = value.extend_as(
            ClassDef {
                id: Some("list".into()),
                members: vec![("validate".into(), MemberDef::method(validate_list))],
                ..ClassDef::default()
            },
            TypeKind::List,
            None,
        )?;

        let builtins = Self {
            value,
            element,
            simple,
            string,
            number,
            boolean,
            complex,
            list,
        };
        for ty in builtins.all() {
            ty.freeze();
        }
        Ok(builtins)
    }

    /// All roots, in [`BUILTIN_IDS`] order
    pub fn all(&self) -> [&Type; 8] {
        [
            &self.value,
            &self.element,
            &self.simple,
            &self.string,
            &self.number,
            &self.boolean,
            &self.complex,
            &self.list,
        ]
    }

    /// Root type by id
    pub fn get(&self, id: &str) -> Option<&Type> {
        self.all().into_iter().find(|t| t.id() == Some(id))
    }

    /// Default simple type for a primitive family
    pub fn for_primitive(&self, kind: PrimitiveKind) -> &Type {
        match kind {
            PrimitiveKind::String => &self.string,
            PrimitiveKind::Number => &self.number,
            PrimitiveKind::Boolean => &self.boolean,
        }
    }
}

fn compare_simple(inv: &Invocation<'_>, args: &[Json]) -> KilnResult<Json> {
    let own = match inv.instance() {
        Some(Value::Simple(v)) => v.primitive().clone(),
        _ => return Err(KilnError::operation("compare", "receiver is not a simple value")),
    };
    let other = args
        .first()
        .ok_or_else(|| KilnError::required("other"))
        .and_then(|json| {
            Primitive::from_json(json)
                .ok_or_else(|| KilnError::invalid("other", format!("expected a primitive, got {}", json)))
        })?;

    match own.compare(&other) {
        Some(Ordering::Less) => Ok(json!(-1)),
        Some(Ordering::Equal) => Ok(json!(0)),
        Some(Ordering::Greater) => Ok(json!(1)),
        None => Err(KilnError::invalid(
            "other",
            format!("cannot compare a {} with a {}", own.kind(), other.kind()),
        )),
    }
}

fn validate_complex(inv: &Invocation<'_>, _: &[Json]) -> KilnResult<Json> {
    let complex = match inv.instance() {
        Some(Value::Complex(v)) => v,
        _ => return Ok(json!([])),
    };

    let mut errors = Vec::new();
    for property in complex_type(inv).properties() {
        let name = property.name();
        let values: Vec<Value> = match complex.get(name)? {
            Some(Value::List(list)) if property.is_list() => list.to_array(),
            Some(value) => vec![value],
            None => Vec::new(),
        };

        let count = values.len() as u32;
        if count < property.count_min() {
            errors.push(format!(
                "{}: requires at least {} value(s), has {}",
                name,
                property.count_min(),
                count
            ));
        }
        if let Some(max) = property.count_max() {
            if count > max {
                errors.push(format!("{}: allows at most {} value(s), has {}", name, max, count));
            }
        }

        for value in &values {
            for message in value.validate()? {
                errors.push(format!("{}: {}", name, message));
            }
        }
    }
    Ok(json!(errors))
}

fn validate_list(inv: &Invocation<'_>, _: &[Json]) -> KilnResult<Json> {
    let list = match inv.instance() {
        Some(Value::List(v)) => v,
        _ => return Ok(json!([])),
    };

    let mut errors = Vec::new();
    for (index, value) in list.to_array().iter().enumerate() {
        for message in value.validate()? {
            errors.push(format!("[{}]: {}", index, message));
        }
    }
    Ok(json!(errors))
}

fn complex_type<'a>(inv: &Invocation<'a>) -> &'a Type {
    inv.receiver().value_type()
}
