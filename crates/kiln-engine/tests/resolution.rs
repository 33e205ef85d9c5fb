//! Integration tests for synchronous type resolution
//!
//! Covers identifiers, list shorthand, generic specifications, temporary ids
//! and sub-property rules through the public loader API.

use kiln_engine::{
    KilnError, Loader, MemberDef, MemoryModules, SpecificationContext, TypeRef, TypeSpec,
};
use serde_json::json;

/// Loader over a small module catalog
fn catalog() -> Loader {
    let modules = MemoryModules::new();
    let define = |id: &str, spec: serde_json::Value| {
        modules.define_type(id, TypeSpec::from_json(&spec).unwrap());
    };
    define("acme/x", json!({}));
    define("acme/animal", json!({"label": "Animal"}));
    define("acme/dog", json!({"base": "acme/animal"}));
    define("acme/rock", json!({}));
    define(
        "acme/owner",
        json!({"props": [{"name": "pet", "valueType": "acme/animal"}, "nickname"]}),
    );
    Loader::with_modules(modules).unwrap()
}

#[test]
fn test_resolving_an_id_twice_returns_the_same_type() {
    let loader = catalog();
    let first = loader.resolve_id("acme/owner").unwrap();
    let second = loader.resolve_json(&json!("acme/owner")).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.id(), Some("acme/owner"));
}

#[test]
fn test_list_shorthand_matches_explicit_list_spec() {
    let loader = catalog();
    let shorthand = loader.resolve_json(&json!(["acme/x"])).unwrap();
    let explicit = loader
        .resolve_json(&json!({"base": "list", "of": "acme/x"}))
        .unwrap();

    assert_eq!(shorthand, explicit);
    assert!(shorthand.is_list());
    assert_eq!(shorthand.element_type().and_then(|t| t.id().map(String::from)), Some("acme/x".into()));
}

#[test]
fn test_complex_spec_with_two_props() {
    let loader = catalog();
    let ty = loader
        .resolve_json(&json!({"base": "complex", "props": ["a", "b"]}))
        .unwrap();

    let props = ty.properties();
    assert_eq!(props.len(), 2);
    assert_eq!(props[0].name(), "a");
    assert_eq!(props[1].name(), "b");
    for prop in &props {
        assert_eq!(prop.value_type(), &loader.builtins().value);
        assert!(!prop.is_list());
        assert_eq!(prop.count_max(), Some(1));
    }
}

#[test]
fn test_map_form_props() {
    let loader = catalog();
    let ty = loader
        .resolve_json(&json!({"props": {"title": "string", "tags": ["string"], "pet": {"valueType": "acme/dog"}}}))
        .unwrap();

    assert_eq!(ty.property("title").unwrap().value_type(), &loader.builtins().string);
    assert!(ty.property("tags").unwrap().is_list());
    assert_eq!(ty.property("tags").unwrap().count_max(), None);
    assert_eq!(ty.property("pet").unwrap().value_type().id(), Some("acme/dog"));
}

#[test]
fn test_temporary_id_outside_specification() {
    let loader = catalog();
    let err = loader.resolve_json(&json!("_:1")).unwrap_err();
    assert!(matches!(err, KilnError::ArgumentInvalid { .. }));
    assert!(err.to_string().contains("cannot occur outside of a specification"));
    assert!(!SpecificationContext::is_active());
}

#[test]
fn test_temporary_id_shared_within_root_spec() {
    let loader = catalog();
    let ty = loader
        .resolve_json(&json!({
            "props": [
                {"name": "left", "valueType": {"id": "_:1", "props": ["v"]}},
                {"name": "right", "valueType": "_:1"},
                {"name": "again", "valueType": {"id": "_:1", "props": ["other"]}},
            ]
        }))
        .unwrap();

    let left = ty.property("left").unwrap().value_type().clone();
    assert_eq!(ty.property("right").unwrap().value_type(), &left);
    // The second declaration of `_:1` is ignored
    assert_eq!(ty.property("again").unwrap().value_type(), &left);
    assert!(left.property("v").is_some());
    assert!(left.property("other").is_none());
    assert!(left.id().is_none());
}

#[test]
fn test_temporary_id_self_reference() {
    let loader = catalog();
    let ty = loader
        .resolve_json(&json!({
            "id": "_:node",
            "props": [{"name": "children", "valueType": ["_:node"]}]
        }))
        .unwrap();

    let children = ty.property("children").unwrap();
    assert!(children.is_list());
    assert_eq!(children.element_type(), Some(ty));
}

#[test]
fn test_unbound_temporary_id_inside_spec() {
    let loader = catalog();
    let err = loader
        .resolve_json(&json!({"props": [{"name": "a", "valueType": "_:9"}]}))
        .unwrap_err();
    assert!(err.to_string().contains("does not correspond to an existing type"));
}

#[test]
fn test_each_root_spec_gets_its_own_context() {
    let loader = catalog();
    let spec = json!({"props": [{"name": "a", "valueType": {"id": "_:1", "props": ["v"]}}]});
    let first = loader.resolve_json(&spec).unwrap();
    let second = loader.resolve_json(&spec).unwrap();

    assert_ne!(first, second);
    assert_ne!(
        first.property("a").unwrap().value_type(),
        second.property("a").unwrap().value_type()
    );
}

#[test]
fn test_sub_property_narrowing() {
    let loader = catalog();
    let sub = loader
        .resolve_json(&json!({
            "base": "acme/owner",
            "props": [{"name": "pet", "valueType": "acme/dog", "label": "Dog"}]
        }))
        .unwrap();

    let owner = loader.resolve_id("acme/owner").unwrap();
    let pet = sub.property("pet").unwrap();
    assert_eq!(pet.value_type().id(), Some("acme/dog"));
    assert_eq!(pet.ancestor(), owner.property("pet").as_ref());
    assert_eq!(pet.label(), "Dog");
    assert_eq!(owner.property("pet").unwrap().label(), "Pet");
    // Inherited untouched properties are shared
    assert_eq!(sub.property("nickname"), owner.property("nickname"));
}

#[test]
fn test_sub_property_rejects_unrelated_type() {
    let loader = catalog();
    let err = loader
        .resolve_json(&json!({
            "base": "acme/owner",
            "props": [{"name": "pet", "valueType": "acme/rock"}]
        }))
        .unwrap_err();
    assert!(matches!(err, KilnError::ArgumentInvalid { ref name, .. } if name == "pet"));
}

#[test]
fn test_sub_property_rejects_cardinality_change() {
    let loader = catalog();
    let err = loader
        .resolve_json(&json!({
            "base": "acme/owner",
            "props": [{"name": "pet", "valueType": ["acme/animal"]}]
        }))
        .unwrap_err();
    assert!(matches!(err, KilnError::ArgumentInvalid { .. }));
    assert!(err.to_string().contains("cardinality"));
}

#[test]
fn test_failed_resolution_does_not_poison_cache() {
    let modules = MemoryModules::new();
    let loader = Loader::with_modules(modules.clone()).unwrap();

    assert!(loader.resolve_id("acme/late").is_err());
    modules.define_type("acme/late", TypeSpec::new());
    assert!(loader.resolve_id("acme/late").is_ok());
}

#[test]
fn test_permanent_spec_id_is_cached() {
    let loader = catalog();
    let ty = loader
        .resolve_json(&json!({"id": "acme/inline", "props": ["a"]}))
        .unwrap();
    assert_eq!(loader.resolve_id("acme/inline").unwrap(), ty);
    // Redeclaring a known id returns the cached type
    let again = loader
        .resolve_json(&json!({"id": "acme/inline", "props": ["zzz"]}))
        .unwrap();
    assert_eq!(again, ty);
}

#[test]
fn test_type_attributes_and_config() {
    let loader = catalog();
    let ty = loader
        .resolve_json(&json!({
            "id": "acme/orderLine",
            "description": "",
            "category": "Sales",
            "isBrowsable": false,
            "icon": "cart",
        }))
        .unwrap();

    assert_eq!(ty.label().as_deref(), Some("Order Line"));
    assert_eq!(ty.description().as_deref(), Some(""));
    assert_eq!(ty.category().as_deref(), Some("Sales"));
    assert!(!ty.is_browsable());
    assert_eq!(ty.config("icon"), Some(json!("cart")));

    let child = loader.resolve_json(&json!({"base": "acme/orderLine"})).unwrap();
    assert_eq!(child.category().as_deref(), Some("Sales"));
    assert_eq!(child.config("icon"), Some(json!("cart")));
}

#[test]
fn test_reconfigure_after_freeze() {
    let loader = catalog();
    let owner = loader.resolve_id("acme/owner").unwrap();

    loader
        .configure_type(
            &owner,
            &TypeSpec::from_json(&json!({"label": "Keeper", "props": [{"name": "pet", "label": "Animal"}]}))
                .unwrap(),
        )
        .unwrap();
    assert_eq!(owner.label().as_deref(), Some("Keeper"));
    assert_eq!(owner.property("pet").unwrap().label(), "Animal");

    let err = loader
        .configure_type(&owner, &TypeSpec::from_json(&json!({"props": ["extra"]})).unwrap())
        .unwrap_err();
    assert!(matches!(err, KilnError::OperationInvalid { .. }));

    let err = loader
        .configure_type(&owner, &TypeSpec::new().with_base("complex"))
        .unwrap_err();
    assert!(matches!(err, KilnError::OperationInvalid { .. }));
}

#[test]
fn test_programmatic_members_and_base_calls() {
    let loader = catalog();
    let base = loader
        .resolve_spec(
            &TypeSpec::new()
                .with_id("acme/greeter")
                .with_member("greet", MemberDef::method(|_, _| Ok(json!("hello")))),
        )
        .unwrap();
    let loud = loader
        .resolve_spec(&TypeSpec::new().with_base(&base).with_member(
            "greet",
            MemberDef::method(|inv, args| {
                let inner = inv.call_base(args)?;
                Ok(json!(inner.as_str().unwrap_or_default().to_uppercase()))
            }),
        ))
        .unwrap();

    let value = loader.create(&loud, &json!({})).unwrap();
    assert_eq!(value.invoke("greet", &[]).unwrap(), json!("HELLO"));

    let plain = loader.create(&base, &json!({})).unwrap();
    assert_eq!(plain.invoke("greet", &[]).unwrap(), json!("hello"));
}

#[test]
fn test_mixins_from_spec() {
    let loader = catalog();
    let mixin = loader
        .resolve_spec(
            &TypeSpec::new()
                .with_id("acme/tagged")
                .with_member("tag", MemberDef::field("mixed")),
        )
        .unwrap();
    let ty = loader
        .resolve_json(&json!({"base": "acme/owner", "mixins": ["acme/tagged"]}))
        .unwrap();

    assert!(!ty.is_subtype_of(&mixin));
    let value = loader.create(&ty, &json!({})).unwrap();
    assert_eq!(value.read_member("tag").unwrap(), json!("mixed"));
}

#[test]
fn test_rejected_shapes() {
    let loader = catalog();
    assert_eq!(
        loader.resolve_json(&json!(null)).unwrap_err(),
        KilnError::required("typeRef")
    );
    assert!(matches!(
        loader.resolve_json(&json!(7)).unwrap_err(),
        KilnError::ArgumentInvalid { .. }
    ));
    assert!(matches!(
        loader.resolve(&TypeRef::from("acme/missing")).unwrap_err(),
        KilnError::ArgumentInvalid { .. }
    ));
}
