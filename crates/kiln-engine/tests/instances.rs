//! Integration tests for instance construction and ranked discovery

use std::sync::Arc;

use futures::executor::block_on;
use kiln_engine::{
    InstanceInfo, InstanceQuery, KilnError, ListValue, Loader, LoaderConfig, MemoryModules,
    TypeSpec, Value,
};
use serde_json::json;

fn info(type_id: &str, ranking: f64) -> InstanceInfo {
    InstanceInfo {
        type_id: type_id.into(),
        ranking,
    }
}

/// Themes catalog: `light` and `dark` load, `broken` has no module
fn themes() -> (Loader, MemoryModules) {
    let modules = MemoryModules::new();
    modules.define_type("acme/theme", TypeSpec::from_json(&json!({"props": ["name"]})).unwrap());
    modules.define_type(
        "acme/darkTheme",
        TypeSpec::from_json(&json!({"base": "acme/theme"})).unwrap(),
    );
    modules.define_instance("acme/themes/light", json!({"name": "Light"}));
    modules.define_instance("acme/themes/dark", json!({"name": "Dark"}));

    let config = LoaderConfig {
        instances: [
            ("acme/themes/light".to_string(), info("acme/theme", 1.0)),
            ("acme/themes/dark".to_string(), info("acme/darkTheme", 5.0)),
            ("acme/themes/broken".to_string(), info("acme/theme", 10.0)),
        ]
        .into_iter()
        .collect(),
        ..LoaderConfig::default()
    };
    let loader = Loader::new(Arc::new(modules.clone()), config).unwrap();
    (loader, modules)
}

fn name_of(value: &Value) -> serde_json::Value {
    value.to_spec()["name"].clone()
}

#[test]
fn test_ranked_search_loads_subtype_buckets() {
    let (loader, _) = themes();
    assert!(loader.cached("acme/darkTheme").is_none());

    // darkTheme is loaded on demand, so the first search already ranks it
    let found = loader
        .find_instance(&InstanceQuery::new("acme/theme"))
        .unwrap()
        .unwrap();
    assert_eq!(name_of(&found), json!("Dark"));
    assert!(loader.cached("acme/darkTheme").is_some());

    loader.resolve_id("acme/darkTheme").unwrap();
    let again = loader
        .find_instance(&InstanceQuery::new("acme/theme"))
        .unwrap()
        .unwrap();
    assert!(again.same(&found));
}

#[test]
fn test_ranked_search_skips_unloadable_bucket_types() {
    let (loader, _) = themes();
    loader
        .register_instance("acme/themes/ghost", "acme/missingTheme", 50.0)
        .unwrap();

    let found = loader
        .find_instance(&InstanceQuery::new("acme/theme"))
        .unwrap()
        .unwrap();
    assert_eq!(name_of(&found), json!("Dark"));
    let ty = loader.resolve_id("acme/theme").unwrap();
    assert!(loader
        .registrations_of(&ty)
        .iter()
        .all(|r| r.id != "acme/themes/ghost"));
}

#[test]
fn test_async_ranked_search_sees_subtypes() {
    let (loader, _) = themes();
    let found = block_on(loader.find_instance_async(&InstanceQuery::new("acme/theme")))
        .unwrap()
        .unwrap();
    assert_eq!(name_of(&found), json!("Dark"));
}

#[test]
fn test_filtered_search() {
    let (loader, _) = themes();
    let query = InstanceQuery::new("acme/theme").with_filter(|v| v.to_spec()["name"] == "Light");
    let found = loader.find_instance(&query).unwrap().unwrap();
    assert_eq!(name_of(&found), json!("Light"));

    let none = InstanceQuery::new("acme/theme").with_filter(|_| false);
    assert!(loader.find_instance(&none).unwrap().is_none());

    let err = loader.find_instance(&none.required()).unwrap_err();
    assert!(matches!(err, KilnError::OperationInvalid { ref operation, .. } if operation == "getInstance"));
    assert!(err.to_string().contains("acme/themes/broken"));
}

#[test]
fn test_no_registrations() {
    let (loader, _) = themes();
    loader
        .resolve_json(&json!({"id": "acme/font", "props": ["family"]}))
        .unwrap();

    assert!(loader
        .find_instance(&InstanceQuery::new("acme/font"))
        .unwrap()
        .is_none());
    let err = loader
        .find_instance(&InstanceQuery::new("acme/font").required())
        .unwrap_err();
    assert!(err.to_string().contains("is available"));
}

#[test]
fn test_special_instance_by_id() {
    let (loader, _) = themes();
    let first = loader
        .get_instance(&json!({"$instance": {"id": "acme/themes/light"}}), None)
        .unwrap()
        .unwrap();
    let second = loader.instance_by_id("acme/themes/light").unwrap();

    assert!(first.same(&second));
    assert_eq!(first.value_type().id(), Some("acme/theme"));
}

#[test]
fn test_special_instance_by_type() {
    let (loader, _) = themes();
    let found = loader
        .get_instance(&json!({"$instance": {"type": "acme/theme", "isRequired": true}}), None)
        .unwrap()
        .unwrap();
    assert_eq!(name_of(&found), json!("Light"));

    let err = loader
        .get_instance(&json!({"$instance": {"isRequired": true}}), None)
        .unwrap_err();
    assert_eq!(err, KilnError::required("type"));
}

#[test]
fn test_special_instance_must_conform_to_base() {
    let (loader, _) = themes();
    let dark = loader.resolve_id("acme/darkTheme").unwrap();
    let err = loader
        .get_instance(&json!({"$instance": {"id": "acme/themes/light"}}), Some(&dark))
        .unwrap_err();
    assert!(matches!(err, KilnError::ArgumentInvalid { .. }));
}

#[test]
fn test_inline_typed_instance() {
    let (loader, _) = themes();
    let value = loader
        .get_instance(&json!({"_": "acme/darkTheme", "name": "Night"}), None)
        .unwrap()
        .unwrap();
    assert_eq!(value.value_type().id(), Some("acme/darkTheme"));
    assert_eq!(value.to_spec(), json!({"name": "Night"}));
}

#[test]
fn test_nested_references_in_properties() {
    let (loader, _) = themes();
    let ty = loader
        .resolve_json(&json!({"props": [{"name": "theme", "valueType": "acme/theme"}]}))
        .unwrap();
    let value = loader
        .create(&ty, &json!({"theme": {"$instance": {"id": "acme/themes/dark"}}}))
        .unwrap();

    let theme = value.as_complex().unwrap().get("theme").unwrap().unwrap();
    assert!(theme.same(&loader.instance_by_id("acme/themes/dark").unwrap()));
}

#[test]
fn test_primitives_default_their_type() {
    let (loader, _) = themes();
    let builtins = loader.builtins();

    let n = loader.get_instance(&json!(3), None).unwrap().unwrap();
    assert_eq!(n.value_type(), &builtins.number);

    let s = loader
        .get_instance(&json!("x"), Some(&builtins.value))
        .unwrap()
        .unwrap();
    assert_eq!(s.value_type(), &builtins.string);

    let err = loader
        .get_instance(&json!(true), Some(&builtins.string))
        .unwrap_err();
    assert!(matches!(err, KilnError::ArgumentInvalid { .. }));

    assert!(loader.get_instance(&json!(null), None).unwrap().is_none());
    assert!(loader.get_instance(&json!({"name": "x"}), None).is_err());
}

#[test]
fn test_create_rejects_abstract_and_unknown_props() {
    let (loader, _) = themes();
    let err = loader
        .create(&loader.builtins().simple, &json!("x"))
        .unwrap_err();
    assert!(matches!(err, KilnError::OperationInvalid { ref operation, .. } if operation == "create"));

    let theme = loader.resolve_id("acme/theme").unwrap();
    let err = loader.create(&theme, &json!({"color": "red"})).unwrap_err();
    assert!(matches!(err, KilnError::ArgumentInvalid { ref name, .. } if name == "color"));
}

#[test]
fn test_registered_at_runtime() {
    let (loader, modules) = themes();
    modules.define_instance("acme/themes/contrast", json!({"name": "Contrast"}));

    let registration = loader
        .register_instance("acme/themes/contrast", "acme/theme", 100.0)
        .unwrap();
    assert_eq!(registration.type_id, "acme/theme");

    let found = loader
        .find_instance(&InstanceQuery::new("acme/theme"))
        .unwrap()
        .unwrap();
    assert_eq!(name_of(&found), json!("Contrast"));

    assert!(loader
        .register_instance("acme/themes/contrast", "acme/theme", f64::NAN)
        .is_err());
    assert_eq!(
        loader.register_instance("", "acme/theme", 0.0).unwrap_err(),
        KilnError::required("id")
    );
}

#[test]
fn test_circular_instance_reference() {
    let (loader, modules) = themes();
    modules.define_instance("acme/loop", json!({"$instance": {"id": "acme/loop"}}));
    let err = loader.instance_by_id("acme/loop").unwrap_err();
    assert!(matches!(err, KilnError::ArgumentInvalid { .. }));
}

#[test]
fn test_validate_reports_cardinality() {
    let (loader, _) = themes();
    let ty = loader
        .resolve_json(&json!({
            "props": [
                {"name": "tags", "valueType": ["string"], "countMin": 1},
                {"name": "title", "valueType": "string", "countMin": 1},
                "note",
            ]
        }))
        .unwrap();

    let empty = loader.create(&ty, &json!({})).unwrap();
    let errors = empty.validate().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].starts_with("tags:"));
    assert!(errors[1].starts_with("title:"));

    let full = loader
        .create(&ty, &json!({"tags": ["a"], "title": "t"}))
        .unwrap();
    assert!(full.validate().unwrap().is_empty());
}

fn node_type(loader: &Loader) -> kiln_engine::Type {
    loader
        .resolve_json(&json!({
            "id": "_:node",
            "props": [
                {"name": "next", "valueType": "_:node"},
                {"name": "children", "valueType": ["_:node"]},
            ]
        }))
        .unwrap()
}

#[test]
fn test_instance_cannot_contain_itself() {
    let (loader, _) = themes();
    let ty = node_type(&loader);
    let a = loader.create(&ty, &json!({})).unwrap();
    let b = loader.create(&ty, &json!({})).unwrap();
    let node = a.as_complex().unwrap();

    let err = node.set("next", Some(a.clone())).unwrap_err();
    assert!(matches!(err, KilnError::ArgumentInvalid { .. }));

    b.as_complex().unwrap().set("next", Some(a.clone())).unwrap();
    assert!(node.set("next", Some(b.clone())).is_err());

    let looped = ListValue::new(node.list("children").unwrap().list_type().clone());
    looped.add([b.clone()]).unwrap();
    assert!(node.set("children", Some(looped.into())).is_err());
    assert!(node.get("next").unwrap().is_none());
    assert_eq!(node.list("children").unwrap().count(), 0);
}

#[test]
fn test_cycle_through_list_stays_finite() {
    let (loader, _) = themes();
    let ty = node_type(&loader);
    let a = loader.create(&ty, &json!({})).unwrap();
    let b = loader.create(&ty, &json!({})).unwrap();
    b.as_complex().unwrap().set("next", Some(a.clone())).unwrap();

    // The list API does not know its owner, so this closes the loop
    a.as_complex().unwrap().list("children").unwrap().add([b.clone()]).unwrap();

    assert!(a.validate().unwrap().is_empty());
    assert_eq!(a.to_spec(), json!({"children": [{}]}));
    assert_eq!(b.to_spec(), json!({"next": {"children": []}}));
    assert!(format!("{:?}", a).contains("children"));
}

#[test]
fn test_compare_contract() {
    let (loader, _) = themes();
    let one = loader.get_instance(&json!(1), None).unwrap().unwrap();
    assert_eq!(one.invoke("compare", &[json!(2)]).unwrap(), json!(-1));
    assert_eq!(one.invoke("compare", &[json!(1)]).unwrap(), json!(0));

    let theme = loader.instance_by_id("acme/themes/light").unwrap();
    assert_eq!(
        theme.invoke("compare", &[json!(1)]).unwrap_err(),
        KilnError::not_implemented("compare")
    );
}

#[test]
fn test_alias_applies_to_instances() {
    let modules = MemoryModules::new();
    modules.define_type("acme/theme", TypeSpec::from_json(&json!({"props": ["name"]})).unwrap());
    modules.define_instance("acme/themes/light", json!({"name": "Light"}));
    let config = LoaderConfig {
        aliases: [("theme/default".to_string(), "acme/themes/light".to_string())]
            .into_iter()
            .collect(),
        instances: [("acme/themes/light".to_string(), info("acme/theme", 0.0))]
            .into_iter()
            .collect(),
    };
    let loader = Loader::new(Arc::new(modules), config).unwrap();

    let aliased = loader.instance_by_id("theme/default").unwrap();
    assert!(aliased.same(&loader.instance_by_id("acme/themes/light").unwrap()));
}
