//! Loader configuration

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::context::is_temporary_id;
use crate::error::{KilnError, KilnResult};

/// Known instance declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    /// Declared type id
    pub type_id: String,
    /// Priority; higher wins
    #[serde(default)]
    pub ranking: f64,
}

/// Options consumed once when a loader is built
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderConfig {
    /// Id translations applied before resolution
    pub aliases: IndexMap<String, String>,
    /// Known instances, in declaration order
    pub instances: IndexMap<String, InstanceInfo>,
}

impl LoaderConfig {
    /// Check aliases and instance declarations
    pub fn validate(&self) -> KilnResult<()> {
        for (alias, target) in &self.aliases {
            if alias.is_empty() || target.is_empty() {
                return Err(KilnError::invalid(
                    "aliases",
                    format!("alias '{}' -> '{}' has an empty side", alias, target),
                ));
            }
            if alias == target {
                return Err(KilnError::invalid(
                    "aliases",
                    format!("alias '{}' refers to itself", alias),
                ));
            }
            if is_temporary_id(alias) {
                return Err(KilnError::invalid(
                    "aliases",
                    format!("temporary id '{}' cannot be aliased", alias),
                ));
            }
        }

        for (id, info) in &self.instances {
            if id.is_empty() {
                return Err(KilnError::required("instances"));
            }
            if info.type_id.is_empty() {
                return Err(KilnError::invalid(
                    "instances",
                    format!("instance '{}' declares an empty type id", id),
                ));
            }
            if !info.ranking.is_finite() {
                return Err(KilnError::invalid(
                    "instances",
                    format!("instance '{}' has a non-finite ranking", id),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_camel_case() {
        let config: LoaderConfig = serde_json::from_value(json!({
            "aliases": {"order": "acme/order"},
            "instances": {
                "acme/b": {"typeId": "acme/order", "ranking": 2},
                "acme/a": {"typeId": "acme/order"},
            }
        }))
        .unwrap();

        assert_eq!(config.aliases["order"], "acme/order");
        let ids: Vec<_> = config.instances.keys().cloned().collect();
        assert_eq!(ids, vec!["acme/b", "acme/a"]);
        assert_eq!(config.instances["acme/a"].ranking, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_self_alias() {
        let mut config = LoaderConfig::default();
        config.aliases.insert("a".into(), "a".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_type_id() {
        let mut config = LoaderConfig::default();
        config.instances.insert(
            "x".into(),
            InstanceInfo {
                type_id: String::new(),
                ranking: 0.0,
            },
        );
        assert!(matches!(config.validate(), Err(KilnError::ArgumentInvalid { .. })));
    }
}
