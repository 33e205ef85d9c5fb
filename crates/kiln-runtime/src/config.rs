//! Configuration file (`kiln.toml` or `kiln.json`)
//!
//! ```toml
//! [modules]
//! root = "modules"
//! preload = ["acme/theme"]
//!
//! [loader.aliases]
//! "theme/default" = "acme/themes/light"
//!
//! [loader.instances."acme/themes/light"]
//! typeId = "acme/theme"
//! ranking = 1
//! ```

use std::path::{Path, PathBuf};

use kiln_engine::LoaderConfig;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Default configuration file name
pub const CONFIG_FILE: &str = "kiln.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    /// Aliases and known instances, consumed once by the loader
    pub loader: LoaderConfig,

    /// Where modules live
    pub modules: ModulesConfig,
}

/// Module directory settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Module root; relative paths are taken from the config file's directory
    pub root: PathBuf,

    /// Modules read at startup so synchronous resolution can see them
    pub preload: Vec<String>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("modules"),
            preload: Vec::new(),
        }
    }
}

impl KilnConfig {
    /// Read a configuration file; `.json` files are JSON, anything else TOML
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content)?
        } else {
            Self::from_str(&content)?
        };

        if config.modules.root.is_relative() {
            if let Some(dir) = path.parent() {
                config.modules.root = dir.join(&config.modules.root);
            }
        }
        Ok(config)
    }

    /// Parse TOML configuration
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, RuntimeError> {
        let config: KilnConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON configuration
    pub fn from_json_str(content: &str) -> Result<Self, RuntimeError> {
        let config: KilnConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RuntimeError> {
        self.loader
            .validate()
            .map_err(|err| RuntimeError::Config(err.to_string()))?;

        if self.modules.root.as_os_str().is_empty() {
            return Err(RuntimeError::Config(
                "modules.root cannot be empty".to_string(),
            ));
        }
        if let Some(id) = self.modules.preload.iter().find(|id| id.is_empty()) {
            return Err(RuntimeError::Config(format!(
                "modules.preload contains an empty module id '{}'",
                id
            )));
        }
        Ok(())
    }

    /// Locate a configuration file in `dir`
    pub fn find_in(dir: &Path) -> Option<PathBuf> {
        [CONFIG_FILE, "kiln.json"]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }
}
