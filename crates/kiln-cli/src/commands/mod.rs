//! Subcommand implementations

use std::path::PathBuf;

use anyhow::Context as _;
use kiln_runtime::{KilnConfig, Session};

pub mod check_config;
pub mod instance;
pub mod instances;
pub mod resolve;

/// Global options shared by every subcommand
pub struct Context {
    pub config: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub use_async: bool,
}

impl Context {
    /// Configuration file in effect, if any
    pub fn config_path(&self) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => std::env::current_dir()
                .ok()
                .and_then(|dir| KilnConfig::find_in(&dir)),
        }
    }

    /// Open a session from the configuration and `--root`
    pub fn session(&self) -> anyhow::Result<Session> {
        let mut config = match self.config_path() {
            Some(path) => KilnConfig::from_file(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            None => KilnConfig::default(),
        };
        if let Some(root) = &self.root {
            config.modules.root = root.clone();
        }
        Ok(Session::from_config(config)?)
    }
}
