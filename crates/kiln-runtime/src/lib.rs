//! Kiln Runtime
//!
//! Binds the kiln engine to the file system: configuration files, a
//! directory of JSON modules, logging, and a [`Session`] that wires them into
//! a [`kiln_engine::Loader`].

pub mod config;
pub mod error;
pub mod logging;
pub mod modules;
pub mod session;

pub use config::{KilnConfig, ModulesConfig, CONFIG_FILE};
pub use error::RuntimeError;
pub use modules::DirectoryModules;
pub use session::{PropertySummary, Session, TypeSummary};
