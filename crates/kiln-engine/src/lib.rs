//! Kiln Engine
//!
//! Runtime type and instance resolution:
//! - **Class system**: type extension with explicit base-call wiring and mixins (`class` module)
//! - **Specification context**: temporary-id bindings for one root specification (`context` module)
//! - **Property model**: inheritance-aware property declarations (`property` module)
//! - **List model**: keyed lists with diff-based mutation (`list` module)
//! - **Loader**: sync/async type resolution, instance construction and ranked discovery (`loader` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_engine::{Loader, MemoryModules};
//! use serde_json::json;
//!
//! let loader = Loader::with_modules(MemoryModules::new())?;
//! let ty = loader.resolve_json(&json!({"base": "complex", "props": ["a", "b"]}))?;
//! assert_eq!(ty.property_count(), 2);
//!
//! let value = loader.get_instance(&json!({"a": "x"}), Some(&ty))?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

pub mod attr;
pub mod builtin;
pub mod class;
pub mod context;
pub mod error;
pub mod list;
pub mod loader;
pub mod module;
pub mod property;
pub mod spec;
pub mod value;

// ============================================================================
// Re-exports
// ============================================================================

pub use attr::Inheritable;
pub use builtin::{is_builtin, Builtins, BUILTIN_IDS};
pub use class::{
    ClassDef, Invocation, Member, MemberDef, PrimitiveKind, Receiver, Type, TypeAttrsPatch,
    TypeKind, TypeUid,
};
pub use context::{is_temporary_id, SpecificationContext, SpecificationScope, TEMPORARY_ID_PREFIX};
pub use error::{KilnError, KilnResult};
pub use list::{ListValue, SetOptions};
pub use loader::{
    InstanceFilter, InstanceInfo, InstanceQuery, InstanceRegistration, Loader, LoaderConfig,
};
pub use module::{MemoryModules, ModuleError, ModuleExport, ModuleProvider};
pub use property::{Property, PropertyCollection, PropertySpec, PropsSpec, TypeResolver};
pub use spec::{TypeRef, TypeSpec};
pub use value::{ComplexValue, Primitive, SimpleValue, Value};
