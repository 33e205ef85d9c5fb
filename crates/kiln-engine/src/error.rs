//! Engine error types.
//!
//! Every failure raised by the class system, the property/list model or the
//! loader is one of four typed kinds. Each carries the name of the offending
//! parameter or operation so messages never degrade to "resolution failed".

use thiserror::Error;

/// Errors raised while declaring, resolving or instantiating types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KilnError {
    /// A mandatory reference or parameter was null or empty
    #[error("Argument required: '{name}'")]
    ArgumentRequired {
        /// Parameter name
        name: String,
    },

    /// A reference had an unsupported shape or violated a structural rule
    #[error("Argument invalid: '{name}': {reason}")]
    ArgumentInvalid {
        /// Parameter name
        name: String,
        /// Rule that was violated
        reason: String,
    },

    /// A runtime precondition of an operation did not hold
    #[error("Operation invalid: '{operation}': {reason}")]
    OperationInvalid {
        /// Operation name
        operation: String,
        /// Precondition that failed
        reason: String,
    },

    /// An abstract contract method was invoked without an override
    #[error("Not implemented: '{operation}'")]
    NotImplemented {
        /// Method name
        operation: String,
    },
}

impl KilnError {
    /// Build an [`KilnError::ArgumentRequired`]
    pub fn required(name: impl Into<String>) -> Self {
        KilnError::ArgumentRequired { name: name.into() }
    }

    /// Build an [`KilnError::ArgumentInvalid`]
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        KilnError::ArgumentInvalid {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Build an [`KilnError::OperationInvalid`]
    pub fn operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        KilnError::OperationInvalid {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Build an [`KilnError::NotImplemented`]
    pub fn not_implemented(operation: impl Into<String>) -> Self {
        KilnError::NotImplemented {
            operation: operation.into(),
        }
    }

    /// Name of the parameter or operation this error is about
    pub fn subject(&self) -> &str {
        match self {
            KilnError::ArgumentRequired { name } | KilnError::ArgumentInvalid { name, .. } => name,
            KilnError::OperationInvalid { operation, .. }
            | KilnError::NotImplemented { operation } => operation,
        }
    }
}

/// Engine result type
pub type KilnResult<T> = Result<T, KilnError>;
