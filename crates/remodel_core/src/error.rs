//! Domain error taxonomy shared by models and repositories.
//!
//! # Responsibility
//! - Give every persistence failure one of four stable kinds.
//! - Preserve the underlying transport/driver failure as `source()`.
//!
//! # Invariants
//! - Repositories translate their own failures into `ModelError`; nothing
//!   transport-specific escapes the repository boundary.
//! - Unrecognized failures are wrapped as `General`, never swallowed.

use serde_json::Value;
use std::error::Error as StdError;
use thiserror::Error;

/// Boxed failure kept as the cause of a domain error.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type ModelResult<T> = Result<T, ModelError>;

/// Coarse classification of a [`ModelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    General,
}

/// Error returned by model and repository operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Bad input or failed attribute rules.
    ///
    /// `details` carries the structured validation report when one exists:
    /// the rules engine error map for local validation, or the server body
    /// for a rejected HTTP save.
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
        #[source]
        source: Option<BoxError>,
    },
    #[error("{message}")]
    Authorization {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("{message}")]
    NotFound {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    /// Catch-all wrapper naming the failed operation and model type.
    #[error("{message}")]
    General {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ModelError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            source: None,
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::General {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an arbitrary failure as `General` with `message` as context.
    pub fn wrap(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::general(message).with_source(cause)
    }

    /// Attaches the underlying failure, replacing any previous one.
    pub fn with_source(mut self, cause: impl Into<BoxError>) -> Self {
        let cause = Some(cause.into());
        match &mut self {
            Self::Validation { source, .. }
            | Self::Authorization { source, .. }
            | Self::NotFound { source, .. }
            | Self::General { source, .. } => *source = cause,
        }
        self
    }

    /// Attaches structured validation details. No-op for other kinds.
    pub fn with_details(mut self, value: Value) -> Self {
        if let Self::Validation { details, .. } = &mut self {
            *details = Some(value);
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::General { .. } => ErrorKind::General,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::Authorization { message, .. }
            | Self::NotFound { message, .. }
            | Self::General { message, .. } => message,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Validation { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Message of the innermost cause, or this error's own message.
    pub fn root_cause_message(&self) -> String {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ModelError};
    use serde_json::json;
    use std::error::Error;
    use std::io;

    #[test]
    fn wrap_preserves_cause_chain() {
        let cause = io::Error::new(io::ErrorKind::Other, "socket closed");
        let err = ModelError::wrap("failed querying User", cause);

        assert_eq!(err.kind(), ErrorKind::General);
        assert_eq!(err.to_string(), "failed querying User");
        assert_eq!(err.source().expect("cause").to_string(), "socket closed");
        assert_eq!(err.root_cause_message(), "socket closed");
    }

    #[test]
    fn details_only_attach_to_validation() {
        let validation = ModelError::validation("bad").with_details(json!({"name": ["x"]}));
        assert_eq!(validation.details(), Some(&json!({"name": ["x"]})));

        let general = ModelError::general("boom").with_details(json!({}));
        assert!(general.details().is_none());
    }

    #[test]
    fn nested_model_errors_report_innermost_message() {
        let inner = ModelError::not_found("property not found");
        let outer = ModelError::wrap("unknown error updating User", inner);
        assert_eq!(outer.root_cause_message(), "property not found");
    }
}
