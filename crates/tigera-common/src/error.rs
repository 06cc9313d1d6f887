//! Error types for the Tigera operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the resource or component it relates to so that a
//! degraded TigeraStatus can point the user at the object that needs fixing.

use thiserror::Error;

use crate::pki::PkiError;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A resource the reconciler depends on does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Kind of the missing resource (e.g., "Secret")
        kind: String,
        /// Name (or namespace/name) of the missing resource
        name: String,
    },

    /// Validation error for a custom resource or rendered configuration
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Resource with the invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
    },

    /// Certificate or key handling error
    #[error("certificate error for {name}: {message}")]
    Certificate {
        /// Name of the key pair or secret involved
        name: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Rendering a component's manifests failed
    #[error("render error [{component}]: {message}")]
    Render {
        /// Component being rendered (e.g., "manager")
        component: String,
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "status", "watcher")
        context: String,
    },
}

impl Error {
    /// Create a not-found error for a resource kind and name
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a validation error with the given message
    ///
    /// For simple validation errors without resource context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error with resource context
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a certificate error for a named key pair
    pub fn certificate(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Certificate {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a render error for a component
    pub fn render(component: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Render {
            component: component.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether this error means the requested object does not exist
    ///
    /// True for [`Error::NotFound`] and for API errors with a 404 status.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube { source } => crate::kube_utils::is_not_found(source),
            _ => false,
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, serialization and render errors need a configuration change.
    /// Kubernetes 4xx errors other than conflicts are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409
            ),
            Error::NotFound { .. } => true,
            Error::Validation { .. } => false,
            Error::Certificate { .. } => true,
            Error::Serialization { .. } => false,
            Error::Render { .. } => false,
            Error::Internal { .. } => true,
        }
    }
}

impl From<PkiError> for Error {
    fn from(e: PkiError) -> Self {
        Error::Certificate {
            name: UNKNOWN_CONTEXT.to_string(),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    // ==========================================================================
    // Story Tests: how reconcile failures are classified
    // ==========================================================================

    /// Story: a missing dependency is reported as not-found, whatever its source
    ///
    /// The reconciler asks the same question of typed and API errors before
    /// choosing between "waiting" and "degraded".
    #[test]
    fn story_missing_dependencies_are_not_found() {
        let err = Error::not_found("Secret", "tigera-operator/manager-tls");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Secret tigera-operator/manager-tls not found");

        let err = Error::from(api_error(404));
        assert!(err.is_not_found());

        let err = Error::from(api_error(500));
        assert!(!err.is_not_found());
    }

    /// Story: configuration mistakes are not retried, transient failures are
    #[test]
    fn story_retry_classification() {
        assert!(!Error::validation("auth type must be Token").is_retryable());
        assert!(!Error::render("manager", "bad replicas").is_retryable());
        assert!(!Error::serialization("bad json").is_retryable());

        assert!(Error::internal("status flush failed").is_retryable());
        assert!(Error::certificate("manager-tls", "expired").is_retryable());
        assert!(Error::from(api_error(503)).is_retryable());
        assert!(Error::from(api_error(409)).is_retryable());
        assert!(!Error::from(api_error(403)).is_retryable());
    }

    /// Story: structured errors carry the object they are about
    #[test]
    fn story_structured_errors_include_context() {
        let err = Error::validation_for("Manager/tigera-secure", "unsupported auth type");
        assert!(err.to_string().contains("Manager/tigera-secure"));

        let err = Error::internal_with_context("status", "patch failed");
        assert!(err.to_string().contains("[status]"));

        let err = Error::serialization_for_kind("Deployment", "missing field");
        match err {
            Error::Serialization { kind, .. } => assert_eq!(kind.as_deref(), Some("Deployment")),
            _ => panic!("Expected Serialization variant"),
        }
    }

    #[test]
    fn pki_errors_become_certificate_errors() {
        let err: Error = PkiError::ParseError("bad pem".to_string()).into();
        assert!(matches!(err, Error::Certificate { .. }));
        assert!(err.to_string().contains("bad pem"));
    }
}
