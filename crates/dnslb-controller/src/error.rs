use miette::Diagnostic;
use thiserror::Error;

/// Controller error type for platform calls and dispatch
#[derive(Error, Debug, Diagnostic)]
pub enum ControllerError {
    /// A platform API call failed
    #[error("API call '{operation}' failed: {message}")]
    #[diagnostic(
        code(dnslb::controller::api_error),
        help("Check that the API server named by the kubeconfig is reachable. The reconcile is requeued after --retry-delay")
    )]
    ApiError {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        message: String,
    },

    /// Status write for a service that is gone
    #[error("Service not found: {service}")]
    #[diagnostic(
        code(dnslb::controller::service_not_found),
        help("The service was deleted between the read and the status write; nothing to do")
    )]
    ServiceNotFound {
        #[allow(unused)]
        service: String,
    },

    /// A platform call ran past the reconcile deadline
    #[error("Deadline exceeded during '{operation}'")]
    #[diagnostic(
        code(dnslb::controller::deadline_exceeded),
        help("The API server is slow to respond. Raise --reconcile-timeout if this persists")
    )]
    DeadlineExceeded {
        #[allow(unused)]
        operation: String,
    },

    /// Work was cancelled by shutdown
    #[error("Cancelled during '{operation}'")]
    #[diagnostic(code(dnslb::controller::cancelled))]
    Cancelled {
        #[allow(unused)]
        operation: String,
    },

    /// The reflector feeding a store is gone
    #[error("Watch for {kind} closed: {message}")]
    #[diagnostic(
        code(dnslb::controller::watch_closed),
        help("The controller is shutting down or its watch stream was dropped")
    )]
    WatchClosed {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(dnslb::controller::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Core library error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] dnslb_core::DnslbError),

    /// Internal error
    #[error("Internal controller error: {message}")]
    #[diagnostic(
        code(dnslb::controller::internal_error),
        help("This is likely a bug in dnslb-controller. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;

impl ControllerError {
    pub fn api_error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApiError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn service_not_found(service: impl Into<String>) -> Self {
        Self::ServiceNotFound {
            service: service.into(),
        }
    }

    pub fn deadline_exceeded(operation: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn watch_closed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WatchClosed {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Whether the dispatch layer should retry the work that produced this error
    ///
    /// A vanished service and shutdown are terminal; everything else is treated
    /// as transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ControllerError::ServiceNotFound { .. }
                | ControllerError::Cancelled { .. }
                | ControllerError::InvalidConfig { .. }
        )
    }
}
