//! Error types for connector operations.

use std::fmt;

/// Errors surfaced by connectors to the login layer.
///
/// [`ConnectorError::GroupPolicyViolation`] is kept apart from transport
/// failures so callers can render an authorization page instead of a
/// generic failure.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The upstream provider (or the user) declined the request.
    #[error("{}", upstream_message(.error, .description))]
    UpstreamRejected { error: String, description: String },

    /// The upstream could not be reached.
    #[error("{operation}: upstream unreachable: {message}")]
    UpstreamUnreachable { operation: String, message: String },

    /// The upstream answered with an unexpected status or body.
    #[error("{operation}: unexpected upstream response: {message}")]
    UpstreamMalformed { operation: String, message: String },

    /// The user logged in upstream but is not in an allowed group.
    #[error("user {username:?} is not in any of the required groups")]
    GroupPolicyViolation { username: String },

    /// Connector configuration or stored connector state is unusable.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The callback request is missing required parameters.
    #[error("invalid callback request: {message}")]
    InvalidRequest { message: String },

    #[error("{operation}: cancelled")]
    Cancelled { operation: String },

    #[error("{operation}: deadline exceeded")]
    DeadlineExceeded { operation: String },

    /// The upstream ID token failed verification.
    #[error("invalid id token: {message}")]
    InvalidIdToken { message: String },
}

fn upstream_message(error: &str, description: &str) -> String {
    if description.is_empty() {
        error.to_string()
    } else {
        format!("{error}: {description}")
    }
}

impl ConnectorError {
    #[must_use]
    pub fn upstream_rejected(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::UpstreamRejected {
            error: error.into(),
            description: description.into(),
        }
    }

    #[must_use]
    pub fn unreachable(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::UpstreamUnreachable {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn malformed(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::UpstreamMalformed {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn group_policy(username: impl Into<String>) -> Self {
        Self::GroupPolicyViolation {
            username: username.into(),
        }
    }

    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    #[must_use]
    pub fn deadline_exceeded(operation: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
        }
    }

    #[must_use]
    pub fn invalid_id_token(message: impl fmt::Display) -> Self {
        Self::InvalidIdToken {
            message: message.to_string(),
        }
    }

    /// Returns `true` if the user is authenticated but refused by group policy.
    #[must_use]
    pub fn is_group_policy_violation(&self) -> bool {
        matches!(self, Self::GroupPolicyViolation { .. })
    }

    /// Returns `true` if the upstream provider returned an OAuth error.
    #[must_use]
    pub fn is_upstream_rejection(&self) -> bool {
        matches!(self, Self::UpstreamRejected { .. })
    }

    /// Returns `true` for network, status and decode failures.
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnreachable { .. } | Self::UpstreamMalformed { .. }
        )
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UpstreamRejected { .. } => ErrorCategory::Rejected,
            Self::UpstreamUnreachable { .. } | Self::UpstreamMalformed { .. } => {
                ErrorCategory::Upstream
            }
            Self::GroupPolicyViolation { .. } => ErrorCategory::Policy,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::InvalidRequest { .. } | Self::InvalidIdToken { .. } => {
                ErrorCategory::Validation
            }
            Self::Cancelled { .. } | Self::DeadlineExceeded { .. } => ErrorCategory::Cancelled,
        }
    }
}

/// Categories of connector errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Rejected,
    Upstream,
    Policy,
    Configuration,
    Validation,
    Cancelled,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "rejected"),
            Self::Upstream => write!(f, "upstream"),
            Self::Policy => write!(f, "policy"),
            Self::Configuration => write!(f, "configuration"),
            Self::Validation => write!(f, "validation"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
