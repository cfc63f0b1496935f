//! Storage error types shared by every backend.

use std::error::Error as StdError;
use std::fmt;

/// Boxed cause carried by [`StorageError::Aborted`].
pub type AbortCause = Box<dyn StdError + Send + Sync + 'static>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record does not exist.
    #[error("Not found: {kind}/{id}")]
    NotFound {
        /// Entity kind, e.g. `AuthRequest`.
        kind: String,
        /// Primary key that was looked up.
        id: String,
    },

    /// A record with the same primary key already exists.
    #[error("Already exists: {kind}/{id}")]
    AlreadyExists {
        /// Entity kind, e.g. `AuthRequest`.
        kind: String,
        /// Primary key that collided.
        id: String,
    },

    /// An updater function refused the update. Nothing was written.
    #[error("Update aborted: {0}")]
    Aborted(#[source] AbortCause),

    /// Committing or rolling back a transaction failed.
    #[error("Transaction error: {message}")]
    Transaction {
        /// Description of the transaction failure.
        message: String,
    },

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend could not be reached.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// Any other backend failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Wraps an updater's own error so callers can recover it with
    /// [`StorageError::abort_cause`].
    #[must_use]
    pub fn aborted<E>(cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Aborted(Box::new(cause))
    }

    #[must_use]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` if an updater aborted the operation.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Returns the updater error if it is of type `E`.
    #[must_use]
    pub fn abort_cause<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Self::Aborted(cause) => cause.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Returns the error category for logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::Aborted(_) => ErrorCategory::Aborted,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::Serialization(_) => ErrorCategory::Internal,
            Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    Aborted,
    Transaction,
    Infrastructure,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Aborted => write!(f, "aborted"),
            Self::Transaction => write!(f, "transaction"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("token was replaced")]
    struct Replaced;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("AuthCode", "abc");
        assert_eq!(err.to_string(), "Not found: AuthCode/abc");

        let err = StorageError::already_exists("Client", "web");
        assert_eq!(err.to_string(), "Already exists: Client/web");

        let err = StorageError::aborted(Replaced);
        assert_eq!(err.to_string(), "Update aborted: token was replaced");
    }

    #[test]
    fn test_predicates() {
        assert!(StorageError::not_found("Keys", "keys").is_not_found());
        assert!(StorageError::already_exists("Client", "a").is_already_exists());
        assert!(StorageError::aborted(Replaced).is_aborted());
        assert!(!StorageError::internal("boom").is_not_found());
    }

    #[test]
    fn test_abort_cause_downcast() {
        let err = StorageError::aborted(Replaced);
        assert!(err.abort_cause::<Replaced>().is_some());
        assert!(err.abort_cause::<std::io::Error>().is_none());
        assert!(StorageError::internal("x").abort_cause::<Replaced>().is_none());
    }

    #[test]
    fn test_category() {
        assert_eq!(
            StorageError::already_exists("Password", "a@b").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::transaction("rollback failed").category(),
            ErrorCategory::Transaction
        );
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
    }
}
