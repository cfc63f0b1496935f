//! Mapping of sqlx errors onto [`StorageError`].

use idbroker_storage::StorageError;

/// Pool and transport failures become `Connection`, anything else
/// `Internal`.
pub(crate) fn db_error(err: sqlx_core::Error) -> StorageError {
    match err {
        sqlx_core::Error::Io(_)
        | sqlx_core::Error::Tls(_)
        | sqlx_core::Error::PoolTimedOut
        | sqlx_core::Error::PoolClosed
        | sqlx_core::Error::WorkerCrashed => StorageError::connection(err.to_string()),
        other => StorageError::internal(other.to_string()),
    }
}

/// Like [`db_error`], but a unique violation becomes `AlreadyExists`.
pub(crate) fn insert_error(kind: &str, id: &str, err: sqlx_core::Error) -> StorageError {
    if let sqlx_core::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return StorageError::already_exists(kind, id);
    }
    db_error(err)
}
