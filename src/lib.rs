//! # invcore - Inventory storage core
//!
//! Persists typed infrastructure resources (regions, sites, hosts,
//! instances, ...) as a directed relationship graph on SQLite and answers
//! structured queries against it.
//!
//! invcore provides:
//! - A filter expression compiler (parse, type-check, normalise, transpile to SQL)
//! - Hierarchical metadata inheritance along the physical and logical axes
//! - A resource lifecycle state machine with two-phase (soft/hard) deletion
//! - A SQLite-backed transaction executor and a small CLI (`invctl`)

pub mod kind;
pub mod resource;
pub mod schema;
pub mod filter;
pub mod transpile;
pub mod metadata;
pub mod lifecycle;
pub mod storage;
pub mod query;
pub mod mutation;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use kind::{ResourceId, ResourceKind};
pub use resource::{Context, Resource, ResourceView, Role};
pub use schema::Catalog;
pub use storage::SqliteStore;
pub use query::QueryEngine;

/// Result type alias for invcore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy surfaced to callers.
///
/// Every rejected request maps to exactly one of these kinds. None of them
/// is retried by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    AlreadyExists,
    PermissionDenied,
    Internal,
    Unimplemented,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::FailedPrecondition => "failed_precondition",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Internal => "internal",
            ErrorKind::Unimplemented => "unimplemented",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error types for invcore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unimplemented: {0}")]
    Unimplemented(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("request cancelled: {0}")]
    Cancelled(String),

    #[error("storage error: {0}")]
    Storage(#[source] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::FailedPrecondition(_) => ErrorKind::FailedPrecondition,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::Unimplemented(_) => ErrorKind::Unimplemented,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Internal(_) | Error::Storage(_) | Error::Serialization(_) | Error::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi;

        if let rusqlite::Error::SqliteFailure(code, ref msg) = err {
            let detail = msg.clone().unwrap_or_else(|| code.to_string());
            match code.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return Error::AlreadyExists(detail);
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return Error::FailedPrecondition(detail);
                }
                _ => {}
            }
        }
        Error::Storage(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_are_internal() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_unique_violation_maps_to_already_exists() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (name TEXT UNIQUE)", []).unwrap();
        conn.execute("INSERT INTO t VALUES ('a')", []).unwrap();
        let err: Error = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }
}
