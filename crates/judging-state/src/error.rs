//! Error types for judging-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the SurrealDB backend
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the storage traits.
///
/// `kind` names the entity table ("team", "judge", "score", ...) and `id`
/// its key, so callers can report exactly which record was involved.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("snapshot version conflict for {round}: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        round: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    #[error("integrity check failed for {kind} {id}: {reason}")]
    Integrity {
        kind: &'static str,
        id: String,
        reason: String,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(format!("serialization: {err}"))
    }
}
