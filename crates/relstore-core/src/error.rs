//! Error Taxonomy
//!
//! The storage engine returns the same typed errors regardless of backend so
//! the REST layer can map them to status-coded responses without inspecting
//! SQL details. Background jobs log their failures instead of surfacing them.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The requested key is absent, or the specified resource version refers
    /// to no object.
    #[error("{0} not found")]
    NotFound(String),

    /// A create collided with a live object under the same key.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// An optimistic update or delete lost a race: the claimed resource
    /// version no longer names the current revision.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Validation failure.
    #[error("invalid: {0}")]
    Invalid(String),

    /// The client-supplied resource version has been compacted away; the
    /// watch or paginated list cannot be served.
    #[error("resource version {resource_version} has been compacted (watermark {watermark})")]
    Expired {
        resource_version: i64,
        watermark: i64,
    },

    /// Deadline exceeded during a database operation.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Uncategorized failure, always carrying the underlying cause.
    #[error("internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The database could not be reached or the connection pool is exhausted.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl Error {
    pub fn internal<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Error::Internal(err.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Error::Invalid(_))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Error::Expired { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::internal(err)
    }
}
