//! Repository error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::schema::SchemaError;
use crate::topic::TopicError;

/// Errors raised by repository orchestration and stores.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Rollback to a version that isn't in the topic's history.
    #[error("Topic '{key}' has no version {version}")]
    VersionNotFound { key: String, version: DateTime<Utc> },

    /// The store has no snapshot for a version the topic lists.
    #[error("No snapshot of '{key}' at {version}")]
    SnapshotNotFound { key: String, version: DateTime<Utc> },

    /// Non-recursive delete of a topic that still has children.
    #[error("Topic '{0}' has children; delete it recursively")]
    HasChildren(String),

    #[error("Topic not found: {0}")]
    NotFound(String),

    /// A failure inside the store, passed through unchanged.
    #[error("Store error: {0}")]
    Store(String),
}
