//! Topic graph error types.

use thiserror::Error;

/// Errors raised synchronously by topic construction and tree mutation.
///
/// None of these are retried: they signal a caller attempting to break an
/// invariant of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    /// The key contains characters outside `[A-Za-z0-9._-]`, or is empty.
    #[error("Invalid key '{0}': keys may only contain letters, numbers, '.', '_' and '-'")]
    InvalidKey(String),

    /// A topic was asked to become its own parent.
    #[error("Topic '{0}' cannot be its own parent")]
    SelfParent(String),

    /// The requested parent is a descendant of the topic being moved.
    #[error("Topic '{topic}' cannot be moved beneath its own descendant '{parent}'")]
    CyclicParent { topic: String, parent: String },

    /// The target parent already holds a different child with the same key.
    #[error("A topic with the key '{key}' already exists beneath '{parent}'")]
    DuplicateKey { key: String, parent: String },

    /// The identifier was already assigned and may not change.
    #[error("Topic '{key}' already has the id {current}; it cannot be changed to {requested}")]
    IdAlreadySet {
        key: String,
        current: i64,
        requested: i64,
    },

    /// The attribute is maintained by the graph itself and cannot be written directly.
    #[error("The '{0}' attribute is managed by the topic graph and cannot be set directly")]
    ReservedAttribute(String),

    /// The sibling given for positioning is not a child of the target parent.
    #[error("Topic '{sibling}' is not a child of '{parent}'")]
    SiblingNotFound { sibling: String, parent: String },
}
