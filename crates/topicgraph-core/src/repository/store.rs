//! The persistence seam.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::RepositoryError;
use crate::topic::Topic;

/// How a topic is addressed in a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicLookup {
    Id(i64),
    UniqueKey(String),
}

impl fmt::Display for TopicLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::UniqueKey(key) => f.write_str(key),
        }
    }
}

impl From<i64> for TopicLookup {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for TopicLookup {
    fn from(key: &str) -> Self {
        Self::UniqueKey(key.to_string())
    }
}

/// Trait for topic persistence backends.
///
/// Implementations only write what they are given; tree invariants,
/// schema checks and notifications are the repository's job.
#[async_trait]
pub trait TopicStore: Send + Sync {
    /// Load a topic with its ancestors, descendants and associations.
    async fn load(&self, lookup: &TopicLookup) -> Result<Option<Topic>, RepositoryError>;

    /// Load a detached copy of a topic's attributes as of `version`.
    async fn load_version(
        &self,
        id: i64,
        version: DateTime<Utc>,
    ) -> Result<Option<Topic>, RepositoryError>;

    /// Persist a topic's key, content type, position and attributes,
    /// returning its id. New topics receive a fresh id.
    async fn save(&self, topic: &Topic, version: DateTime<Utc>) -> Result<i64, RepositoryError>;

    /// Persist a topic's relationships and references.
    ///
    /// Called once every topic in a save batch has an id.
    async fn save_associations(&self, topic: &Topic) -> Result<(), RepositoryError>;

    /// Record that `topic` now sits beneath `target`, after `sibling`.
    async fn move_topic(
        &self,
        topic: &Topic,
        target: &Topic,
        sibling: Option<&Topic>,
    ) -> Result<(), RepositoryError>;

    /// Remove a topic and its descendants.
    async fn delete(&self, topic: &Topic) -> Result<(), RepositoryError>;
}

/// Resolve `lookup` within `scope`'s own graph, falling back to `store`.
pub async fn resolve_topic(
    store: &dyn TopicStore,
    scope: &Topic,
    lookup: &TopicLookup,
) -> Result<Option<Topic>, RepositoryError> {
    let root = scope.root();
    let local = match lookup {
        TopicLookup::Id(id) => std::iter::once(root.clone())
            .chain(root.descendants())
            .find(|t| t.id() == *id),
        TopicLookup::UniqueKey(key) => root.find_by_unique_key(key),
    };
    match local {
        Some(found) => Ok(Some(found)),
        None => store.load(lookup).await,
    }
}
