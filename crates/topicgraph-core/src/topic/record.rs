//! Immutable tracked records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A keyed value carrying persistence metadata.
///
/// Records are never mutated in place. Collections replace a record with a
/// new one when its value, dirty state or version changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedRecord<T> {
    key: String,
    value: T,
    is_dirty: bool,
    last_modified: DateTime<Utc>,
}

/// A scalar attribute value.
pub type AttributeRecord = TrackedRecord<String>;

impl<T> TrackedRecord<T> {
    /// Create a new record.
    pub fn new(
        key: impl Into<String>,
        value: T,
        is_dirty: bool,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            is_dirty,
            last_modified,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

impl<T: Clone> TrackedRecord<T> {
    /// Returns a clean copy of this record, optionally stamped with a new version.
    pub fn to_clean(&self, version: Option<DateTime<Utc>>) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            is_dirty: false,
            last_modified: version.unwrap_or(self.last_modified),
        }
    }

    /// Returns a dirty copy of this record.
    pub fn to_dirty(&self) -> Self {
        Self {
            is_dirty: true,
            ..self.clone()
        }
    }
}
