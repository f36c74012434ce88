//! Keyed attribute storage for a single topic.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::record::AttributeRecord;

/// Attribute holding the topic key.
pub const KEY_ATTRIBUTE: &str = "Key";
/// Attribute holding the content type name.
pub const CONTENT_TYPE_ATTRIBUTE: &str = "ContentType";
/// Attribute holding the id of the owning parent.
pub const PARENT_ID_ATTRIBUTE: &str = "ParentID";
/// Display title; falls back to the key when absent.
pub const TITLE_ATTRIBUTE: &str = "Title";
pub const IS_HIDDEN_ATTRIBUTE: &str = "IsHidden";
pub const IS_DISABLED_ATTRIBUTE: &str = "IsDisabled";
pub const LAST_MODIFIED_ATTRIBUTE: &str = "LastModified";
pub const LAST_MODIFIED_BY_ATTRIBUTE: &str = "LastModifiedBy";

/// Attributes that are excluded from dirty checks when `exclude_last_modified` is set.
const LAST_MODIFIED_KEYS: &[&str] = &[LAST_MODIFIED_ATTRIBUTE, LAST_MODIFIED_BY_ATTRIBUTE];

/// Attributes that are never rolled back to a historical version.
pub const STRUCTURAL_ATTRIBUTES: &[&str] =
    &[KEY_ATTRIBUTE, CONTENT_TYPE_ATTRIBUTE, PARENT_ID_ATTRIBUTE];

/// A keyed collection of [`AttributeRecord`]s.
///
/// Replacing a value with an identical one is a no-op: the existing record and
/// its dirty state are retained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeCollection {
    records: BTreeMap<String, AttributeRecord>,
}

impl AttributeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the record stored under `key`.
    pub fn get(&self, key: &str) -> Option<&AttributeRecord> {
        self.records.get(key)
    }

    /// Get the raw value stored under `key`.
    ///
    /// Empty values are treated as absent.
    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.records
            .get(key)
            .map(|r| r.value().as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Set a value, replacing any existing record.
    ///
    /// `is_dirty` defaults to `true` for changed values. Returns `true` if a new
    /// record was written.
    pub fn set_value(
        &mut self,
        key: &str,
        value: impl Into<String>,
        is_dirty: Option<bool>,
        version: Option<DateTime<Utc>>,
    ) -> bool {
        let value = value.into();

        if let Some(existing) = self.records.get(key) {
            if *existing.value() == value {
                // Explicitly marking an unchanged value dirty is still honoured.
                if is_dirty == Some(true) && !existing.is_dirty() {
                    let dirty = existing.to_dirty();
                    self.records.insert(key.to_string(), dirty);
                    return true;
                }
                return false;
            }
        }

        let record = AttributeRecord::new(
            key,
            value,
            is_dirty.unwrap_or(true),
            version.unwrap_or_else(Utc::now),
        );
        self.records.insert(key.to_string(), record);
        true
    }

    /// Insert a fully-formed record as-is.
    pub fn insert(&mut self, record: AttributeRecord) {
        self.records.insert(record.key().to_string(), record);
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeRecord> {
        self.records.remove(key)
    }

    /// Returns true if any record is dirty.
    pub fn is_dirty(&self, exclude_last_modified: bool) -> bool {
        self.records.values().any(|r| {
            r.is_dirty() && !(exclude_last_modified && LAST_MODIFIED_KEYS.contains(&r.key()))
        })
    }

    pub fn is_key_dirty(&self, key: &str) -> bool {
        self.records.get(key).is_some_and(|r| r.is_dirty())
    }

    /// Mark every record clean, stamping retained records with `version`.
    pub fn mark_clean(&mut self, version: Option<DateTime<Utc>>) {
        for record in self.records.values_mut() {
            if record.is_dirty() {
                *record = record.to_clean(version);
            }
        }
    }

    /// Mark a single record clean.
    pub fn mark_key_clean(&mut self, key: &str, version: Option<DateTime<Utc>>) {
        if let Some(record) = self.records.get_mut(key) {
            *record = record.to_clean(version);
        }
    }

    /// Mark a single record dirty without changing its value.
    pub fn mark_key_dirty(&mut self, key: &str) {
        if let Some(record) = self.records.get_mut(key) {
            *record = record.to_dirty();
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeRecord> {
        self.records.values()
    }

    /// Records that have changed since the last clean.
    pub fn dirty_records(&self) -> impl Iterator<Item = &AttributeRecord> {
        self.records.values().filter(|r| r.is_dirty())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<AttributeRecord> for AttributeCollection {
    fn from_iter<I: IntoIterator<Item = AttributeRecord>>(iter: I) -> Self {
        let mut collection = Self::new();
        for record in iter {
            collection.insert(record);
        }
        collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unchanged_value_is_not_dirty() {
        let mut attributes = AttributeCollection::new();
        attributes.set_value("Title", "Home", Some(false), None);

        assert!(!attributes.set_value("Title", "Home", None, None));
        assert!(!attributes.is_dirty(false));
    }

    #[test]
    fn test_changed_value_replaces_record() {
        let mut attributes = AttributeCollection::new();
        attributes.set_value("Title", "Home", Some(false), None);

        assert!(attributes.set_value("Title", "Welcome", None, None));
        assert_eq!(attributes.get_value("Title"), Some("Welcome"));
        assert!(attributes.is_key_dirty("Title"));
    }

    #[test]
    fn test_exclude_last_modified() {
        let mut attributes = AttributeCollection::new();
        attributes.set_value(LAST_MODIFIED_ATTRIBUTE, "2024-01-01", None, None);

        assert!(attributes.is_dirty(false));
        assert!(!attributes.is_dirty(true));
    }

    #[test]
    fn test_mark_clean_stamps_version() {
        let version = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut attributes = AttributeCollection::new();
        attributes.set_value("Title", "Home", None, None);
        attributes.set_value("Body", "Text", None, None);

        attributes.mark_clean(Some(version));

        assert!(!attributes.is_dirty(false));
        assert_eq!(attributes.get("Title").unwrap().last_modified(), version);
        assert_eq!(attributes.get("Body").unwrap().last_modified(), version);
    }

    #[test]
    fn test_empty_value_reads_as_absent() {
        let mut attributes = AttributeCollection::new();
        attributes.set_value("Title", "", None, None);
        assert!(attributes.contains_key("Title"));
        assert_eq!(attributes.get_value("Title"), None);
    }
}
