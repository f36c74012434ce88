//! Single-valued, reciprocal references between topics.

use std::collections::BTreeMap;

use chrono::Utc;

use super::record::TrackedRecord;
use super::relationships::{RelationshipDirection, TopicRelationships};
use super::topic::{Topic, WeakTopic};

/// Reference naming the topic this one derives attribute values from.
pub const BASE_TOPIC_REFERENCE: &str = "BaseTopic";

type ReferenceRecord = TrackedRecord<Option<WeakTopic>>;

/// Raw storage for a topic's outgoing references.
///
/// A cleared reference keeps a record with no target until it is marked
/// clean, so persistence can observe the removal.
#[derive(Debug, Clone)]
pub struct ReferenceCollection {
    records: BTreeMap<String, ReferenceRecord>,
    is_fully_loaded: bool,
}

impl Default for ReferenceCollection {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            is_fully_loaded: true,
        }
    }
}

impl ReferenceCollection {
    pub fn get(&self, key: &str) -> Option<Topic> {
        self.records
            .get(key)
            .and_then(|r| r.value().as_ref())
            .and_then(WeakTopic::upgrade)
    }

    fn points_to(&self, key: &str, target: Option<&Topic>) -> bool {
        let current = self.records.get(key).and_then(|r| r.value().as_ref());
        match (current, target) {
            (Some(weak), Some(target)) => weak.points_to(target),
            (None, None) => true,
            _ => false,
        }
    }

    pub(crate) fn set(&mut self, key: &str, target: Option<&Topic>, is_dirty: bool) {
        let record = ReferenceRecord::new(
            key,
            target.map(Topic::downgrade),
            is_dirty,
            Utc::now(),
        );
        self.records.insert(key.to_string(), record);
    }

    /// Keys with a live target.
    pub fn keys(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|(_, r)| r.value().as_ref().and_then(WeakTopic::upgrade).is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.records.values().any(|r| r.is_dirty())
    }

    pub fn is_key_dirty(&self, key: &str) -> bool {
        self.records.get(key).is_some_and(|r| r.is_dirty())
    }

    pub fn dirty_keys(&self) -> Vec<String> {
        self.records
            .values()
            .filter(|r| r.is_dirty())
            .map(|r| r.key().to_string())
            .collect()
    }

    /// Mark every reference clean and drop records for cleared references.
    pub(crate) fn mark_clean(&mut self) {
        self.records.retain(|_, r| r.value().is_some());
        for record in self.records.values_mut() {
            if record.is_dirty() {
                *record = record.to_clean(None);
            }
        }
    }

    pub(crate) fn mark_key_clean(&mut self, key: &str) {
        if let Some(record) = self.records.get_mut(key) {
            if record.value().is_none() {
                self.records.remove(key);
            } else if record.is_dirty() {
                *record = record.to_clean(None);
            }
        }
    }

    pub(crate) fn mark_key_dirty(&mut self, key: &str) {
        if let Some(record) = self.records.get_mut(key) {
            *record = record.to_dirty();
        }
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.is_fully_loaded
    }

    pub(crate) fn set_fully_loaded(&mut self, value: bool) {
        self.is_fully_loaded = value;
    }
}

/// A view over a topic's references.
///
/// Setting a reference registers the owning topic in the target's incoming
/// relationships under the same key, and unregisters it from any previous
/// target.
pub struct TopicReferences<'a> {
    topic: &'a Topic,
}

impl<'a> TopicReferences<'a> {
    pub(crate) fn new(topic: &'a Topic) -> Self {
        Self { topic }
    }

    pub fn get_value(&self, key: &str) -> Option<Topic> {
        self.topic.read().references.get(key)
    }

    /// Point `key` at `target`, or clear it with `None`. Returns true if changed.
    pub fn set_value(&self, key: &str, target: Option<&Topic>) -> bool {
        self.set_value_with(key, target, true, false)
    }

    pub fn set_value_with(
        &self,
        key: &str,
        target: Option<&Topic>,
        is_dirty: bool,
        is_reciprocal: bool,
    ) -> bool {
        let previous = {
            let mut state = self.topic.write();
            if state.references.points_to(key, target) {
                return false;
            }
            let previous = state.references.get(key);
            state.references.set(key, target, is_dirty);
            previous
        };

        if !is_reciprocal {
            if let Some(previous) = previous {
                TopicRelationships::new(&previous, RelationshipDirection::Incoming)
                    .remove_value_with(key, self.topic, false, true);
            }
            if let Some(target) = target {
                TopicRelationships::new(target, RelationshipDirection::Incoming)
                    .set_value_with(key, self.topic, false, true);
            }
        }
        true
    }

    pub fn remove(&self, key: &str) -> bool {
        self.set_value(key, None)
    }

    /// Clear `key` only if it currently points at `target`.
    ///
    /// Used when the incoming half of a reference is removed from the target.
    pub(crate) fn clear_if_target(&self, key: &str, target: &Topic) {
        let matches = self.topic.read().references.points_to(key, Some(target));
        if matches {
            self.set_value_with(key, None, true, true);
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get_value(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.topic.read().references.keys()
    }

    /// Every `(key, target)` pair with a live target.
    pub fn all(&self) -> Vec<(String, Topic)> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.get_value(&key).map(|t| (key, t)))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.topic.read().references.is_dirty()
    }

    pub fn is_key_dirty(&self, key: &str) -> bool {
        self.topic.read().references.is_key_dirty(key)
    }

    pub fn dirty_keys(&self) -> Vec<String> {
        self.topic.read().references.dirty_keys()
    }

    pub fn mark_clean(&self) {
        self.topic.write().references.mark_clean();
    }

    pub fn mark_key_clean(&self, key: &str) {
        self.topic.write().references.mark_key_clean(key);
    }

    pub(crate) fn mark_key_dirty(&self, key: &str) {
        self.topic.write().references.mark_key_dirty(key);
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.topic.read().references.is_fully_loaded()
    }

    pub fn set_fully_loaded(&self, value: bool) {
        self.topic.write().references.set_fully_loaded(value);
    }
}
