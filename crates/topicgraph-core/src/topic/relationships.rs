//! Reciprocal, multi-valued relationships between topics.
//!
//! Every topic owns two [`RelationshipMultiMap`]s: outgoing relationships it
//! declares and incoming relationships other topics declare against it. The
//! [`TopicRelationships`] view keeps both halves in step: writing one side
//! writes the other, unless the call is itself the reciprocal half of an
//! update already in flight.

use std::collections::{BTreeMap, BTreeSet};

use super::topic::{Topic, WeakTopic};

/// Raw storage for one direction of a topic's relationships.
///
/// Targets are held weakly; ownership of topics belongs to the tree.
#[derive(Debug, Clone)]
pub struct RelationshipMultiMap {
    entries: BTreeMap<String, Vec<WeakTopic>>,
    dirty_keys: BTreeSet<String>,
    is_fully_loaded: bool,
}

impl Default for RelationshipMultiMap {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            dirty_keys: BTreeSet::new(),
            is_fully_loaded: true,
        }
    }
}

impl RelationshipMultiMap {
    /// Add `target` under `key`. Returns false if it was already present.
    pub(crate) fn insert(&mut self, key: &str, target: &Topic, is_dirty: bool) -> bool {
        let values = self.entries.entry(key.to_string()).or_default();
        values.retain(|w| w.upgrade().is_some());

        if values.iter().any(|w| w.points_to(target)) {
            return false;
        }

        values.push(target.downgrade());
        if is_dirty {
            self.dirty_keys.insert(key.to_string());
        }
        true
    }

    /// Remove `target` from `key`. Returns false if it was not present.
    pub(crate) fn remove(&mut self, key: &str, target: &Topic, is_dirty: bool) -> bool {
        let Some(values) = self.entries.get_mut(key) else {
            return false;
        };

        let removed = values.iter().any(|w| w.points_to(target));
        values.retain(|w| !w.points_to(target) && w.upgrade().is_some());

        if values.is_empty() {
            self.entries.remove(key);
        }
        if removed && is_dirty {
            self.dirty_keys.insert(key.to_string());
        }
        removed
    }

    pub(crate) fn mark_key_dirty(&mut self, key: &str) {
        self.dirty_keys.insert(key.to_string());
    }

    pub fn values(&self, key: &str) -> Vec<Topic> {
        self.entries
            .get(key)
            .map(|values| values.iter().filter_map(WeakTopic::upgrade).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str, target: &Topic) -> bool {
        self.entries
            .get(key)
            .is_some_and(|values| values.iter().any(|w| w.points_to(target)))
    }

    /// Keys with at least one live target.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, values)| values.iter().any(|w| w.upgrade().is_some()))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_keys.is_empty()
    }

    pub fn is_key_dirty(&self, key: &str) -> bool {
        self.dirty_keys.contains(key)
    }

    pub fn dirty_keys(&self) -> impl Iterator<Item = &str> {
        self.dirty_keys.iter().map(String::as_str)
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty_keys.clear();
    }

    pub(crate) fn mark_key_clean(&mut self, key: &str) {
        self.dirty_keys.remove(key);
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.is_fully_loaded
    }

    pub(crate) fn set_fully_loaded(&mut self, value: bool) {
        self.is_fully_loaded = value;
    }
}

/// Which of a topic's two relationship maps a view addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipDirection {
    Outgoing,
    Incoming,
}

impl RelationshipDirection {
    pub fn reverse(self) -> Self {
        match self {
            Self::Outgoing => Self::Incoming,
            Self::Incoming => Self::Outgoing,
        }
    }
}

/// A view over one direction of a topic's relationships.
///
/// Each call locks the owning topic only for the duration of the local write;
/// the reciprocal write on the other topic happens after that lock is released.
pub struct TopicRelationships<'a> {
    topic: &'a Topic,
    direction: RelationshipDirection,
}

impl<'a> TopicRelationships<'a> {
    pub(crate) fn new(topic: &'a Topic, direction: RelationshipDirection) -> Self {
        Self { topic, direction }
    }

    pub fn direction(&self) -> RelationshipDirection {
        self.direction
    }

    fn read<R>(&self, f: impl FnOnce(&RelationshipMultiMap) -> R) -> R {
        let state = self.topic.read();
        match self.direction {
            RelationshipDirection::Outgoing => f(&state.relationships),
            RelationshipDirection::Incoming => f(&state.incoming_relationships),
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut RelationshipMultiMap) -> R) -> R {
        let mut state = self.topic.write();
        match self.direction {
            RelationshipDirection::Outgoing => f(&mut state.relationships),
            RelationshipDirection::Incoming => f(&mut state.incoming_relationships),
        }
    }

    /// Relate this topic to `target` under `key`, marking the key dirty.
    pub fn set_value(&self, key: &str, target: &Topic) -> bool {
        self.set_value_with(key, target, true, false)
    }

    /// Relate this topic to `target` under `key`.
    ///
    /// `is_reciprocal` must be true only when this call is the second half of
    /// an update started on `target`; it suppresses the write back to `target`.
    pub fn set_value_with(
        &self,
        key: &str,
        target: &Topic,
        is_dirty: bool,
        is_reciprocal: bool,
    ) -> bool {
        // Only the outgoing side is persisted, so only it tracks dirtiness.
        let local_dirty = is_dirty && self.direction == RelationshipDirection::Outgoing;
        let inserted = self.write(|map| map.insert(key, target, local_dirty));

        if !is_reciprocal {
            TopicRelationships::new(target, self.direction.reverse())
                .set_value_with(key, self.topic, is_dirty, true);
        }
        inserted
    }

    /// Remove `target` from `key` on both sides.
    pub fn remove_value(&self, key: &str, target: &Topic) -> bool {
        self.remove_value_with(key, target, true, false)
    }

    pub fn remove_value_with(
        &self,
        key: &str,
        target: &Topic,
        is_dirty: bool,
        is_reciprocal: bool,
    ) -> bool {
        let local_dirty = is_dirty && self.direction == RelationshipDirection::Outgoing;
        let removed = self.write(|map| map.remove(key, target, local_dirty));

        if !is_reciprocal {
            TopicRelationships::new(target, self.direction.reverse())
                .remove_value_with(key, self.topic, is_dirty, true);

            // Incoming entries also mirror references declared by `target`.
            if self.direction == RelationshipDirection::Incoming {
                target.references().clear_if_target(key, self.topic);
            }
        }
        removed
    }

    /// Remove every target under `key`. The key is marked dirty even if empty.
    pub fn clear(&self, key: &str) {
        for target in self.get_values(key) {
            self.remove_value(key, &target);
        }
        if self.direction == RelationshipDirection::Outgoing {
            self.write(|map| map.mark_key_dirty(key));
        }
    }

    /// Remove every target under every key.
    pub fn clear_all(&self) {
        for key in self.keys() {
            self.clear(&key);
        }
    }

    pub fn get_values(&self, key: &str) -> Vec<Topic> {
        self.read(|map| map.values(key))
    }

    /// Find a related topic under `key` by its topic key.
    pub fn get_topic(&self, key: &str, topic_key: &str) -> Option<Topic> {
        self.get_values(key)
            .into_iter()
            .find(|t| t.key() == topic_key)
    }

    pub fn contains(&self, key: &str, target: &Topic) -> bool {
        self.read(|map| map.contains(key, target))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        !self.get_values(key).is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.read(|map| map.keys())
    }

    /// Every `(key, target)` pair.
    pub fn all(&self) -> Vec<(String, Topic)> {
        self.keys()
            .into_iter()
            .flat_map(|key| {
                self.get_values(&key)
                    .into_iter()
                    .map(move |t| (key.clone(), t))
            })
            .collect()
    }

    pub fn count(&self, key: &str) -> usize {
        self.get_values(key).len()
    }

    pub fn is_dirty(&self) -> bool {
        self.read(|map| map.is_dirty())
    }

    pub fn is_key_dirty(&self, key: &str) -> bool {
        self.read(|map| map.is_key_dirty(key))
    }

    pub fn dirty_keys(&self) -> Vec<String> {
        self.read(|map| map.dirty_keys().map(str::to_string).collect())
    }

    pub fn mark_clean(&self) {
        self.write(|map| map.mark_clean());
    }

    pub fn mark_key_clean(&self, key: &str) {
        self.write(|map| map.mark_key_clean(key));
    }

    pub(crate) fn mark_key_dirty(&self, key: &str) {
        self.write(|map| map.mark_key_dirty(key));
    }

    /// False when a partial load could not resolve every stored target.
    pub fn is_fully_loaded(&self) -> bool {
        self.read(|map| map.is_fully_loaded())
    }

    pub fn set_fully_loaded(&self, value: bool) {
        self.write(|map| map.set_fully_loaded(value));
    }
}
