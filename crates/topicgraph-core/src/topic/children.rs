//! Ordered child collection.

use super::topic::Topic;

/// An ordered collection of topics addressable by position or key.
///
/// Holds the strong references that give a tree its ownership: a topic
/// detached from every collection is dropped once callers release it.
#[derive(Debug, Clone, Default)]
pub struct KeyedTopicCollection {
    items: Vec<Topic>,
}

impl KeyedTopicCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Topic> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Topic> {
        self.items.iter()
    }

    /// Position of `topic` by identity.
    pub fn position(&self, topic: &Topic) -> Option<usize> {
        self.items.iter().position(|t| t.ptr_eq(topic))
    }

    pub fn contains(&self, topic: &Topic) -> bool {
        self.position(topic).is_some()
    }

    /// Find a child by key.
    ///
    /// Reads each child's key, so it must not be called while holding a lock
    /// on one of the children.
    pub fn find_by_key(&self, key: &str) -> Option<&Topic> {
        self.items.iter().find(|t| t.key() == key)
    }

    /// Insert at `index`, clamped to the end of the collection.
    pub fn insert(&mut self, index: usize, topic: Topic) {
        let index = index.min(self.items.len());
        self.items.insert(index, topic);
    }

    pub fn push(&mut self, topic: Topic) {
        self.items.push(topic);
    }

    /// Remove `topic` by identity, returning the position it occupied.
    pub fn remove(&mut self, topic: &Topic) -> Option<usize> {
        let index = self.position(topic)?;
        self.items.remove(index);
        Some(index)
    }

    pub fn to_vec(&self) -> Vec<Topic> {
        self.items.clone()
    }
}

impl IntoIterator for KeyedTopicCollection {
    type Item = Topic;
    type IntoIter = std::vec::IntoIter<Topic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
