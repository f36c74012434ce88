//! Per-run cache of mapped topics.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::associations::AssociationTypes;
use super::model::ModelId;

/// What has already been mapped for one topic and model type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedTopicCacheEntry {
    pub model: ModelId,
    pub associations: AssociationTypes,
}

impl MappedTopicCacheEntry {
    /// Associations requested by `requested` that haven't been mapped yet.
    pub fn missing(&self, requested: AssociationTypes) -> AssociationTypes {
        requested - self.associations
    }
}

/// The outcome of reserving a topic in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub model: ModelId,
    /// Associations the caller is now responsible for mapping.
    pub missing: AssociationTypes,
    /// True if the model was allocated by this reservation.
    pub is_new: bool,
}

/// Maps persisted topic ids to the models built for them during one run.
///
/// An entry is created before the topic's associations are mapped, so a
/// cycle that leads back to the topic reuses the model in progress.
#[derive(Debug, Default)]
pub struct MappedTopicCache {
    entries: DashMap<(i64, String), MappedTopicCacheEntry>,
}

impl MappedTopicCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, topic_id: i64, model_type: &str) -> Option<MappedTopicCacheEntry> {
        self.entries
            .get(&(topic_id, model_type.to_string()))
            .map(|e| *e)
    }

    /// Reserve `(topic_id, model_type)` for `requested` associations.
    ///
    /// An existing entry absorbs the missing associations and hands them to
    /// the caller; otherwise `allocate` creates the model. Both happen under
    /// the entry's lock, so concurrent branches never map the same
    /// association twice.
    pub fn reserve(
        &self,
        topic_id: i64,
        model_type: &str,
        requested: AssociationTypes,
        allocate: impl FnOnce() -> ModelId,
    ) -> Reservation {
        match self.entries.entry((topic_id, model_type.to_string())) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let missing = entry.missing(requested);
                entry.associations |= missing;
                Reservation {
                    model: entry.model,
                    missing,
                    is_new: false,
                }
            }
            Entry::Vacant(vacant) => {
                let model = allocate();
                vacant.insert(MappedTopicCacheEntry {
                    model,
                    associations: requested,
                });
                Reservation {
                    model,
                    missing: requested,
                    is_new: true,
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::model::ModelArena;

    #[test]
    fn test_reserve_merges_missing_associations() {
        let arena = ModelArena::default();
        let cache = MappedTopicCache::new();

        let first = cache.reserve(1, "PageViewModel", AssociationTypes::CHILDREN, || {
            arena.allocate("PageViewModel", 1, "Page")
        });
        assert!(first.is_new);
        assert_eq!(first.missing, AssociationTypes::CHILDREN);

        let second = cache.reserve(
            1,
            "PageViewModel",
            AssociationTypes::CHILDREN | AssociationTypes::REFERENCES,
            || unreachable!("model already allocated"),
        );
        assert!(!second.is_new);
        assert_eq!(second.model, first.model);
        assert_eq!(second.missing, AssociationTypes::REFERENCES);

        let entry = cache.get(1, "PageViewModel").unwrap();
        assert_eq!(
            entry.associations,
            AssociationTypes::CHILDREN | AssociationTypes::REFERENCES
        );
    }

    #[test]
    fn test_model_types_are_cached_separately() {
        let arena = ModelArena::default();
        let cache = MappedTopicCache::new();
        cache.reserve(1, "PageViewModel", AssociationTypes::NONE, || {
            arena.allocate("PageViewModel", 1, "Page")
        });
        let other = cache.reserve(1, "PageTopicViewModel", AssociationTypes::NONE, || {
            arena.allocate("PageTopicViewModel", 1, "Page")
        });
        assert!(other.is_new);
        assert_eq!(cache.len(), 2);
    }
}
