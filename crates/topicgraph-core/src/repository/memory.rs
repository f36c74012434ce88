//! An in-memory [`TopicStore`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::error::RepositoryError;
use super::store::{TopicLookup, TopicStore};
use crate::topic::{
    AttributeCollection, Topic, TopicFactory, PARENT_ID_ATTRIBUTE, UNIQUE_KEY_SEPARATOR,
};

#[derive(Debug, Clone, Default)]
struct StoredTopic {
    key: String,
    content_type: String,
    parent_id: Option<i64>,
    attributes: AttributeCollection,
    relationships: BTreeMap<String, Vec<i64>>,
    references: BTreeMap<String, i64>,
    versions: BTreeMap<DateTime<Utc>, AttributeCollection>,
}

#[derive(Debug, Default)]
struct StoreState {
    topics: HashMap<i64, StoredTopic>,
    /// Child ids per parent, in sibling order. `None` holds the roots.
    order: HashMap<Option<i64>, Vec<i64>>,
}

impl StoreState {
    fn place(&mut self, id: i64, parent_id: Option<i64>, after: Option<i64>) {
        for siblings in self.order.values_mut() {
            siblings.retain(|sibling| *sibling != id);
        }
        let siblings = self.order.entry(parent_id).or_default();
        let index = after
            .and_then(|after| siblings.iter().position(|s| *s == after))
            .map(|i| i + 1)
            .unwrap_or(0);
        siblings.insert(index, id);
    }

    fn subtree(&self, id: i64) -> Vec<i64> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(children) = self.order.get(&Some(id)) {
                stack.extend(children.iter().copied());
            }
            result.push(id);
        }
        result
    }

    /// Resolve a unique key against the stored tree.
    fn find_by_unique_key(&self, unique_key: &str) -> Option<i64> {
        let mut parent = None;
        for segment in unique_key.split(UNIQUE_KEY_SEPARATOR) {
            let id = self
                .order
                .get(&parent)?
                .iter()
                .copied()
                .find(|id| self.topics.get(id).is_some_and(|r| r.key == segment))?;
            parent = Some(id);
        }
        parent
    }

    /// Build every stored topic that has no live instance, attaching it
    /// beneath its live parent. Returns the topics created.
    fn materialize(&self, live: &mut HashMap<i64, Topic>) -> Result<Vec<Topic>, RepositoryError> {
        let mut created = Vec::new();
        for id in self.order.get(&None).into_iter().flatten() {
            self.materialize_subtree(*id, None, live, &mut created)?;
        }

        for topic in &created {
            let Some(record) = self.topics.get(&topic.id()) else {
                continue;
            };

            let mut complete = true;
            for (key, targets) in &record.relationships {
                for target in targets {
                    match live.get(target) {
                        Some(target) => {
                            topic.relationships().set_value_with(key, target, false, false);
                        }
                        None => complete = false,
                    }
                }
            }
            topic.relationships().set_fully_loaded(complete);

            let mut complete = true;
            for (key, target) in &record.references {
                match live.get(target) {
                    Some(target) => {
                        topic.references().set_value_with(key, Some(target), false, false);
                    }
                    None => complete = false,
                }
            }
            topic.references().set_fully_loaded(complete);
        }

        for topic in &created {
            topic.mark_clean(true, None);
        }
        Ok(created)
    }

    fn materialize_subtree(
        &self,
        id: i64,
        parent: Option<&Topic>,
        live: &mut HashMap<i64, Topic>,
        created: &mut Vec<Topic>,
    ) -> Result<(), RepositoryError> {
        let topic = match live.get(&id) {
            Some(topic) => topic.clone(),
            None => {
                let record = self
                    .topics
                    .get(&id)
                    .ok_or_else(|| RepositoryError::NotFound(TopicLookup::Id(id).to_string()))?;
                if let Some(existing) = parent.and_then(|p| p.find_child(&record.key)) {
                    warn!(
                        key = %record.key,
                        parent = %existing.unique_key(),
                        "Stored topic shadowed by an unsaved sibling"
                    );
                    return Ok(());
                }
                let topic =
                    TopicFactory::create_with_id(&record.key, &record.content_type, parent, id)?;
                topic.replace_attributes(record.attributes.clone());
                for version in record.versions.keys() {
                    topic.add_version(*version);
                }
                live.insert(id, topic.clone());
                created.push(topic.clone());
                topic
            }
        };

        for child in self.order.get(&Some(id)).into_iter().flatten() {
            self.materialize_subtree(*child, Some(&topic), live, created)?;
        }
        Ok(())
    }
}

/// Keeps topics in memory, with a snapshot of the attributes at each saved
/// version.
///
/// The store is also an identity map: every topic it saved or loaded stays
/// alive, and later loads hand back those same instances. Stored topics
/// without a live instance are rebuilt beneath their live parents.
#[derive(Debug)]
pub struct InMemoryTopicStore {
    next_id: AtomicI64,
    state: RwLock<StoreState>,
    live: Mutex<HashMap<i64, Topic>>,
}

impl Default for InMemoryTopicStore {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            state: RwLock::new(StoreState::default()),
            live: Mutex::new(HashMap::new()),
        }
    }
}

impl InMemoryTopicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored topics.
    pub fn len(&self) -> usize {
        self.state.read().topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().topics.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.state.read().topics.contains_key(&id)
    }

    /// Release every live topic. The next load rebuilds the stored graph.
    pub fn evict_all(&self) {
        self.live.lock().clear();
    }

    /// Saved versions of a topic, oldest first.
    pub fn versions(&self, id: i64) -> Vec<DateTime<Utc>> {
        self.state
            .read()
            .topics
            .get(&id)
            .map(|r| r.versions.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Stored relationship targets for `id` under `key`.
    pub fn stored_relationships(&self, id: i64, key: &str) -> Vec<i64> {
        self.state
            .read()
            .topics
            .get(&id)
            .and_then(|r| r.relationships.get(key).cloned())
            .unwrap_or_default()
    }

    fn require_saved(topic: &Topic) -> Result<i64, RepositoryError> {
        if topic.is_new() {
            return Err(RepositoryError::Store(format!(
                "'{}' has not been saved",
                topic.unique_key()
            )));
        }
        Ok(topic.id())
    }
}

/// The nearest earlier sibling that has been persisted.
fn previous_saved_sibling(topic: &Topic) -> Option<i64> {
    let parent = topic.parent()?;
    let siblings = parent.children();
    let index = siblings.iter().position(|s| s.ptr_eq(topic))?;
    siblings[..index]
        .iter()
        .rev()
        .find(|s| !s.is_new())
        .map(Topic::id)
}

#[async_trait]
impl TopicStore for InMemoryTopicStore {
    async fn load(&self, lookup: &TopicLookup) -> Result<Option<Topic>, RepositoryError> {
        let state = self.state.read();
        let id = match lookup {
            TopicLookup::Id(id) => state.topics.contains_key(id).then_some(*id),
            TopicLookup::UniqueKey(key) => state.find_by_unique_key(key),
        };
        let Some(id) = id else {
            debug!(%lookup, "Topic not stored");
            return Ok(None);
        };

        let mut live = self.live.lock();
        if let Some(topic) = live.get(&id) {
            return Ok(Some(topic.clone()));
        }
        let created = state.materialize(&mut live)?;
        debug!(%lookup, created = created.len(), "Loaded topic graph");
        Ok(live.get(&id).cloned())
    }

    async fn load_version(
        &self,
        id: i64,
        version: DateTime<Utc>,
    ) -> Result<Option<Topic>, RepositoryError> {
        let state = self.state.read();
        let Some(record) = state.topics.get(&id) else {
            return Ok(None);
        };
        let Some(snapshot) = record.versions.get(&version) else {
            return Ok(None);
        };
        let topic = TopicFactory::create_with_id(&record.key, &record.content_type, None, id)?;
        topic.replace_attributes(snapshot.clone());
        Ok(Some(topic))
    }

    async fn save(&self, topic: &Topic, version: DateTime<Utc>) -> Result<i64, RepositoryError> {
        let parent_id = match topic.parent() {
            Some(parent) => Some(Self::require_saved(&parent)?),
            None => None,
        };
        let after = previous_saved_sibling(topic);
        let mut attributes = topic.attributes();
        attributes.mark_clean(Some(version));

        let id = if topic.is_new() {
            self.next_id.fetch_add(1, Ordering::SeqCst)
        } else {
            topic.id()
        };

        let mut state = self.state.write();
        let record = state.topics.entry(id).or_default();
        record.key = topic.key();
        record.content_type = topic.content_type();
        record.parent_id = parent_id;
        record.versions.insert(version, attributes.clone());
        record.attributes = attributes;
        state.place(id, parent_id, after);
        drop(state);

        self.live.lock().insert(id, topic.clone());
        Ok(id)
    }

    async fn save_associations(&self, topic: &Topic) -> Result<(), RepositoryError> {
        let id = Self::require_saved(topic)?;

        let mut relationships: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for (key, target) in topic.relationships().all() {
            if target.is_new() {
                debug!(key = %key, target = %target.key(), "Deferring unsaved relationship target");
                continue;
            }
            relationships.entry(key).or_default().push(target.id());
        }
        let references: BTreeMap<String, i64> = topic
            .references()
            .all()
            .into_iter()
            .filter(|(_, target)| !target.is_new())
            .map(|(key, target)| (key, target.id()))
            .collect();
        let relationships_loaded = topic.relationships().is_fully_loaded();
        let references_loaded = topic.references().is_fully_loaded();

        let mut state = self.state.write();
        let record = state
            .topics
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(TopicLookup::Id(id).to_string()))?;

        // A partially loaded collection can't speak for targets it never saw.
        if relationships_loaded {
            record.relationships = relationships;
        } else {
            for (key, targets) in relationships {
                let stored = record.relationships.entry(key).or_default();
                for target in targets {
                    if !stored.contains(&target) {
                        stored.push(target);
                    }
                }
            }
        }
        if references_loaded {
            record.references = references;
        } else {
            record.references.extend(references);
        }
        Ok(())
    }

    async fn move_topic(
        &self,
        topic: &Topic,
        target: &Topic,
        sibling: Option<&Topic>,
    ) -> Result<(), RepositoryError> {
        let id = Self::require_saved(topic)?;
        let target_id = Self::require_saved(target)?;
        let after = sibling.filter(|s| !s.is_new()).map(Topic::id);

        let mut state = self.state.write();
        let record = state
            .topics
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(TopicLookup::Id(id).to_string()))?;
        record.parent_id = Some(target_id);
        record
            .attributes
            .set_value(PARENT_ID_ATTRIBUTE, target_id.to_string(), Some(false), None);
        state.place(id, Some(target_id), after);
        Ok(())
    }

    async fn delete(&self, topic: &Topic) -> Result<(), RepositoryError> {
        if topic.is_new() {
            return Ok(());
        }
        let mut state = self.state.write();
        let removed = state.subtree(topic.id());
        for id in &removed {
            state.topics.remove(id);
            state.order.remove(&Some(*id));
        }
        for siblings in state.order.values_mut() {
            siblings.retain(|id| !removed.contains(id));
        }
        {
            let mut live = self.live.lock();
            for id in &removed {
                live.remove(id);
            }
        }
        for record in state.topics.values_mut() {
            for targets in record.relationships.values_mut() {
                targets.retain(|id| !removed.contains(id));
            }
            record.references.retain(|_, id| !removed.contains(id));
        }
        debug!(count = removed.len(), "Deleted stored topics");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_assigns_ids_and_load_rebuilds() {
        let store = InMemoryTopicStore::new();
        let root = TopicFactory::create("Root", "Page", None).unwrap();
        let about = TopicFactory::create("About", "Page", Some(&root)).unwrap();
        let version = Utc::now();

        let root_id = store.save(&root, version).await.unwrap();
        root.set_id(root_id).unwrap();
        let about_id = store.save(&about, version).await.unwrap();
        about.set_id(about_id).unwrap();
        store.evict_all();

        let loaded = store
            .load(&TopicLookup::UniqueKey("Root:About".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.id(), about_id);
        assert_eq!(loaded.unique_key(), "Root:About");
        assert!(!loaded.is_dirty(true, false));
        assert_eq!(loaded.version_history(), vec![version]);
    }

    #[tokio::test]
    async fn test_load_returns_live_instances() {
        let store = InMemoryTopicStore::new();
        let version = Utc::now();
        let root = TopicFactory::create("Root", "Page", None).unwrap();
        let first = TopicFactory::create("First", "Page", Some(&root)).unwrap();
        for topic in [&root, &first] {
            let id = store.save(topic, version).await.unwrap();
            topic.set_id(id).unwrap();
        }
        store.evict_all();

        let lookup = TopicLookup::UniqueKey("Root:First".to_string());
        let loaded = store.load(&lookup).await.unwrap().unwrap();
        let root_again = store
            .load(&TopicLookup::UniqueKey("Root".to_string()))
            .await
            .unwrap()
            .unwrap();
        let loaded_again = store.load(&lookup).await.unwrap().unwrap();

        assert!(loaded.ptr_eq(&loaded_again));
        assert!(loaded.parent().unwrap().ptr_eq(&root_again));
        assert_eq!(loaded.unique_key(), "Root:First");
    }

    #[tokio::test]
    async fn test_load_version_returns_snapshot() {
        let store = InMemoryTopicStore::new();
        let page = TopicFactory::create("Page", "Page", None).unwrap();
        page.set_attribute("Title", "First").unwrap();
        let first = Utc::now();
        let id = store.save(&page, first).await.unwrap();
        page.set_id(id).unwrap();

        page.set_attribute("Title", "Second").unwrap();
        store.save(&page, first + chrono::Duration::seconds(1)).await.unwrap();

        let snapshot = store.load_version(id, first).await.unwrap().unwrap();
        assert_eq!(snapshot.get_value("Title").as_deref(), Some("First"));
        assert_eq!(store.versions(id).len(), 2);
    }

    #[tokio::test]
    async fn test_partially_loaded_relationships_are_merged() {
        let store = InMemoryTopicStore::new();
        let version = Utc::now();
        let root = TopicFactory::create("Root", "Page", None).unwrap();
        let a = TopicFactory::create("A", "Page", Some(&root)).unwrap();
        let b = TopicFactory::create("B", "Page", Some(&root)).unwrap();
        let c = TopicFactory::create("C", "Page", Some(&root)).unwrap();
        for topic in [&root, &a, &b, &c] {
            let id = store.save(topic, version).await.unwrap();
            topic.set_id(id).unwrap();
        }

        a.relationships().set_value("Related", &b);
        store.save_associations(&a).await.unwrap();

        a.relationships().clear("Related");
        a.relationships().set_value("Related", &c);
        a.relationships().set_fully_loaded(false);
        store.save_associations(&a).await.unwrap();

        assert_eq!(store.stored_relationships(a.id(), "Related"), vec![b.id(), c.id()]);
    }

    #[tokio::test]
    async fn test_delete_removes_subtree_and_dangling_relationships() {
        let store = InMemoryTopicStore::new();
        let version = Utc::now();
        let root = TopicFactory::create("Root", "Page", None).unwrap();
        let section = TopicFactory::create("Section", "Page", Some(&root)).unwrap();
        let page = TopicFactory::create("Page", "Page", Some(&section)).unwrap();
        for topic in [&root, &section, &page] {
            let id = store.save(topic, version).await.unwrap();
            topic.set_id(id).unwrap();
        }
        root.relationships().set_value("Featured", &page);
        store.save_associations(&root).await.unwrap();

        store.delete(&section).await.unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.stored_relationships(root.id(), "Featured").is_empty());
    }
}
