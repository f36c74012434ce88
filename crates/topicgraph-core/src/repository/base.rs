//! Save, move, delete and rollback orchestration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::error::RepositoryError;
use super::events::{RepositoryEvent, RepositoryEvents};
use super::store::{TopicLookup, TopicStore};
use crate::config::{Config, RepositoryConfig, DEFAULT_ROOT_KEY};
use crate::schema::{ContentTypeDescriptor, ContentTypeDescriptorCollection};
use crate::topic::{Topic, TopicKind, PARENT_ID_ATTRIBUTE, STRUCTURAL_ATTRIBUTES};

/// Applies schema and tree rules around a [`TopicStore`].
///
/// Each operation is a discrete transaction against the store. Writes to
/// one graph must be serialized by the caller.
pub struct TopicRepository<S: TopicStore> {
    store: Arc<S>,
    content_types: Arc<ContentTypeDescriptorCollection>,
    events: RepositoryEvents,
    config: RepositoryConfig,
    root_key: String,
}

impl<S: TopicStore> TopicRepository<S> {
    /// Creates a repository with the given store and schema registry.
    pub fn new(
        store: Arc<S>,
        content_types: Arc<ContentTypeDescriptorCollection>,
        config: RepositoryConfig,
    ) -> Self {
        let events = RepositoryEvents::new(config.event_capacity);
        Self {
            store,
            content_types,
            events,
            config,
            root_key: DEFAULT_ROOT_KEY.to_string(),
        }
    }

    /// Creates a repository using the repository section and root key of `config`.
    pub fn from_config(
        store: Arc<S>,
        content_types: Arc<ContentTypeDescriptorCollection>,
        config: &Config,
    ) -> Self {
        let mut repository = Self::new(store, content_types, config.repository.clone());
        repository.root_key = config.topics.root_key.clone();
        repository
    }

    pub fn root_key(&self) -> &str {
        &self.root_key
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub fn content_types(&self) -> Arc<ContentTypeDescriptorCollection> {
        Arc::clone(&self.content_types)
    }

    /// Subscribe to delete, move and rename notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.events.subscribe()
    }

    pub async fn load(&self, lookup: impl Into<TopicLookup>) -> Result<Option<Topic>, RepositoryError> {
        self.store.load(&lookup.into()).await
    }

    /// Load the root topic of the graph.
    pub async fn load_root(&self) -> Result<Option<Topic>, RepositoryError> {
        self.load(TopicLookup::UniqueKey(self.root_key.clone())).await
    }

    /// Load the configured content type root and register every
    /// descriptor beneath it. Returns the number registered.
    pub async fn load_content_types(&self) -> Result<usize, RepositoryError> {
        let lookup = TopicLookup::UniqueKey(self.config.content_type_root.clone());
        let Some(root) = self.store.load(&lookup).await? else {
            debug!(root = %self.config.content_type_root, "No content type root stored");
            return Ok(0);
        };
        let count = self.content_types.register_topics(&root)?;
        info!(count, "Registered content types");
        Ok(count)
    }

    /// Save `topic`, and its descendants when `is_recursive` is set.
    ///
    /// Topics that are persisted and clean are skipped. Every saved topic
    /// gets a new version.
    pub async fn save(&self, topic: &Topic, is_recursive: bool) -> Result<(), RepositoryError> {
        let mut batch = vec![topic.clone()];
        if is_recursive {
            batch.extend(topic.descendants());
        }
        batch.retain(|t| t.is_new() || t.is_dirty(true, false));
        if batch.is_empty() {
            debug!(topic = %topic.unique_key(), "Nothing to save");
            return Ok(());
        }

        let version = Utc::now();
        for topic in &batch {
            self.save_topic(topic, version).await?;
        }
        // Every topic in the batch has an id now.
        for topic in &batch {
            self.store.save_associations(topic).await?;
            let pending = UnsavedTargets::of(topic);
            topic.mark_clean(true, Some(version));
            pending.restore(topic);
            topic.add_version(version);
        }

        // Topics saved earlier may point at topics that only now have ids.
        for source in deferred_sources(&batch) {
            debug!(source = %source.unique_key(), "Saving deferred associations");
            self.store.save_associations(&source).await?;
            UnsavedTargets::of(&source).settle(&source);
        }
        info!(topic = %topic.unique_key(), count = batch.len(), "Saved topics");
        Ok(())
    }

    async fn save_topic(&self, topic: &Topic, version: DateTime<Utc>) -> Result<(), RepositoryError> {
        let content_type = topic.content_type();
        self.content_types.require(&content_type)?;

        if let Some(old_key) = topic.original_key() {
            let new_key = topic.key();
            if old_key != new_key && !topic.is_new() {
                debug!(old = %old_key, new = %new_key, "Topic renamed");
                self.events.publish(RepositoryEvent::Renamed {
                    topic: topic.clone(),
                    old_key,
                    new_key,
                });
            }
        }

        let parent_changed = topic
            .attribute(PARENT_ID_ATTRIBUTE)
            .is_some_and(|r| r.is_dirty());
        if parent_changed && !topic.is_new() {
            if let Some(parent) = topic.parent() {
                let sibling = topic.previous_sibling();
                self.events.publish(RepositoryEvent::Moved {
                    topic: topic.clone(),
                    source: None,
                    target: parent.clone(),
                });
                self.store
                    .move_topic(topic, &parent, sibling.as_ref())
                    .await?;
            }
        }

        topic.clear_original_key();
        topic.sync_parent_id();

        let id = self.store.save(topic, version).await?;
        if topic.is_new() {
            topic.set_id(id)?;
        }

        if topic.kind() == TopicKind::ContentTypeDescriptor {
            self.content_types
                .register(ContentTypeDescriptor::from_topic(topic)?);
        }
        debug!(topic = %topic.unique_key(), id, "Saved topic");
        Ok(())
    }

    /// Move `topic` beneath `target`, directly after `sibling` or first.
    ///
    /// Nothing happens if the topic is already in that position. The move
    /// is published and persisted before the in-memory tree changes, so a
    /// failed store call leaves the topic where it was.
    pub async fn move_topic(
        &self,
        topic: &Topic,
        target: &Topic,
        sibling: Option<&Topic>,
    ) -> Result<(), RepositoryError> {
        let source = topic.parent();
        let in_place = source.as_ref().is_some_and(|p| p.ptr_eq(target))
            && match (topic.previous_sibling(), sibling) {
                (None, None) => true,
                (Some(previous), Some(sibling)) => previous.ptr_eq(sibling),
                _ => false,
            };
        if in_place {
            debug!(topic = %topic.unique_key(), "Topic already in place");
            return Ok(());
        }

        topic.check_parent(target, sibling)?;
        self.events.publish(RepositoryEvent::Moved {
            topic: topic.clone(),
            source,
            target: target.clone(),
        });

        if !topic.is_new() {
            self.store.move_topic(topic, target, sibling).await?;
        }
        topic.set_parent(target, sibling)?;
        if !topic.is_new() {
            topic.sync_parent_id();
            topic.write().attributes.mark_key_clean(PARENT_ID_ATTRIBUTE, None);
        }
        info!(topic = %topic.unique_key(), "Moved topic");
        Ok(())
    }

    /// Delete `topic`. A topic with children must be deleted recursively.
    pub async fn delete(&self, topic: &Topic, is_recursive: bool) -> Result<(), RepositoryError> {
        if !is_recursive && topic.has_children() {
            return Err(RepositoryError::HasChildren(topic.unique_key()));
        }
        let unique_key = topic.unique_key();
        self.events.publish(RepositoryEvent::Deleted {
            topic: topic.clone(),
        });

        // Detach the subtree from topics that point into it.
        let mut subtree = vec![topic.clone()];
        subtree.extend(topic.descendants());
        for member in &subtree {
            for (key, source) in member.incoming_relationships().all() {
                if !subtree.iter().any(|t| t.ptr_eq(&source)) {
                    member.incoming_relationships().remove_value(&key, &source);
                }
            }
        }

        topic.detach();
        self.store.delete(topic).await?;
        info!(topic = %unique_key, "Deleted topic");
        Ok(())
    }

    /// Restore the attributes `topic` had at `version` and save the result
    /// as a new version.
    ///
    /// `Key`, `ContentType` and `ParentID` keep their current values.
    pub async fn rollback(&self, topic: &Topic, version: DateTime<Utc>) -> Result<(), RepositoryError> {
        if !topic.version_history().contains(&version) {
            return Err(RepositoryError::VersionNotFound {
                key: topic.unique_key(),
                version,
            });
        }
        let snapshot = self
            .store
            .load_version(topic.id(), version)
            .await?
            .ok_or_else(|| RepositoryError::SnapshotNotFound {
                key: topic.unique_key(),
                version,
            })?;

        let current = topic.attributes();
        let mut historical = snapshot.attributes();
        let changed: Vec<String> = historical
            .iter()
            .filter(|record| {
                current.get(record.key()).map(|c| c.value()) != Some(record.value())
            })
            .map(|record| record.key().to_string())
            .collect();
        for key in &changed {
            historical.mark_key_dirty(key);
        }
        // Attributes added since the version are removed by the rollback.
        let removed = current
            .keys()
            .filter(|key| !historical.contains_key(key))
            .count();
        if removed > 0 {
            topic.mark_dirty();
        }

        for key in STRUCTURAL_ATTRIBUTES {
            historical.remove(key);
            if let Some(record) = current.get(key) {
                historical.insert(record.clone());
            }
        }
        if changed.is_empty() && removed == 0 {
            warn!(topic = %topic.unique_key(), %version, "Rollback matches current attributes");
        }

        topic.replace_attributes(historical);
        info!(topic = %topic.unique_key(), %version, changed = changed.len(), "Rolled back topic");
        self.save(topic, false).await
    }
}

/// Association keys of a topic that name a target without an id.
///
/// The store can't persist those targets yet, so the keys stay dirty until
/// a later save resolves them.
#[derive(Debug, Default)]
struct UnsavedTargets {
    relationships: Vec<String>,
    references: Vec<String>,
}

impl UnsavedTargets {
    fn of(topic: &Topic) -> Self {
        let mut pending = Self::default();
        for (key, target) in topic.relationships().all() {
            if target.is_new() && !pending.relationships.contains(&key) {
                pending.relationships.push(key);
            }
        }
        for (key, target) in topic.references().all() {
            if target.is_new() {
                pending.references.push(key);
            }
        }
        pending
    }

    fn is_empty(&self) -> bool {
        self.relationships.is_empty() && self.references.is_empty()
    }

    /// Mark the pending keys dirty again after a full `mark_clean`.
    fn restore(&self, topic: &Topic) {
        if self.is_empty() {
            return;
        }
        warn!(
            topic = %topic.unique_key(),
            relationships = ?self.relationships,
            references = ?self.references,
            "Associations wait for unsaved targets"
        );
        for key in &self.relationships {
            topic.relationships().mark_key_dirty(key);
        }
        for key in &self.references {
            topic.references().mark_key_dirty(key);
        }
    }

    /// Mark every dirty association key clean except the pending ones.
    fn settle(&self, topic: &Topic) {
        for key in topic.relationships().dirty_keys() {
            if !self.relationships.contains(&key) {
                topic.relationships().mark_key_clean(&key);
            }
        }
        for key in topic.references().dirty_keys() {
            if !self.references.contains(&key) {
                topic.references().mark_key_clean(&key);
            }
        }
    }
}

/// Persisted topics outside `batch` with a dirty association pointing into it.
fn deferred_sources(batch: &[Topic]) -> Vec<Topic> {
    let mut sources: Vec<Topic> = Vec::new();
    for topic in batch {
        for (key, source) in topic.incoming_relationships().all() {
            let known = source.is_new()
                || batch.iter().any(|t| t.ptr_eq(&source))
                || sources.iter().any(|s| s.ptr_eq(&source));
            if known {
                continue;
            }
            if source.relationships().is_key_dirty(&key) || source.references().is_key_dirty(&key)
            {
                sources.push(source);
            }
        }
    }
    sources
}
