//! The topic node and its tree mutation rules.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::attributes::{
    AttributeCollection, CONTENT_TYPE_ATTRIBUTE, IS_DISABLED_ATTRIBUTE, IS_HIDDEN_ATTRIBUTE,
    KEY_ATTRIBUTE, LAST_MODIFIED_ATTRIBUTE, PARENT_ID_ATTRIBUTE, TITLE_ATTRIBUTE,
};
use super::children::KeyedTopicCollection;
use super::error::TopicError;
use super::factory::TopicKind;
use super::key::validate_key;
use super::record::AttributeRecord;
use super::references::{ReferenceCollection, TopicReferences, BASE_TOPIC_REFERENCE};
use super::relationships::{RelationshipDirection, RelationshipMultiMap, TopicRelationships};
use crate::config::DEFAULT_MAX_INHERITANCE_HOPS;
use crate::mapping::coercion::parse_bool;

/// Id carried by topics that have never been persisted.
pub const UNSAVED_ID: i64 = -1;

/// Separator between keys in a unique key.
pub const UNIQUE_KEY_SEPARATOR: char = ':';

/// Where a topic lands among its new siblings.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Placement<'a> {
    Start,
    After(&'a Topic),
    End,
}

pub(crate) struct TopicState {
    pub(crate) id: i64,
    pub(crate) key: String,
    pub(crate) original_key: Option<String>,
    pub(crate) content_type: String,
    pub(crate) kind: TopicKind,
    pub(crate) parent: Option<WeakTopic>,
    pub(crate) children: KeyedTopicCollection,
    pub(crate) is_dirty: bool,
    pub(crate) attributes: AttributeCollection,
    pub(crate) relationships: RelationshipMultiMap,
    pub(crate) incoming_relationships: RelationshipMultiMap,
    pub(crate) references: ReferenceCollection,
    pub(crate) version_history: Vec<DateTime<Utc>>,
}

struct TopicInner {
    state: RwLock<TopicState>,
}

/// A node in the topic tree.
///
/// `Topic` is a cheap, clonable handle; clones address the same node and
/// compare equal by identity. A topic is owned by its parent's children;
/// relationships, references and the parent pointer are weak.
///
/// No method holds a lock on one topic while acquiring a lock on another,
/// so handles can be shared across concurrent mapping branches.
#[derive(Clone)]
pub struct Topic {
    inner: Arc<TopicInner>,
}

/// A non-owning handle to a [`Topic`].
#[derive(Clone)]
pub struct WeakTopic {
    inner: Weak<TopicInner>,
}

impl WeakTopic {
    pub fn upgrade(&self) -> Option<Topic> {
        self.inner.upgrade().map(|inner| Topic { inner })
    }

    /// True if this handle addresses `topic`.
    pub fn points_to(&self, topic: &Topic) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Arc::as_ptr(&topic.inner))
    }
}

impl fmt::Debug for WeakTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(topic) => write!(f, "WeakTopic({})", topic.key()),
            None => f.write_str("WeakTopic(<dropped>)"),
        }
    }
}

impl Topic {
    /// Construct a detached topic. Callers go through [`super::TopicFactory`].
    pub(crate) fn new_detached(key: &str, content_type: &str, id: i64) -> Self {
        let mut attributes = AttributeCollection::new();
        attributes.set_value(KEY_ATTRIBUTE, key, Some(true), None);
        attributes.set_value(CONTENT_TYPE_ATTRIBUTE, content_type, Some(true), None);

        let state = TopicState {
            id,
            key: key.to_string(),
            original_key: None,
            content_type: content_type.to_string(),
            kind: TopicKind::from_content_type(content_type),
            parent: None,
            children: KeyedTopicCollection::new(),
            is_dirty: false,
            attributes,
            relationships: RelationshipMultiMap::default(),
            incoming_relationships: RelationshipMultiMap::default(),
            references: ReferenceCollection::default(),
            version_history: Vec::new(),
        };

        Self {
            inner: Arc::new(TopicInner {
                state: RwLock::new(state),
            }),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, TopicState> {
        self.inner.state.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, TopicState> {
        self.inner.state.write()
    }

    pub fn downgrade(&self) -> WeakTopic {
        WeakTopic {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Topic) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    pub fn id(&self) -> i64 {
        self.read().id
    }

    /// Assign the persisted identifier. Once non-negative it cannot change.
    pub fn set_id(&self, id: i64) -> Result<(), TopicError> {
        let mut state = self.write();
        if state.id == id {
            return Ok(());
        }
        if state.id >= 0 {
            return Err(TopicError::IdAlreadySet {
                key: state.key.clone(),
                current: state.id,
                requested: id,
            });
        }
        state.id = id;
        Ok(())
    }

    /// True until the topic has been assigned a persisted id.
    pub fn is_new(&self) -> bool {
        self.id() < 0
    }

    pub fn key(&self) -> String {
        self.read().key.clone()
    }

    /// Rename the topic.
    ///
    /// An unchanged key is a no-op. The first rename of a persisted topic
    /// records the original key so a store can diff it on save.
    pub fn set_key(&self, key: &str) -> Result<(), TopicError> {
        validate_key(key)?;
        if self.read().key == key {
            return Ok(());
        }

        if let Some(parent) = self.parent() {
            if let Some(existing) = parent.find_child(key) {
                if !existing.ptr_eq(self) {
                    return Err(TopicError::DuplicateKey {
                        key: key.to_string(),
                        parent: parent.unique_key(),
                    });
                }
            }
        }

        let mut state = self.write();
        let is_new = state.id < 0;
        if !is_new && state.original_key.is_none() {
            state.original_key = Some(state.key.clone());
        }
        state.key = key.to_string();
        if !is_new {
            state.is_dirty = true;
        }
        state.attributes.set_value(KEY_ATTRIBUTE, key, None, None);
        Ok(())
    }

    /// The key the topic was persisted under before its most recent rename.
    pub fn original_key(&self) -> Option<String> {
        self.read().original_key.clone()
    }

    pub(crate) fn clear_original_key(&self) {
        self.write().original_key = None;
    }

    pub fn content_type(&self) -> String {
        self.read().content_type.clone()
    }

    pub fn set_content_type(&self, content_type: &str) -> Result<(), TopicError> {
        validate_key(content_type)?;
        let mut state = self.write();
        if state.content_type == content_type {
            return Ok(());
        }
        state.content_type = content_type.to_string();
        state.kind = TopicKind::from_content_type(content_type);
        if state.id >= 0 {
            state.is_dirty = true;
        }
        state
            .attributes
            .set_value(CONTENT_TYPE_ATTRIBUTE, content_type, None, None);
        Ok(())
    }

    /// The subtype resolved from the content type.
    pub fn kind(&self) -> TopicKind {
        self.read().kind
    }

    // ------------------------------------------------------------------
    // Tree
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<Topic> {
        self.read().parent.as_ref().and_then(WeakTopic::upgrade)
    }

    /// A snapshot of the children in order.
    pub fn children(&self) -> Vec<Topic> {
        self.read().children.to_vec()
    }

    pub(crate) fn children_snapshot(&self) -> KeyedTopicCollection {
        self.read().children.clone()
    }

    pub fn has_children(&self) -> bool {
        !self.read().children.is_empty()
    }

    pub fn find_child(&self, key: &str) -> Option<Topic> {
        self.children_snapshot().find_by_key(key).cloned()
    }

    /// Position among the parent's children.
    pub fn position(&self) -> Option<usize> {
        self.parent()
            .and_then(|parent| parent.children_snapshot().position(self))
    }

    /// The sibling immediately before this topic, if any.
    pub fn previous_sibling(&self) -> Option<Topic> {
        let parent = self.parent()?;
        let siblings = parent.children_snapshot();
        let index = siblings.position(self)?;
        index.checked_sub(1).and_then(|i| siblings.get(i).cloned())
    }

    /// Ancestors from the immediate parent up to the root.
    pub fn ancestors(&self) -> Vec<Topic> {
        let mut ancestors = Vec::new();
        let mut current = self.parent();
        while let Some(topic) = current {
            current = topic.parent();
            ancestors.push(topic);
        }
        ancestors
    }

    pub fn root(&self) -> Topic {
        self.ancestors().pop().unwrap_or_else(|| self.clone())
    }

    /// Every descendant in depth-first, pre-order.
    pub fn descendants(&self) -> Vec<Topic> {
        let mut result = Vec::new();
        let mut stack: Vec<Topic> = self.children().into_iter().rev().collect();
        while let Some(topic) = stack.pop() {
            stack.extend(topic.children().into_iter().rev());
            result.push(topic);
        }
        result
    }

    /// Move this topic beneath `parent`, directly after `sibling`, or first
    /// when no sibling is given.
    pub fn set_parent(&self, parent: &Topic, sibling: Option<&Topic>) -> Result<(), TopicError> {
        let placement = match sibling {
            Some(sibling) => Placement::After(sibling),
            None => Placement::Start,
        };
        self.attach(parent, placement)
    }

    /// Check that `set_parent(parent, sibling)` would succeed, without
    /// changing anything.
    pub fn check_parent(&self, parent: &Topic, sibling: Option<&Topic>) -> Result<(), TopicError> {
        let placement = match sibling {
            Some(sibling) => Placement::After(sibling),
            None => Placement::Start,
        };
        self.check_attach(parent, placement)
    }

    fn check_attach(&self, parent: &Topic, placement: Placement<'_>) -> Result<(), TopicError> {
        if self.ptr_eq(parent) {
            return Err(TopicError::SelfParent(self.key()));
        }

        // A placed topic may not move beneath any topic whose unique key
        // starts with its own.
        let own_key = self.unique_key();
        let parent_key = parent.unique_key();
        let is_descendant = (self.parent().is_some() && parent_key.starts_with(&own_key))
            || parent.ancestors().iter().any(|a| a.ptr_eq(self));
        if is_descendant {
            return Err(TopicError::CyclicParent {
                topic: own_key,
                parent: parent_key,
            });
        }

        let siblings = parent.children_snapshot();
        let key = self.key();
        if let Some(existing) = siblings.find_by_key(&key) {
            if !existing.ptr_eq(self) {
                return Err(TopicError::DuplicateKey {
                    key,
                    parent: parent_key,
                });
            }
        }

        if let Placement::After(sibling) = placement {
            if sibling.ptr_eq(self) || !siblings.contains(sibling) {
                return Err(TopicError::SiblingNotFound {
                    sibling: sibling.key(),
                    parent: parent_key,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn attach(&self, parent: &Topic, placement: Placement<'_>) -> Result<(), TopicError> {
        self.check_attach(parent, placement)?;

        if let Some(old_parent) = self.parent() {
            old_parent.write().children.remove(self);
        }

        {
            let mut parent_state = parent.write();
            let index = match placement {
                Placement::Start => 0,
                Placement::End => parent_state.children.len(),
                Placement::After(sibling) => parent_state
                    .children
                    .position(sibling)
                    .map(|i| i + 1)
                    .unwrap_or(parent_state.children.len()),
            };
            parent_state.children.insert(index, self.clone());
        }

        let parent_id = parent.id();
        let mut state = self.write();
        state.parent = Some(parent.downgrade());
        state
            .attributes
            .set_value(PARENT_ID_ATTRIBUTE, parent_id.to_string(), None, None);
        Ok(())
    }

    /// Remove this topic from its parent's children. Ownership is forfeited.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.write().children.remove(self);
        }
        let mut state = self.write();
        state.parent = None;
        state.attributes.remove(PARENT_ID_ATTRIBUTE);
    }

    /// Refresh `ParentID` after the parent received its persisted id.
    pub(crate) fn sync_parent_id(&self) {
        let Some(parent) = self.parent() else {
            return;
        };
        let parent_id = parent.id().to_string();
        let mut state = self.write();
        if state.attributes.get_value(PARENT_ID_ATTRIBUTE) != Some(parent_id.as_str()) {
            state
                .attributes
                .set_value(PARENT_ID_ATTRIBUTE, parent_id, Some(false), None);
        }
    }

    /// Colon-delimited chain of keys from the root, e.g. `Root:Section:Page`.
    pub fn unique_key(&self) -> String {
        let mut keys: Vec<String> = self.ancestors().iter().map(Topic::key).collect();
        keys.reverse();
        keys.push(self.key());
        keys.join(&UNIQUE_KEY_SEPARATOR.to_string())
    }

    /// The unique key as a path, with the root segment replaced by `/`.
    pub fn web_path(&self) -> String {
        let unique_key = self.unique_key();
        let mut segments = unique_key.split(UNIQUE_KEY_SEPARATOR).skip(1).peekable();
        if segments.peek().is_none() {
            return "/".to_string();
        }
        format!("/{}/", segments.collect::<Vec<_>>().join("/"))
    }

    /// Resolve a unique key relative to this topic's subtree.
    pub fn find_by_unique_key(&self, unique_key: &str) -> Option<Topic> {
        let own = self.unique_key();
        if unique_key == own {
            return Some(self.clone());
        }
        let rest = unique_key.strip_prefix(&format!("{own}{UNIQUE_KEY_SEPARATOR}"))?;
        let mut current = self.clone();
        for segment in rest.split(UNIQUE_KEY_SEPARATOR) {
            current = current.find_child(segment)?;
        }
        Some(current)
    }

    // ------------------------------------------------------------------
    // Dirty tracking
    // ------------------------------------------------------------------

    /// Whether the topic has unsaved changes.
    ///
    /// The local flag is checked first; collections are only scanned when it
    /// is clear and `check_collections` is requested.
    pub fn is_dirty(&self, check_collections: bool, exclude_last_modified: bool) -> bool {
        let state = self.read();
        state.is_dirty
            || (check_collections
                && (state.attributes.is_dirty(exclude_last_modified)
                    || state.relationships.is_dirty()
                    || state.references.is_dirty()))
    }

    pub fn mark_dirty(&self) {
        self.write().is_dirty = true;
    }

    /// Reset the dirty flag, optionally cascading into the collections and
    /// stamping retained attributes with `version`.
    pub fn mark_clean(&self, include_collections: bool, version: Option<DateTime<Utc>>) {
        let mut state = self.write();
        state.is_dirty = false;
        if include_collections {
            state.attributes.mark_clean(version);
            state.relationships.mark_clean();
            state.references.mark_clean();
        }
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// A snapshot of the attribute collection.
    pub fn attributes(&self) -> AttributeCollection {
        self.read().attributes.clone()
    }

    pub fn attribute(&self, key: &str) -> Option<AttributeRecord> {
        self.read().attributes.get(key).cloned()
    }

    /// Set an attribute value, marking it dirty if it changed.
    ///
    /// `Key` and `ContentType` are routed through their validated setters;
    /// `ParentID` is maintained by [`Topic::set_parent`] and rejected here.
    pub fn set_attribute(&self, key: &str, value: &str) -> Result<bool, TopicError> {
        self.set_attribute_with(key, value, None, None)
    }

    pub fn set_attribute_with(
        &self,
        key: &str,
        value: &str,
        is_dirty: Option<bool>,
        version: Option<DateTime<Utc>>,
    ) -> Result<bool, TopicError> {
        match key {
            KEY_ATTRIBUTE => {
                let changed = self.read().key != value;
                self.set_key(value)?;
                Ok(changed)
            }
            CONTENT_TYPE_ATTRIBUTE => {
                let changed = self.read().content_type != value;
                self.set_content_type(value)?;
                Ok(changed)
            }
            PARENT_ID_ATTRIBUTE => Err(TopicError::ReservedAttribute(key.to_string())),
            _ => Ok(self
                .write()
                .attributes
                .set_value(key, value, is_dirty, version)),
        }
    }

    /// Clear an attribute. The record stays, empty and dirty, until saved.
    pub fn remove_attribute(&self, key: &str) -> Result<bool, TopicError> {
        self.set_attribute(key, "")
    }

    pub(crate) fn replace_attributes(&self, attributes: AttributeCollection) {
        self.write().attributes = attributes;
    }

    pub(crate) fn mark_attribute_dirty(&self, key: &str) {
        self.write().attributes.mark_key_dirty(key);
    }

    /// Local value, falling back to the base topic chain.
    pub fn get_value(&self, key: &str) -> Option<String> {
        self.get_value_with(key, false, DEFAULT_MAX_INHERITANCE_HOPS)
    }

    /// Local value, falling back to the base topic chain and then to ancestors.
    pub fn get_inherited_value(&self, key: &str) -> Option<String> {
        self.get_value_with(key, true, DEFAULT_MAX_INHERITANCE_HOPS)
    }

    /// Look up `key`, following at most `max_hops` base topics and, when
    /// `inherit_from_parent` is set, each ancestor in turn.
    pub fn get_value_with(
        &self,
        key: &str,
        inherit_from_parent: bool,
        max_hops: usize,
    ) -> Option<String> {
        if let Some(value) = self.derived_value(key, max_hops) {
            return Some(value);
        }
        if inherit_from_parent {
            let mut current = self.parent();
            while let Some(ancestor) = current {
                if let Some(value) = ancestor.derived_value(key, max_hops) {
                    return Some(value);
                }
                current = ancestor.parent();
            }
        }
        None
    }

    fn derived_value(&self, key: &str, max_hops: usize) -> Option<String> {
        let mut current = self.clone();
        for _ in 0..=max_hops {
            let (value, base) = {
                let state = current.read();
                (
                    state.attributes.get_value(key).map(str::to_string),
                    state.references.get(BASE_TOPIC_REFERENCE),
                )
            };
            if value.is_some() {
                return value;
            }
            match base {
                Some(base) if !base.ptr_eq(self) => current = base,
                _ => return None,
            }
        }
        None
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_value(key).and_then(|v| parse_bool(&v))
    }

    /// The `Title` attribute, or the key when none is set.
    pub fn title(&self) -> String {
        self.get_value(TITLE_ATTRIBUTE).unwrap_or_else(|| self.key())
    }

    pub fn is_hidden(&self) -> bool {
        self.get_bool(IS_HIDDEN_ATTRIBUTE).unwrap_or(false)
    }

    pub fn is_disabled(&self) -> bool {
        self.get_bool(IS_DISABLED_ATTRIBUTE).unwrap_or(false)
    }

    /// The explicit `LastModified` attribute, else the newest attribute record.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        let state = self.read();
        state
            .attributes
            .get_value(LAST_MODIFIED_ATTRIBUTE)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc))
            .or_else(|| state.attributes.iter().map(|r| r.last_modified()).max())
    }

    // ------------------------------------------------------------------
    // Associations
    // ------------------------------------------------------------------

    pub fn relationships(&self) -> TopicRelationships<'_> {
        TopicRelationships::new(self, RelationshipDirection::Outgoing)
    }

    pub fn incoming_relationships(&self) -> TopicRelationships<'_> {
        TopicRelationships::new(self, RelationshipDirection::Incoming)
    }

    pub fn references(&self) -> TopicReferences<'_> {
        TopicReferences::new(self)
    }

    pub fn base_topic(&self) -> Option<Topic> {
        self.references().get_value(BASE_TOPIC_REFERENCE)
    }

    pub fn set_base_topic(&self, base: Option<&Topic>) -> bool {
        self.references().set_value(BASE_TOPIC_REFERENCE, base)
    }

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    /// Persisted versions, oldest first.
    pub fn version_history(&self) -> Vec<DateTime<Utc>> {
        self.read().version_history.clone()
    }

    pub fn add_version(&self, version: DateTime<Utc>) {
        let mut state = self.write();
        if let Err(index) = state.version_history.binary_search(&version) {
            state.version_history.insert(index, version);
        }
    }
}

impl PartialEq for Topic {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Topic {}

impl Hash for Topic {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("Topic")
            .field("id", &state.id)
            .field("key", &state.key)
            .field("content_type", &state.content_type)
            .field("children", &state.children.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::TopicFactory;

    fn tree() -> (Topic, Topic, Topic) {
        let root = TopicFactory::create("Root", "Container", None).unwrap();
        let section = TopicFactory::create("Section", "Page", Some(&root)).unwrap();
        let page = TopicFactory::create("Page", "Page", Some(&section)).unwrap();
        (root, section, page)
    }

    #[test]
    fn test_new_topic_is_new() {
        let topic = TopicFactory::create("Home", "Page", None).unwrap();
        assert!(topic.is_new());
        assert_eq!(topic.id(), UNSAVED_ID);
        assert_eq!(topic.unique_key(), "Home");
        assert_eq!(topic.web_path(), "/");
    }

    #[test]
    fn test_unique_key_and_web_path() {
        let (root, _section, page) = tree();
        let about = TopicFactory::create("About", "Page", Some(&root)).unwrap();

        assert_eq!(about.unique_key(), "Root:About");
        assert_eq!(about.web_path(), "/About/");
        assert_eq!(page.unique_key(), "Root:Section:Page");
        assert_eq!(page.web_path(), "/Section/Page/");
    }

    #[test]
    fn test_id_is_assigned_once() {
        let topic = TopicFactory::create("Home", "Page", None).unwrap();
        topic.set_id(10).unwrap();
        topic.set_id(10).unwrap();
        assert!(matches!(
            topic.set_id(11),
            Err(TopicError::IdAlreadySet { current: 10, .. })
        ));
    }

    #[test]
    fn test_self_parent_rejected() {
        let (_root, section, _page) = tree();
        assert!(matches!(
            section.set_parent(&section, None),
            Err(TopicError::SelfParent(_))
        ));
    }

    #[test]
    fn test_cyclic_parent_rejected() {
        let (root, section, page) = tree();
        assert!(matches!(
            section.set_parent(&page, None),
            Err(TopicError::CyclicParent { .. })
        ));
        assert!(matches!(
            root.set_parent(&page, None),
            Err(TopicError::CyclicParent { .. })
        ));
        // Unchanged on failure.
        assert!(page.parent().unwrap().ptr_eq(&section));
    }

    #[test]
    fn test_check_parent_uses_key_prefix() {
        let (root, section, _page) = tree();
        let sections = TopicFactory::create("Sections", "Page", Some(&root)).unwrap();
        assert!(matches!(
            section.check_parent(&sections, None),
            Err(TopicError::CyclicParent { .. })
        ));
        assert!(sections.check_parent(&section, None).is_ok());
        assert!(sections.parent().unwrap().ptr_eq(&root));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let (root, section, _page) = tree();
        let other = TopicFactory::create("Page", "Page", Some(&root)).unwrap();
        assert!(matches!(
            other.set_parent(&section, None),
            Err(TopicError::DuplicateKey { .. })
        ));
        assert!(matches!(
            TopicFactory::create("Section", "Page", Some(&root)),
            Err(TopicError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_set_parent_moves_between_children() {
        let (root, section, page) = tree();
        page.set_parent(&root, Some(&section)).unwrap();

        assert!(section.children().is_empty());
        let keys: Vec<String> = root.children().iter().map(Topic::key).collect();
        assert_eq!(keys, vec!["Section", "Page"]);
        assert!(page.parent().unwrap().ptr_eq(&root));
        assert_eq!(page.unique_key(), "Root:Page");
    }

    #[test]
    fn test_set_parent_without_sibling_inserts_first() {
        let (root, _section, page) = tree();
        page.set_parent(&root, None).unwrap();
        let keys: Vec<String> = root.children().iter().map(Topic::key).collect();
        assert_eq!(keys, vec!["Page", "Section"]);
    }

    #[test]
    fn test_reorder_within_same_parent() {
        let root = TopicFactory::create("Root", "Container", None).unwrap();
        let a = TopicFactory::create("A", "Page", Some(&root)).unwrap();
        let b = TopicFactory::create("B", "Page", Some(&root)).unwrap();
        let c = TopicFactory::create("C", "Page", Some(&root)).unwrap();

        a.set_parent(&root, Some(&c)).unwrap();

        let keys: Vec<String> = root.children().iter().map(Topic::key).collect();
        assert_eq!(keys, vec!["B", "C", "A"]);
        assert!(a.previous_sibling().unwrap().ptr_eq(&c));
        assert!(b.previous_sibling().is_none());
    }

    #[test]
    fn test_key_change_dirties_persisted_topic() {
        let topic = TopicFactory::create_with_id("Home", "Page", None, 1).unwrap();
        topic.mark_clean(true, None);

        topic.set_key("Home").unwrap();
        topic.set_content_type("Page").unwrap();
        assert!(!topic.is_dirty(true, false));

        topic.set_key("Start").unwrap();
        assert!(topic.is_dirty(false, false));
        assert_eq!(topic.original_key(), Some("Home".to_string()));
    }

    #[test]
    fn test_key_change_on_new_topic_keeps_local_flag_clear() {
        let topic = TopicFactory::create("Home", "Page", None).unwrap();
        topic.set_key("Start").unwrap();
        assert!(!topic.is_dirty(false, false));
        assert!(topic.original_key().is_none());
    }

    #[test]
    fn test_rename_rejects_sibling_collision() {
        let (root, section, _page) = tree();
        TopicFactory::create("Other", "Page", Some(&root)).unwrap();
        assert!(matches!(
            section.set_key("Other"),
            Err(TopicError::DuplicateKey { .. })
        ));
        assert!(section.set_key("bad key").is_err());
    }

    #[test]
    fn test_parent_id_is_reserved() {
        let topic = TopicFactory::create("Home", "Page", None).unwrap();
        assert!(matches!(
            topic.set_attribute(PARENT_ID_ATTRIBUTE, "4"),
            Err(TopicError::ReservedAttribute(_))
        ));
        topic.set_attribute(KEY_ATTRIBUTE, "Start").unwrap();
        assert_eq!(topic.key(), "Start");
    }

    #[test]
    fn test_inherited_values() {
        let (root, section, page) = tree();
        root.set_attribute("Theme", "Dark").unwrap();
        section.set_attribute("Subtitle", "Section subtitle").unwrap();

        assert_eq!(page.get_value("Theme"), None);
        assert_eq!(page.get_inherited_value("Theme"), Some("Dark".to_string()));
        assert_eq!(
            page.get_inherited_value("Subtitle"),
            Some("Section subtitle".to_string())
        );
    }

    #[test]
    fn test_base_topic_values() {
        let (root, section, page) = tree();
        let template = TopicFactory::create("Template", "Page", Some(&root)).unwrap();
        template.set_attribute("Body", "Template body").unwrap();
        page.set_base_topic(Some(&template));

        assert_eq!(page.get_value("Body"), Some("Template body".to_string()));

        // Self-referencing chains terminate.
        section.set_base_topic(Some(&page));
        page.set_base_topic(Some(&section));
        assert_eq!(page.get_value("Missing"), None);
    }

    #[test]
    fn test_dirty_checks_collections_lazily() {
        let topic = TopicFactory::create_with_id("Home", "Page", None, 3).unwrap();
        topic.mark_clean(true, None);
        assert!(!topic.is_dirty(true, false));

        topic.set_attribute("Title", "Welcome").unwrap();
        assert!(!topic.is_dirty(false, false));
        assert!(topic.is_dirty(true, false));

        topic.mark_clean(true, None);
        let other = TopicFactory::create("Other", "Page", None).unwrap();
        topic.relationships().set_value("Related", &other);
        assert!(topic.is_dirty(true, false));
    }

    #[test]
    fn test_find_by_unique_key_and_descendants() {
        let (root, section, page) = tree();
        assert!(root.find_by_unique_key("Root:Section:Page").unwrap().ptr_eq(&page));
        assert!(root.find_by_unique_key("Root").unwrap().ptr_eq(&root));
        assert!(root.find_by_unique_key("Root:Missing").is_none());
        assert!(section.find_by_unique_key("Other:Section").is_none());

        let keys: Vec<String> = root.descendants().iter().map(Topic::key).collect();
        assert_eq!(keys, vec!["Section", "Page"]);
    }

    #[test]
    fn test_detach_forfeits_ownership() {
        let (root, section, page) = tree();
        let weak = page.downgrade();
        section.detach();

        assert!(root.children().is_empty());
        assert!(section.parent().is_none());
        drop(section);
        drop(page);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_title_falls_back_to_key() {
        let topic = TopicFactory::create("Home", "Page", None).unwrap();
        assert_eq!(topic.title(), "Home");
        topic.set_attribute("Title", "Welcome home").unwrap();
        assert_eq!(topic.title(), "Welcome home");
    }
}
