//! Topic to view model mapping.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use super::associations::AssociationTypes;
use super::cache::MappedTopicCache;
use super::coercion::{coerce, convert, parse_bool, ScalarType, ScalarValue};
use super::descriptor::{CollectionSource, ModelDescriptor, PropertyDescriptor, PropertyType};
use super::error::MappingError;
use super::lookup::{resolve_named, resolve_view_model, TypeLookupService};
use super::model::{MappedGraph, ModelArena, ModelId, ModelValue};
use crate::config::{Config, ConfigError, MappingConfig, DEFAULT_MAX_INHERITANCE_HOPS};
use crate::repository::{resolve_topic, TopicLookup, TopicStore};
use crate::schema::{ContentTypeDescriptorCollection, ModelType, ATTRIBUTES_CONTAINER, LIST_CONTENT_TYPE};
use crate::topic::{Topic, TopicKind};

/// Relationship key that always resolves to the topic's parent.
const PARENT_PROPERTY: &str = "Parent";
/// Collection key that always resolves to the topic's children.
const CHILDREN_PROPERTY: &str = "Children";
/// Intrinsic list of a content type descriptor's attributes.
const ATTRIBUTE_DESCRIPTORS_PROPERTY: &str = "AttributeDescriptors";

/// Maps topics into view models by naming convention.
///
/// Each call runs with its own [`MappedTopicCache`]; nothing is shared
/// between calls.
pub struct TopicMappingService {
    store: Arc<dyn TopicStore>,
    types: Arc<dyn TypeLookupService>,
    content_types: Arc<ContentTypeDescriptorCollection>,
    config: MappingConfig,
    default_associations: AssociationTypes,
    max_hops: usize,
}

impl TopicMappingService {
    pub fn new(
        store: Arc<dyn TopicStore>,
        types: Arc<dyn TypeLookupService>,
        content_types: Arc<ContentTypeDescriptorCollection>,
    ) -> Self {
        Self {
            store,
            types,
            content_types,
            config: MappingConfig::default(),
            default_associations: AssociationTypes::ALL,
            max_hops: DEFAULT_MAX_INHERITANCE_HOPS,
        }
    }

    /// Apply mapping conventions and inheritance limits from `config`.
    pub fn with_config(mut self, config: &Config) -> Result<Self, ConfigError> {
        self.default_associations = config.mapping.associations()?;
        self.config = config.mapping.clone();
        self.max_hops = config.topics.max_inheritance_hops;
        Ok(self)
    }

    /// Map `topic` with the default associations.
    pub async fn map(&self, topic: &Topic) -> Result<MappedGraph, MappingError> {
        self.map_with(topic, self.default_associations).await
    }

    /// Map `topic` into the view model its content type resolves to.
    pub async fn map_with(
        &self,
        topic: &Topic,
        associations: AssociationTypes,
    ) -> Result<MappedGraph, MappingError> {
        let model = resolve_view_model(self.types.as_ref(), &self.config, &topic.content_type())?;
        self.run(topic, model, associations).await
    }

    /// Map `topic` into a named model type.
    pub async fn map_to(
        &self,
        topic: &Topic,
        model_type: &str,
        associations: AssociationTypes,
    ) -> Result<MappedGraph, MappingError> {
        let model = resolve_named(self.types.as_ref(), model_type)?;
        self.run(topic, model, associations).await
    }

    /// Map `topic` and deserialize the result into `T`.
    pub async fn map_as<T: DeserializeOwned>(
        &self,
        topic: &Topic,
        associations: AssociationTypes,
    ) -> Result<T, MappingError> {
        self.map_with(topic, associations).await?.deserialize()
    }

    async fn run(
        &self,
        topic: &Topic,
        model: Arc<ModelDescriptor>,
        associations: AssociationTypes,
    ) -> Result<MappedGraph, MappingError> {
        debug!(topic = %topic.unique_key(), model = %model.name, ?associations, "Mapping topic");
        let run = MappingRun {
            service: self,
            cache: MappedTopicCache::new(),
            arena: ModelArena::default(),
        };
        let root = run
            .map_topic(topic.clone(), model, associations, Vec::new())
            .await?;
        debug!(models = run.cache.len(), "Mapping complete");
        Ok(run.arena.into_graph(root))
    }
}

/// Topics being mapped on the current branch, for cycles through unsaved
/// topics that the cache doesn't cover.
type MappingPath = Vec<(Topic, String, ModelId)>;

struct MappingRun<'a> {
    service: &'a TopicMappingService,
    cache: MappedTopicCache,
    arena: ModelArena,
}

impl MappingRun<'_> {
    fn map_topic(
        &self,
        topic: Topic,
        model: Arc<ModelDescriptor>,
        associations: AssociationTypes,
        mut path: MappingPath,
    ) -> BoxFuture<'_, Result<ModelId, MappingError>> {
        async move {
            let (id, missing, is_new) = if topic.is_new() {
                let on_path = path
                    .iter()
                    .find(|(t, name, _)| t.ptr_eq(&topic) && *name == model.name);
                if let Some((_, _, id)) = on_path {
                    return Ok(*id);
                }
                let id = self.arena.allocate(&model.name, topic.id(), &topic.key());
                (id, associations, true)
            } else {
                let reservation = self.cache.reserve(topic.id(), &model.name, associations, || {
                    self.arena.allocate(&model.name, topic.id(), &topic.key())
                });
                if !reservation.is_new && reservation.missing.is_empty() {
                    trace!(topic = %topic.key(), model = %model.name, "Mapped topic cache hit");
                    return Ok(reservation.model);
                }
                (reservation.model, reservation.missing, reservation.is_new)
            };

            path.push((topic.clone(), model.name.clone(), id));
            let values = self
                .map_properties(&topic, &model, missing, is_new, "", &path)
                .await?;
            self.arena.set_properties(id, values);
            Ok(id)
        }
        .boxed()
    }

    /// Map every property of `model` that the requested associations cover,
    /// concurrently.
    fn map_properties<'b>(
        &'b self,
        topic: &'b Topic,
        model: &'b ModelDescriptor,
        missing: AssociationTypes,
        map_scalars: bool,
        prefix: &'b str,
        path: &'b [(Topic, String, ModelId)],
    ) -> BoxFuture<'b, Result<Vec<(String, ModelValue)>, MappingError>> {
        async move {
            let pending = model
                .properties
                .iter()
                .filter(|p| !p.disable_mapping)
                .filter(|p| {
                    let category = p.association();
                    if category.is_empty() {
                        map_scalars
                    } else {
                        missing.intersects(category)
                    }
                })
                .map(move |property| async move {
                    let value = self
                        .map_property(topic, model, property, missing, prefix, path)
                        .await?;
                    Ok::<_, MappingError>((property.name.clone(), value))
                });
            try_join_all(pending).await
        }
        .boxed()
    }

    async fn map_property(
        &self,
        topic: &Topic,
        model: &ModelDescriptor,
        property: &PropertyDescriptor,
        missing: AssociationTypes,
        prefix: &str,
        path: &[(Topic, String, ModelId)],
    ) -> Result<ModelValue, MappingError> {
        match &property.property_type {
            PropertyType::Scalar(ty) => self.scalar_value(topic, model, property, prefix, *ty),
            PropertyType::Key => Ok(self
                .resolve_reference(topic, property)
                .await?
                .map(|t| ModelValue::Key(t.unique_key()))
                .unwrap_or(ModelValue::Null)),
            PropertyType::KeyList => {
                let topics = self.resolve_collection(topic, property, missing).await?;
                let keys = dedupe(topics, property).iter().map(Topic::unique_key).collect();
                Ok(ModelValue::Keys(keys))
            }
            PropertyType::ModelList { .. } => {
                let topics = dedupe(self.resolve_collection(topic, property, missing).await?, property);
                let targets = topics
                    .into_iter()
                    .map(|t| self.model_for(property, &t).map(|m| (t, m)))
                    .collect::<Result<Vec<_>, _>>()?;
                let ids = try_join_all(targets.into_iter().map(move |(t, m)| {
                    self.map_topic(t, m, property.include, path.to_vec())
                }))
                .await?;
                Ok(ModelValue::Models(ids))
            }
            PropertyType::Model { .. } => {
                if let Some(nested_prefix) = &property.map_to_parent {
                    let nested = self.model_for(property, topic)?;
                    let id = self.arena.allocate(&nested.name, topic.id(), &topic.key());
                    let prefix = format!("{prefix}{nested_prefix}");
                    let values = self
                        .map_properties(topic, &nested, missing, true, &prefix, path)
                        .await?;
                    self.arena.set_properties(id, values);
                    return Ok(ModelValue::Model(id));
                }
                match self.resolve_reference(topic, property).await? {
                    Some(target) => {
                        let nested = self.model_for(property, &target)?;
                        let id = self
                            .map_topic(target, nested, property.include, path.to_vec())
                            .await?;
                        Ok(ModelValue::Model(id))
                    }
                    None => Ok(ModelValue::Null),
                }
            }
        }
    }

    fn model_for(
        &self,
        property: &PropertyDescriptor,
        topic: &Topic,
    ) -> Result<Arc<ModelDescriptor>, MappingError> {
        let types = self.service.types.as_ref();
        match property.model_type() {
            Some(name) => resolve_named(types, name),
            None => resolve_view_model(types, &self.service.config, &topic.content_type()),
        }
    }

    fn scalar_value(
        &self,
        topic: &Topic,
        model: &ModelDescriptor,
        property: &PropertyDescriptor,
        prefix: &str,
        ty: ScalarType,
    ) -> Result<ModelValue, MappingError> {
        if prefix.is_empty() {
            let intrinsic = intrinsic_value(topic, &property.name).and_then(|v| convert(&v, ty));
            if let Some(value) = intrinsic {
                return Ok(ModelValue::Scalar(value));
            }
        }

        let key = format!("{prefix}{}", property.effective_key());
        let content_type = topic.content_type();
        let schema = &self.service.content_types;
        if let Some(model_type) = schema.model_type(&content_type, &key) {
            if model_type != ModelType::ScalarValue {
                return Err(MappingError::ModelDefinition {
                    model: model.name.clone(),
                    property: property.name.clone(),
                    reason: format!("'{key}' is a {model_type:?} attribute, not a scalar"),
                });
            }
        }

        let raw = topic
            .get_value_with(&key, property.inherit, self.service.max_hops)
            .or_else(|| property.default_value.clone())
            .or_else(|| {
                schema
                    .attribute(&content_type, &key)
                    .ok()
                    .and_then(|a| a.default_value)
            });
        let Some(raw) = raw else {
            return Ok(ModelValue::Null);
        };
        coerce(&raw, ty)
            .map(ModelValue::Scalar)
            .ok_or_else(|| MappingError::Conversion {
                property: property.name.clone(),
                value: raw,
                expected: format!("{ty:?}"),
            })
    }

    /// Resolve a collection property's source topics, filtered and flattened.
    ///
    /// A list without a fixed source reads from the first source holding its
    /// key, and stays empty when that source's association is not requested.
    async fn resolve_collection(
        &self,
        topic: &Topic,
        property: &PropertyDescriptor,
        missing: AssociationTypes,
    ) -> Result<Vec<Topic>, MappingError> {
        let key = property.effective_key();
        let mut topics = match property.source {
            CollectionSource::Children => topic.children(),
            CollectionSource::Relationship => self.relationship(topic, key),
            CollectionSource::NestedTopics => nested_topics(topic, key).unwrap_or_default(),
            CollectionSource::IncomingRelationship => topic.incoming_relationships().get_values(key),
            CollectionSource::MappedCollection => intrinsic_collection(topic, key).unwrap_or_default(),
            CollectionSource::Any if key == CHILDREN_PROPERTY => topic.children(),
            CollectionSource::Any => {
                let (category, topics) = if topic.relationships().contains_key(key) {
                    (AssociationTypes::RELATIONSHIPS, self.relationship(topic, key))
                } else if let Some(nested) = nested_topics(topic, key) {
                    (AssociationTypes::MAPPED_COLLECTIONS, nested)
                } else if topic.incoming_relationships().contains_key(key) {
                    (
                        AssociationTypes::INCOMING_RELATIONSHIPS,
                        topic.incoming_relationships().get_values(key),
                    )
                } else if let Some(list) = intrinsic_collection(topic, key) {
                    (AssociationTypes::MAPPED_COLLECTIONS, list)
                } else if let Some(metadata) = &property.metadata {
                    (
                        AssociationTypes::MAPPED_COLLECTIONS,
                        self.metadata_list(topic, metadata).await?,
                    )
                } else {
                    (AssociationTypes::NONE, Vec::new())
                };
                if missing.intersects(category) {
                    topics
                } else {
                    debug!(topic = %topic.unique_key(), key, "Collection source not requested");
                    Vec::new()
                }
            }
        };

        if property.flatten {
            topics = topics
                .into_iter()
                .flat_map(|t| std::iter::once(t.clone()).chain(t.descendants()))
                .collect();
        }
        topics.retain(|t| is_mappable(t) && matches_filters(t, property));
        Ok(topics)
    }

    fn relationship(&self, topic: &Topic, key: &str) -> Vec<Topic> {
        let relationships = topic.relationships();
        if !relationships.is_fully_loaded() {
            warn!(topic = %topic.unique_key(), key, "Mapping partially loaded relationships");
        }
        relationships.get_values(key)
    }

    async fn metadata_list(&self, topic: &Topic, name: &str) -> Result<Vec<Topic>, MappingError> {
        let config = &self.service.config;
        let unique_key = format!(
            "{}:{name}:{}",
            config.metadata_root, config.lookup_list_key
        );
        let list = self
            .find_topic(topic, &TopicLookup::UniqueKey(unique_key))
            .await?;
        Ok(list.map(|l| l.children()).unwrap_or_default())
    }

    /// Resolve a reference: the parent, a reference, or a `{Name}Id` attribute.
    async fn resolve_reference(
        &self,
        topic: &Topic,
        property: &PropertyDescriptor,
    ) -> Result<Option<Topic>, MappingError> {
        let key = property.effective_key();
        if key == PARENT_PROPERTY {
            return Ok(topic.parent());
        }
        if let Some(target) = topic.references().get_value(key) {
            return Ok(Some(target));
        }

        let Some(raw) = topic.get_value(&format!("{key}Id")) else {
            return Ok(None);
        };
        let id: i64 = raw.trim().parse().map_err(|_| MappingError::Conversion {
            property: property.name.clone(),
            value: raw.clone(),
            expected: "topic id".to_string(),
        })?;
        self.find_topic(topic, &TopicLookup::Id(id))
            .await?
            .map(Some)
            .ok_or(MappingError::Unresolved {
                property: property.name.clone(),
                key: raw,
            })
    }

    async fn find_topic(
        &self,
        topic: &Topic,
        lookup: &TopicLookup,
    ) -> Result<Option<Topic>, MappingError> {
        Ok(resolve_topic(self.service.store.as_ref(), topic, lookup).await?)
    }
}

/// Values every topic exposes without reading its attribute collection.
fn intrinsic_value(topic: &Topic, name: &str) -> Option<ScalarValue> {
    let value = match name {
        "Id" => ScalarValue::Int(topic.id()),
        "Key" => ScalarValue::Text(topic.key()),
        "ContentType" => ScalarValue::Text(topic.content_type()),
        "Title" => ScalarValue::Text(topic.title()),
        "UniqueKey" => ScalarValue::Text(topic.unique_key()),
        "WebPath" => ScalarValue::Text(topic.web_path()),
        "IsNew" => ScalarValue::Bool(topic.is_new()),
        "IsHidden" => ScalarValue::Bool(topic.is_hidden()),
        "IsDisabled" => ScalarValue::Bool(topic.is_disabled()),
        "LastModified" => ScalarValue::DateTime(topic.last_modified()?),
        _ => return None,
    };
    Some(value)
}

/// Topic-valued lists computed from the topic itself.
fn intrinsic_collection(topic: &Topic, name: &str) -> Option<Vec<Topic>> {
    match name {
        ATTRIBUTE_DESCRIPTORS_PROPERTY if topic.kind() == TopicKind::ContentTypeDescriptor => Some(
            topic
                .find_child(ATTRIBUTES_CONTAINER)
                .map(|c| c.children())
                .unwrap_or_default(),
        ),
        _ => None,
    }
}

/// Children of the hidden list child named `key`.
fn nested_topics(topic: &Topic, key: &str) -> Option<Vec<Topic>> {
    topic
        .find_child(key)
        .filter(|c| c.content_type() == LIST_CONTENT_TYPE)
        .map(|c| c.children())
}

fn is_mappable(topic: &Topic) -> bool {
    !topic.is_disabled() && topic.content_type() != LIST_CONTENT_TYPE
}

fn matches_filters(topic: &Topic, property: &PropertyDescriptor) -> bool {
    if let Some(content_type) = &property.content_type_filter {
        if topic.content_type() != *content_type {
            return false;
        }
    }
    property.attribute_filters.iter().all(|(key, expected)| {
        let actual = topic.get_value(key);
        match (actual.as_deref().and_then(parse_bool), parse_bool(expected)) {
            (Some(actual), Some(expected)) => actual == expected,
            _ => actual.as_deref() == Some(expected.as_str()),
        }
    })
}

/// Drop topics whose key was already collected.
fn dedupe(topics: Vec<Topic>, property: &PropertyDescriptor) -> Vec<Topic> {
    let mut seen = HashSet::new();
    topics
        .into_iter()
        .filter(|t| {
            let key = t.key();
            let first = seen.insert(key.clone());
            if !first {
                warn!(property = %property.name, key = %key, "Skipping duplicate key in mapped collection");
            }
            first
        })
        .collect()
}
