//! Binding model to topic mapping.

use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, warn};

use super::coercion::{normalize_bool_string, ScalarType};
use super::descriptor::{PropertyDescriptor, PropertyType};
use super::error::MappingError;
use super::lookup::{resolve_named, TypeLookupService};
use super::model::{BindingModel, BindingValue};
use super::validator::BindingModelValidator;
use crate::config::{Config, DEFAULT_BINDING_MODEL_SUFFIX};
use crate::repository::{resolve_topic, TopicLookup, TopicStore};
use crate::schema::{ContentTypeDescriptorCollection, LIST_CONTENT_TYPE};
use crate::topic::{
    validate_key, Topic, TopicFactory, CONTENT_TYPE_ATTRIBUTE, IS_HIDDEN_ATTRIBUTE, KEY_ATTRIBUTE,
};

/// Value of a property missing from a binding model.
static NULL: BindingValue = BindingValue::Null;

/// Writes binding models onto topics.
///
/// Topics are changed in memory only; saving them is up to the caller.
pub struct ReverseTopicMappingService {
    store: Arc<dyn TopicStore>,
    types: Arc<dyn TypeLookupService>,
    content_types: Arc<ContentTypeDescriptorCollection>,
    validator: BindingModelValidator,
    binding_model_suffix: String,
}

impl ReverseTopicMappingService {
    pub fn new(
        store: Arc<dyn TopicStore>,
        types: Arc<dyn TypeLookupService>,
        content_types: Arc<ContentTypeDescriptorCollection>,
    ) -> Self {
        Self {
            store,
            types,
            content_types,
            validator: BindingModelValidator::new(),
            binding_model_suffix: DEFAULT_BINDING_MODEL_SUFFIX.to_string(),
        }
    }

    /// Apply the binding model naming convention from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.binding_model_suffix = config.mapping.binding_model_suffix.clone();
        self
    }

    pub fn validator(&self) -> &BindingModelValidator {
        &self.validator
    }

    /// Map `source` onto an existing topic.
    ///
    /// The key and content type of the source must match the target.
    pub async fn map(&self, source: &BindingModel, target: &Topic) -> Result<(), MappingError> {
        let topic_key = target.key();
        if !source.key.is_empty() && source.key != topic_key {
            return Err(MappingError::KeyMismatch {
                model_key: source.key.clone(),
                topic_key,
            });
        }
        let content_type = target.content_type();
        if !source.content_type.is_empty() && source.content_type != content_type {
            return Err(MappingError::ContentTypeMismatch {
                model: source.content_type.clone(),
                topic: content_type,
            });
        }
        self.map_into(source, target).await
    }

    /// Create a topic from `source`, appended to `parent`'s children.
    ///
    /// The topic is detached again if mapping fails.
    pub async fn map_new(
        &self,
        source: &BindingModel,
        parent: Option<&Topic>,
    ) -> Result<Topic, MappingError> {
        let topic = TopicFactory::create(&source.key, &source.content_type, parent)?;
        if let Err(e) = self.map_into(source, &topic).await {
            topic.detach();
            return Err(e);
        }
        Ok(topic)
    }

    /// Map any serializable value onto `target` through `model_type`.
    pub async fn map_from<T: Serialize>(
        &self,
        value: &T,
        model_type: &str,
        target: &Topic,
    ) -> Result<(), MappingError> {
        let descriptor = resolve_named(self.types.as_ref(), model_type)?;
        let source = BindingModel::from_serializable(
            value,
            &descriptor,
            &target.content_type(),
            &self.binding_model_suffix,
            self.types.as_ref(),
        )?;
        self.map(&source, target).await
    }

    /// Map a serializable value onto `target` through the binding model
    /// its content type names, `{ContentType}{binding_model_suffix}`.
    pub async fn map_value<T: Serialize>(&self, value: &T, target: &Topic) -> Result<(), MappingError> {
        let model_type = format!("{}{}", target.content_type(), self.binding_model_suffix);
        self.map_from(value, &model_type, target).await
    }

    fn map_into<'a>(
        &'a self,
        source: &'a BindingModel,
        target: &'a Topic,
    ) -> BoxFuture<'a, Result<(), MappingError>> {
        async move {
            let descriptor = resolve_named(self.types.as_ref(), &source.model_type)?;
            self.validator.validate(
                &descriptor,
                &target.content_type(),
                &self.content_types,
                self.types.as_ref(),
            )?;

            let pending = descriptor
                .properties
                .iter()
                .filter(|p| {
                    !p.disable_mapping && p.name != KEY_ATTRIBUTE && p.name != CONTENT_TYPE_ATTRIBUTE
                })
                .map(move |property| {
                    let value = source.get(&property.name).unwrap_or(&NULL);
                    self.bind_property(target, property, value)
                });
            try_join_all(pending).await?;
            debug!(topic = %target.unique_key(), model = %source.model_type, "Reverse mapped topic");
            Ok(())
        }
        .boxed()
    }

    async fn bind_property(
        &self,
        target: &Topic,
        property: &PropertyDescriptor,
        value: &BindingValue,
    ) -> Result<(), MappingError> {
        match &property.property_type {
            PropertyType::Scalar(ty) => self.bind_scalar(target, property, *ty, value),
            PropertyType::KeyList => self.bind_relationship(target, property, value).await,
            PropertyType::Key => self.bind_reference(target, property, value).await,
            PropertyType::ModelList { .. } => self.bind_nested(target, property, value).await,
            PropertyType::Model { .. } => Err(MappingError::ModelDefinition {
                model: String::new(),
                property: property.name.clone(),
                reason: "binding models reference topics by key".to_string(),
            }),
        }
    }

    fn bind_scalar(
        &self,
        target: &Topic,
        property: &PropertyDescriptor,
        ty: ScalarType,
        value: &BindingValue,
    ) -> Result<(), MappingError> {
        let key = property.effective_key();
        let raw = match value {
            BindingValue::Scalar(scalar) => Some(scalar.to_attribute_string()),
            BindingValue::Null => property.default_value.clone().or_else(|| {
                self.content_types
                    .attribute(&target.content_type(), key)
                    .ok()
                    .and_then(|a| a.default_value)
            }),
            other => return Err(shape_error(property, other, "scalar")),
        };

        match raw {
            Some(raw) => {
                let raw = match ty {
                    ScalarType::Bool => normalize_bool_string(&raw),
                    _ => raw,
                };
                target.set_attribute(key, &raw)?;
            }
            None if target.attribute(key).is_some() => {
                target.set_attribute(key, "")?;
            }
            None => {}
        }
        Ok(())
    }

    async fn bind_relationship(
        &self,
        target: &Topic,
        property: &PropertyDescriptor,
        value: &BindingValue,
    ) -> Result<(), MappingError> {
        let keys: &[String] = match value {
            BindingValue::Keys(keys) => keys,
            BindingValue::Null => &[],
            other => return Err(shape_error(property, other, "list of unique keys")),
        };
        let related = try_join_all(keys.iter().map(|key| self.resolve(target, property, key))).await?;

        let key = property.effective_key();
        let relationships = target.relationships();
        if relationships.is_fully_loaded() {
            relationships.clear(key);
        } else {
            warn!(
                topic = %target.unique_key(),
                key,
                "Relationships are partially loaded; adding without removing"
            );
        }
        for topic in &related {
            relationships.set_value(key, topic);
        }
        Ok(())
    }

    async fn bind_reference(
        &self,
        target: &Topic,
        property: &PropertyDescriptor,
        value: &BindingValue,
    ) -> Result<(), MappingError> {
        let referenced = match value {
            BindingValue::Key(key) => Some(self.resolve(target, property, key).await?),
            BindingValue::Null => None,
            other => return Err(shape_error(property, other, "unique key")),
        };
        target
            .references()
            .set_value(property.effective_key(), referenced.as_ref());
        Ok(())
    }

    /// Reconcile nested binding models with the hidden list named by the
    /// property, creating it if needed.
    async fn bind_nested(
        &self,
        target: &Topic,
        property: &PropertyDescriptor,
        value: &BindingValue,
    ) -> Result<(), MappingError> {
        let models: &[BindingModel] = match value {
            BindingValue::Models(models) => models,
            BindingValue::Null => &[],
            other => return Err(shape_error(property, other, "list of binding models")),
        };

        let key = property.effective_key();
        let existing = target.find_child(key);
        // Reject the whole list before any child is touched.
        for model in models {
            let current = existing.as_ref().and_then(|c| c.find_child(&model.key));
            match current {
                Some(current) if current.content_type() != model.content_type => {
                    return Err(MappingError::ContentTypeMismatch {
                        model: model.content_type.clone(),
                        topic: current.content_type(),
                    });
                }
                Some(_) => {}
                None => validate_key(&model.key)?,
            }
            let descriptor = resolve_named(self.types.as_ref(), &model.model_type)?;
            self.validator.validate(
                &descriptor,
                &model.content_type,
                &self.content_types,
                self.types.as_ref(),
            )?;
        }

        let container = match existing {
            Some(container) => container,
            None => {
                let container = TopicFactory::create(key, LIST_CONTENT_TYPE, Some(target))?;
                container.set_attribute(IS_HIDDEN_ATTRIBUTE, "1")?;
                container
            }
        };

        for existing in container.children() {
            if !models.iter().any(|m| m.key == existing.key()) {
                existing.detach();
            }
        }

        let mut pairs = Vec::with_capacity(models.len());
        let mut previous: Option<Topic> = None;
        for model in models {
            let topic = match container.find_child(&model.key) {
                Some(existing) => existing,
                None => TopicFactory::create(&model.key, &model.content_type, Some(&container))?,
            };
            topic.set_parent(&container, previous.as_ref())?;
            previous = Some(topic.clone());
            pairs.push((model, topic));
        }

        try_join_all(pairs.iter().map(|(model, topic)| self.map_into(model, topic))).await?;
        Ok(())
    }

    async fn resolve(
        &self,
        scope: &Topic,
        property: &PropertyDescriptor,
        key: &str,
    ) -> Result<Topic, MappingError> {
        let lookup = TopicLookup::UniqueKey(key.to_string());
        resolve_topic(self.store.as_ref(), scope, &lookup)
            .await?
            .ok_or_else(|| MappingError::Unresolved {
                property: property.name.clone(),
                key: key.to_string(),
            })
    }
}

fn shape_error(property: &PropertyDescriptor, value: &BindingValue, expected: &str) -> MappingError {
    MappingError::Conversion {
        property: property.name.clone(),
        value: format!("{value:?}"),
        expected: expected.to_string(),
    }
}
