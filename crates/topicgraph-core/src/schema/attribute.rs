//! Attribute descriptors.

use serde::{Deserialize, Serialize};

use super::error::SchemaError;
use crate::topic::{Topic, TopicKind};

/// How an attribute is stored on a topic, and therefore how it maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    /// A value in the attribute collection.
    #[default]
    ScalarValue,
    /// A named, multi-valued relationship.
    Relationship,
    /// A hidden child list of structured topics.
    NestedTopic,
    /// A named, single-valued reference.
    Reference,
}

impl ModelType {
    /// Infer the model type from an attribute descriptor's content type.
    pub fn from_editor_type(editor_type: &str) -> Self {
        match editor_type {
            "RelationshipAttributeDescriptor" => Self::Relationship,
            "NestedTopicListAttributeDescriptor" => Self::NestedTopic,
            "TopicReferenceAttributeDescriptor" => Self::Reference,
            _ => Self::ScalarValue,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ScalarValue" => Some(Self::ScalarValue),
            "Relationship" => Some(Self::Relationship),
            "NestedTopic" => Some(Self::NestedTopic),
            "Reference" => Some(Self::Reference),
            _ => None,
        }
    }
}

/// Describes one attribute a content type expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub key: String,
    pub model_type: ModelType,
    /// Content type of the descriptor topic, e.g. `TextAttributeDescriptor`.
    pub editor_type: String,
    pub is_required: bool,
    pub default_value: Option<String>,
}

impl AttributeDescriptor {
    pub fn new(key: impl Into<String>, model_type: ModelType) -> Self {
        let editor_type = match model_type {
            ModelType::ScalarValue => "TextAttributeDescriptor",
            ModelType::Relationship => "RelationshipAttributeDescriptor",
            ModelType::NestedTopic => "NestedTopicListAttributeDescriptor",
            ModelType::Reference => "TopicReferenceAttributeDescriptor",
        };
        Self {
            key: key.into(),
            model_type,
            editor_type: editor_type.to_string(),
            is_required: false,
            default_value: None,
        }
    }

    pub fn scalar(key: impl Into<String>) -> Self {
        Self::new(key, ModelType::ScalarValue)
    }

    pub fn relationship(key: impl Into<String>) -> Self {
        Self::new(key, ModelType::Relationship)
    }

    pub fn nested_topic(key: impl Into<String>) -> Self {
        Self::new(key, ModelType::NestedTopic)
    }

    pub fn reference(key: impl Into<String>) -> Self {
        Self::new(key, ModelType::Reference)
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Read a descriptor from an attribute descriptor topic.
    ///
    /// An explicit `ModelType` attribute wins over the type inferred from the
    /// topic's content type.
    pub fn from_topic(topic: &Topic) -> Result<Self, SchemaError> {
        if topic.kind() != TopicKind::AttributeDescriptor {
            return Err(SchemaError::InvalidDescriptor {
                key: topic.key(),
                reason: format!("'{}' is not an attribute descriptor", topic.content_type()),
            });
        }

        let editor_type = topic.content_type();
        let model_type = match topic.get_value("ModelType") {
            Some(value) => ModelType::parse(&value).ok_or_else(|| SchemaError::InvalidDescriptor {
                key: topic.key(),
                reason: format!("unknown model type '{value}'"),
            })?,
            None => ModelType::from_editor_type(&editor_type),
        };

        Ok(Self {
            key: topic.key(),
            model_type,
            editor_type,
            is_required: topic.get_bool("IsRequired").unwrap_or(false),
            default_value: topic.get_value("DefaultValue"),
        })
    }
}
