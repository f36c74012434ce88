//! Content type descriptors.

use serde::{Deserialize, Serialize};

use super::attribute::AttributeDescriptor;
use super::error::SchemaError;
use crate::topic::{Topic, TopicKind};

/// Key of the nested list holding a content type's attribute descriptors.
pub const ATTRIBUTES_CONTAINER: &str = "Attributes";

/// Relationship listing the content types permitted as children.
pub const PERMITTED_CONTENT_TYPES_RELATIONSHIP: &str = "ContentTypes";

/// Describes the attributes a topic of a given content type carries.
///
/// Attributes declared on the base content type are inherited; the registry
/// resolves the full set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeDescriptor {
    pub key: String,
    pub base_content_type: Option<String>,
    pub attributes: Vec<AttributeDescriptor>,
    pub permitted_content_types: Vec<String>,
}

impl ContentTypeDescriptor {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            base_content_type: None,
            attributes: Vec::new(),
            permitted_content_types: Vec::new(),
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base_content_type = Some(base.into());
        self
    }

    /// Add or replace an attribute descriptor.
    pub fn with_attribute(mut self, attribute: AttributeDescriptor) -> Self {
        self.attributes.retain(|a| a.key != attribute.key);
        self.attributes.push(attribute);
        self
    }

    pub fn with_permitted(mut self, content_type: impl Into<String>) -> Self {
        self.permitted_content_types.push(content_type.into());
        self
    }

    /// An attribute declared directly on this content type.
    pub fn own_attribute(&self, key: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.key == key)
    }

    /// Read a descriptor from a `ContentTypeDescriptor` topic.
    ///
    /// Attribute descriptors live in the nested `Attributes` list; a parent
    /// that is itself a content type descriptor becomes the base.
    pub fn from_topic(topic: &Topic) -> Result<Self, SchemaError> {
        if topic.kind() != TopicKind::ContentTypeDescriptor {
            return Err(SchemaError::InvalidDescriptor {
                key: topic.key(),
                reason: format!("'{}' is not a content type descriptor", topic.content_type()),
            });
        }

        let base_content_type = topic
            .parent()
            .filter(|p| p.kind() == TopicKind::ContentTypeDescriptor)
            .map(|p| p.key());

        let attributes = match topic.find_child(ATTRIBUTES_CONTAINER) {
            Some(container) => container
                .children()
                .iter()
                .filter(|t| t.kind() == TopicKind::AttributeDescriptor)
                .map(AttributeDescriptor::from_topic)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let permitted_content_types = topic
            .relationships()
            .get_values(PERMITTED_CONTENT_TYPES_RELATIONSHIP)
            .iter()
            .map(Topic::key)
            .collect();

        Ok(Self {
            key: topic.key(),
            base_content_type,
            attributes,
            permitted_content_types,
        })
    }
}
