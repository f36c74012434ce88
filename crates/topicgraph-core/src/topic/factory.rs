//! Topic construction.

use serde::{Deserialize, Serialize};

use super::error::TopicError;
use super::key::validate_key;
use super::topic::{Placement, Topic, UNSAVED_ID};

/// Content type of topics that describe a content type.
pub const CONTENT_TYPE_DESCRIPTOR: &str = "ContentTypeDescriptor";

/// Suffix shared by the content types of attribute descriptor topics.
pub const ATTRIBUTE_DESCRIPTOR_SUFFIX: &str = "AttributeDescriptor";

/// The concrete subtype a topic represents, resolved from its content type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicKind {
    /// An ordinary content topic.
    #[default]
    Topic,
    /// A schema topic describing a content type.
    ContentTypeDescriptor,
    /// A schema topic describing one attribute of a content type.
    AttributeDescriptor,
}

impl TopicKind {
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type == CONTENT_TYPE_DESCRIPTOR {
            Self::ContentTypeDescriptor
        } else if content_type.ends_with(ATTRIBUTE_DESCRIPTOR_SUFFIX) {
            Self::AttributeDescriptor
        } else {
            Self::Topic
        }
    }

    pub fn is_descriptor(&self) -> bool {
        !matches!(self, Self::Topic)
    }
}

/// Creates topics, validating keys and attaching them to a parent.
pub struct TopicFactory;

impl TopicFactory {
    /// Create an unsaved topic, appended to `parent`'s children if given.
    pub fn create(
        key: &str,
        content_type: &str,
        parent: Option<&Topic>,
    ) -> Result<Topic, TopicError> {
        Self::build(key, content_type, parent, UNSAVED_ID)
    }

    /// Create a topic that already has a persisted id, as a store does when loading.
    pub fn create_with_id(
        key: &str,
        content_type: &str,
        parent: Option<&Topic>,
        id: i64,
    ) -> Result<Topic, TopicError> {
        Self::build(key, content_type, parent, id)
    }

    fn build(
        key: &str,
        content_type: &str,
        parent: Option<&Topic>,
        id: i64,
    ) -> Result<Topic, TopicError> {
        validate_key(key)?;
        validate_key(content_type)?;

        let topic = Topic::new_detached(key, content_type, id);
        if let Some(parent) = parent {
            topic.attach(parent, Placement::End)?;
        }
        Ok(topic)
    }
}
