//! The in-memory content type registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::attribute::{AttributeDescriptor, ModelType};
use super::content_type::ContentTypeDescriptor;
use super::error::SchemaError;
use crate::topic::{Topic, TopicKind, CONTENT_TYPE_DESCRIPTOR};

/// Content type of the hidden containers holding nested topics.
pub const LIST_CONTENT_TYPE: &str = "List";

/// Content type for structural folders with no attributes of their own.
pub const CONTAINER_CONTENT_TYPE: &str = "Container";

/// Guards against malformed base chains.
const MAX_BASE_DEPTH: usize = 32;

/// Registered content type descriptors, keyed by content type name.
///
/// Internally synchronised so a repository can register descriptors while
/// mapping services read them.
#[derive(Debug, Default)]
pub struct ContentTypeDescriptorCollection {
    descriptors: RwLock<BTreeMap<String, Arc<ContentTypeDescriptor>>>,
}

impl ContentTypeDescriptorCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with the content types the graph itself relies on:
    /// containers, nested lists, and the schema descriptor types.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(ContentTypeDescriptor::new(CONTAINER_CONTENT_TYPE));
        registry.register(ContentTypeDescriptor::new(LIST_CONTENT_TYPE));
        registry.register(
            ContentTypeDescriptor::new(CONTENT_TYPE_DESCRIPTOR)
                .with_attribute(AttributeDescriptor::scalar("Title"))
                .with_attribute(AttributeDescriptor::relationship("ContentTypes"))
                .with_attribute(AttributeDescriptor::nested_topic("Attributes")),
        );

        let attribute_base = ContentTypeDescriptor::new("AttributeDescriptor")
            .with_attribute(AttributeDescriptor::scalar("Title"))
            .with_attribute(AttributeDescriptor::scalar("ModelType"))
            .with_attribute(AttributeDescriptor::scalar("IsRequired"))
            .with_attribute(AttributeDescriptor::scalar("DefaultValue"));
        registry.register(attribute_base);

        for editor in [
            "TextAttributeDescriptor",
            "BooleanAttributeDescriptor",
            "NumberAttributeDescriptor",
            "DateTimeAttributeDescriptor",
            "RelationshipAttributeDescriptor",
            "NestedTopicListAttributeDescriptor",
            "TopicReferenceAttributeDescriptor",
        ] {
            registry.register(ContentTypeDescriptor::new(editor).with_base("AttributeDescriptor"));
        }
        registry
    }

    /// Register a descriptor, replacing any with the same key.
    pub fn register(&self, descriptor: ContentTypeDescriptor) {
        self.descriptors
            .write()
            .insert(descriptor.key.clone(), Arc::new(descriptor));
    }

    /// Register every content type descriptor topic in `root`'s subtree.
    pub fn register_topics(&self, root: &Topic) -> Result<usize, SchemaError> {
        let mut count = 0;
        for topic in std::iter::once(root.clone()).chain(root.descendants()) {
            if topic.kind() == TopicKind::ContentTypeDescriptor {
                self.register(ContentTypeDescriptor::from_topic(&topic)?);
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<ContentTypeDescriptor>> {
        self.descriptors.write().remove(key)
    }

    pub fn get(&self, key: &str) -> Option<Arc<ContentTypeDescriptor>> {
        self.descriptors.read().get(key).cloned()
    }

    /// Like [`Self::get`], failing with [`SchemaError::UnknownContentType`].
    pub fn require(&self, key: &str) -> Result<Arc<ContentTypeDescriptor>, SchemaError> {
        self.get(key)
            .ok_or_else(|| SchemaError::UnknownContentType(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.descriptors.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.descriptors.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }

    /// Every attribute of `content_type`, including inherited ones.
    ///
    /// Attributes declared closer to the content type override those of
    /// the same key further up the base chain.
    pub fn attribute_descriptors(
        &self,
        content_type: &str,
    ) -> Result<Vec<AttributeDescriptor>, SchemaError> {
        let mut chain = Vec::new();
        let mut current = Some(self.require(content_type)?);
        while let Some(descriptor) = current {
            if chain.len() >= MAX_BASE_DEPTH {
                break;
            }
            current = descriptor
                .base_content_type
                .as_deref()
                .and_then(|base| self.get(base));
            chain.push(descriptor);
        }

        let mut result: Vec<AttributeDescriptor> = Vec::new();
        for descriptor in chain {
            for attribute in &descriptor.attributes {
                if !result.iter().any(|a| a.key == attribute.key) {
                    result.push(attribute.clone());
                }
            }
        }
        Ok(result)
    }

    /// Resolve one attribute of `content_type`, following the base chain.
    pub fn attribute(
        &self,
        content_type: &str,
        key: &str,
    ) -> Result<AttributeDescriptor, SchemaError> {
        self.attribute_descriptors(content_type)?
            .into_iter()
            .find(|a| a.key == key)
            .ok_or_else(|| SchemaError::MissingAttribute {
                content_type: content_type.to_string(),
                attribute: key.to_string(),
            })
    }

    /// The model type of an attribute, or `None` if the schema doesn't declare it.
    pub fn model_type(&self, content_type: &str, key: &str) -> Option<ModelType> {
        self.attribute(content_type, key).ok().map(|a| a.model_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ContentTypeDescriptorCollection {
        let registry = ContentTypeDescriptorCollection::with_builtins();
        registry.register(
            ContentTypeDescriptor::new("Page")
                .with_attribute(AttributeDescriptor::scalar("Title"))
                .with_attribute(AttributeDescriptor::scalar("Body").with_default("Empty")),
        );
        registry.register(
            ContentTypeDescriptor::new("Article")
                .with_base("Page")
                .with_attribute(AttributeDescriptor::relationship("Tags"))
                .with_attribute(AttributeDescriptor::scalar("Body").required()),
        );
        registry
    }

    #[test]
    fn test_require_unknown() {
        let registry = registry();
        assert_eq!(
            registry.require("Missing").unwrap_err(),
            SchemaError::UnknownContentType("Missing".to_string())
        );
    }

    #[test]
    fn test_inherited_attributes() {
        let registry = registry();
        let attributes = registry.attribute_descriptors("Article").unwrap();
        let keys: Vec<&str> = attributes.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["Tags", "Body", "Title"]);

        // The closer declaration wins.
        assert!(registry.attribute("Article", "Body").unwrap().is_required);
        assert_eq!(
            registry.model_type("Article", "Tags"),
            Some(ModelType::Relationship)
        );
        assert!(matches!(
            registry.attribute("Page", "Tags"),
            Err(SchemaError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_register_replaces() {
        let registry = registry();
        registry.register(ContentTypeDescriptor::new("Page"));
        assert!(registry.attribute_descriptors("Page").unwrap().is_empty());
    }

    #[test]
    fn test_builtins() {
        let registry = ContentTypeDescriptorCollection::with_builtins();
        assert!(registry.contains(LIST_CONTENT_TYPE));
        assert!(registry.contains(CONTENT_TYPE_DESCRIPTOR));
        assert!(registry
            .attribute("TextAttributeDescriptor", "DefaultValue")
            .is_ok());
    }
}
