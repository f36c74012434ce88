//! Declarative model descriptors.
//!
//! A [`ModelDescriptor`] plays the role a class definition plays in a
//! reflection-based mapper: it lists the properties of a view or binding
//! model, their types, and the hints that steer how each one is resolved.
//!
//! ```
//! use topicgraph_core::mapping::{ModelDescriptor, PropertyDescriptor, ScalarType};
//!
//! let page = ModelDescriptor::new("PageViewModel")
//!     .with(PropertyDescriptor::scalar("Title", ScalarType::Text))
//!     .with(PropertyDescriptor::list("Children", Some("PageViewModel")));
//!
//! assert!(page.property("Title").is_some());
//! ```

use serde::{Deserialize, Serialize};

use super::associations::AssociationTypes;
use super::coercion::ScalarType;

/// Where a collection property draws its topics from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionSource {
    /// Try each source in precedence order.
    #[default]
    Any,
    Children,
    Relationship,
    NestedTopics,
    IncomingRelationship,
    /// A list computed from the topic itself, e.g. `AttributeDescriptors`.
    MappedCollection,
}

/// The shape of a model property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Scalar(ScalarType),
    /// A single associated model. `model` overrides the content type convention.
    Model { model: Option<String> },
    /// A collection of associated models.
    ModelList { model: Option<String> },
    /// The unique key of a referenced topic.
    Key,
    /// The unique keys of related topics.
    KeyList,
}

/// One property of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub property_type: PropertyType,
    /// Attribute or association key, when it differs from `name`.
    pub attribute_key: Option<String>,
    pub default_value: Option<String>,
    /// Fall back to ancestors' values when the topic has none.
    pub inherit: bool,
    pub source: CollectionSource,
    /// Include every descendant of each collected topic.
    pub flatten: bool,
    /// Metadata lookup list supplying the collection.
    pub metadata: Option<String>,
    /// Associations to follow when mapping the associated models.
    pub include: AssociationTypes,
    /// Map the owning topic again into a nested model, reading attributes
    /// with this prefix.
    pub map_to_parent: Option<String>,
    pub disable_mapping: bool,
    /// Only keep collected topics whose attribute matches.
    pub attribute_filters: Vec<(String, String)>,
    pub content_type_filter: Option<String>,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            attribute_key: None,
            default_value: None,
            inherit: false,
            source: CollectionSource::Any,
            flatten: false,
            metadata: None,
            include: AssociationTypes::NONE,
            map_to_parent: None,
            disable_mapping: false,
            attribute_filters: Vec::new(),
            content_type_filter: None,
        }
    }

    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(name, PropertyType::Scalar(ty))
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::scalar(name, ScalarType::Text)
    }

    pub fn model(name: impl Into<String>, model: Option<&str>) -> Self {
        Self::new(
            name,
            PropertyType::Model {
                model: model.map(str::to_string),
            },
        )
    }

    pub fn list(name: impl Into<String>, model: Option<&str>) -> Self {
        Self::new(
            name,
            PropertyType::ModelList {
                model: model.map(str::to_string),
            },
        )
    }

    pub fn key(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Key)
    }

    pub fn key_list(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::KeyList)
    }

    pub fn attribute_key(mut self, key: impl Into<String>) -> Self {
        self.attribute_key = Some(key.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn inherit(mut self) -> Self {
        self.inherit = true;
        self
    }

    pub fn source(mut self, source: CollectionSource) -> Self {
        self.source = source;
        self
    }

    pub fn flatten(mut self) -> Self {
        self.flatten = true;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>) -> Self {
        self.metadata = Some(key.into());
        self
    }

    pub fn include(mut self, associations: AssociationTypes) -> Self {
        self.include = associations;
        self
    }

    pub fn map_to_parent(mut self, prefix: impl Into<String>) -> Self {
        self.map_to_parent = Some(prefix.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disable_mapping = true;
        self
    }

    pub fn filter_by_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attribute_filters.push((key.into(), value.into()));
        self
    }

    pub fn filter_by_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type_filter = Some(content_type.into());
        self
    }

    /// The attribute or association key this property reads.
    pub fn effective_key(&self) -> &str {
        self.attribute_key.as_deref().unwrap_or(&self.name)
    }

    /// Named model type for associated models, if one is pinned.
    pub fn model_type(&self) -> Option<&str> {
        match &self.property_type {
            PropertyType::Model { model } | PropertyType::ModelList { model } => model.as_deref(),
            _ => None,
        }
    }

    /// The association category gating this property.
    ///
    /// `NONE` means the property is mapped whenever its model is first built.
    pub fn association(&self) -> AssociationTypes {
        match &self.property_type {
            PropertyType::Scalar(_) => AssociationTypes::NONE,
            PropertyType::Model { .. } | PropertyType::Key => {
                if self.map_to_parent.is_some() {
                    AssociationTypes::NONE
                } else if self.effective_key() == "Parent" {
                    AssociationTypes::PARENTS
                } else {
                    AssociationTypes::REFERENCES
                }
            }
            PropertyType::ModelList { .. } | PropertyType::KeyList => {
                if self.metadata.is_some() {
                    return AssociationTypes::MAPPED_COLLECTIONS;
                }
                match self.source {
                    CollectionSource::Children => AssociationTypes::CHILDREN,
                    CollectionSource::Relationship => AssociationTypes::RELATIONSHIPS,
                    CollectionSource::IncomingRelationship => {
                        AssociationTypes::INCOMING_RELATIONSHIPS
                    }
                    CollectionSource::NestedTopics | CollectionSource::MappedCollection => {
                        AssociationTypes::MAPPED_COLLECTIONS
                    }
                    CollectionSource::Any if self.effective_key() == "Children" => {
                        AssociationTypes::CHILDREN
                    }
                    // Resolved at mapping time from whichever source holds the key.
                    CollectionSource::Any => {
                        AssociationTypes::RELATIONSHIPS
                            | AssociationTypes::INCOMING_RELATIONSHIPS
                            | AssociationTypes::MAPPED_COLLECTIONS
                    }
                }
            }
        }
    }
}

/// A named set of properties describing a view or binding model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub properties: Vec<PropertyDescriptor>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    pub fn with(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_association_categories() {
        assert_eq!(
            PropertyDescriptor::text("Title").association(),
            AssociationTypes::NONE
        );
        assert_eq!(
            PropertyDescriptor::list("Children", None).association(),
            AssociationTypes::CHILDREN
        );
        assert_eq!(
            PropertyDescriptor::list("Related", None).association(),
            AssociationTypes::RELATIONSHIPS
                | AssociationTypes::INCOMING_RELATIONSHIPS
                | AssociationTypes::MAPPED_COLLECTIONS
        );
        assert_eq!(
            PropertyDescriptor::list("Related", None)
                .source(CollectionSource::Relationship)
                .association(),
            AssociationTypes::RELATIONSHIPS
        );
        assert_eq!(
            PropertyDescriptor::list("Citations", None)
                .source(CollectionSource::IncomingRelationship)
                .association(),
            AssociationTypes::INCOMING_RELATIONSHIPS
        );
        assert_eq!(
            PropertyDescriptor::model("Parent", None).association(),
            AssociationTypes::PARENTS
        );
        assert_eq!(
            PropertyDescriptor::model("Author", None).association(),
            AssociationTypes::REFERENCES
        );
        assert_eq!(
            PropertyDescriptor::model("Contact", None)
                .map_to_parent("Contact")
                .association(),
            AssociationTypes::NONE
        );
        assert_eq!(
            PropertyDescriptor::list("Countries", None)
                .metadata("Countries")
                .association(),
            AssociationTypes::MAPPED_COLLECTIONS
        );
    }

    #[test]
    fn test_effective_key() {
        let property = PropertyDescriptor::text("Heading").attribute_key("Title");
        assert_eq!(property.effective_key(), "Title");
        assert_eq!(PropertyDescriptor::text("Title").effective_key(), "Title");
    }
}
