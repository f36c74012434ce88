//! A hierarchical content graph with schema-driven attributes and
//! convention-based mapping to and from plain models.
//!
//! - [`topic`]: the topic tree, attributes, relationships and references
//! - [`schema`]: content type and attribute descriptors
//! - [`repository`]: save, move, delete and rollback over a [`TopicStore`]
//! - [`mapping`]: topic to view model and binding model to topic
//! - [`config`]: layered configuration

pub mod config;
pub mod mapping;
pub mod repository;
pub mod schema;
pub mod topic;

pub use config::Config;
pub use mapping::{
    AssociationTypes, BindingModel, MappedGraph, MappingError, ReverseTopicMappingService,
    TopicMappingService,
};
pub use repository::{InMemoryTopicStore, RepositoryError, TopicRepository, TopicStore};
pub use schema::{ContentTypeDescriptorCollection, SchemaError};
pub use topic::{Topic, TopicError, TopicFactory};
