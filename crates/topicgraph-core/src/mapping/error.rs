//! Mapping error types.

use thiserror::Error;

use crate::repository::RepositoryError;
use crate::schema::SchemaError;
use crate::topic::TopicError;

/// Errors raised while mapping between topics and models.
#[derive(Debug, Error)]
pub enum MappingError {
    /// No model descriptor is registered under any of the tried names.
    #[error("No model type found for '{content_type}' (tried: {tried})")]
    UnknownModelType { content_type: String, tried: String },

    /// A model property disagrees with the schema or with mapping rules.
    #[error("Invalid model definition {model}.{property}: {reason}")]
    ModelDefinition {
        model: String,
        property: String,
        reason: String,
    },

    /// A binding model property has no matching attribute on the content type.
    #[error("The binding model '{model}' maps '{property}', which '{content_type}' does not define")]
    MissingAttribute {
        model: String,
        property: String,
        content_type: String,
    },

    /// A topic named by a binding model or a foreign key could not be located.
    #[error("Could not resolve '{key}' for property '{property}'")]
    Unresolved { property: String, key: String },

    /// The binding model targets a different topic.
    #[error("Binding model key '{model_key}' does not match target topic '{topic_key}'")]
    KeyMismatch { model_key: String, topic_key: String },

    /// The binding model's content type differs from the target topic's.
    #[error("Binding model content type '{model}' does not match target content type '{topic}'")]
    ContentTypeMismatch { model: String, topic: String },

    /// A value could not be converted to the property's type.
    #[error("Cannot convert '{value}' to {expected} for property '{property}'")]
    Conversion {
        property: String,
        value: String,
        expected: String,
    },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
