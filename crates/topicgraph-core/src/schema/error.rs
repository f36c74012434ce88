//! Schema error types.

use thiserror::Error;

/// Errors raised when topics or models disagree with the registered schema.
///
/// These are developer-facing and meant to fail fast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// No content type descriptor is registered under this name.
    #[error("Unknown content type: '{0}'")]
    UnknownContentType(String),

    /// The content type has no descriptor for the attribute.
    #[error("The content type '{content_type}' does not define the attribute '{attribute}'")]
    MissingAttribute {
        content_type: String,
        attribute: String,
    },

    /// A descriptor topic could not be read as a descriptor.
    #[error("Invalid descriptor '{key}': {reason}")]
    InvalidDescriptor { key: String, reason: String },
}
