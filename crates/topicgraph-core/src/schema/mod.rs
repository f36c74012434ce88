//! Schema metadata: which attributes each content type carries and how
//! each attribute is stored.

mod attribute;
mod content_type;
mod error;
mod registry;

pub use attribute::{AttributeDescriptor, ModelType};
pub use content_type::{
    ContentTypeDescriptor, ATTRIBUTES_CONTAINER, PERMITTED_CONTENT_TYPES_RELATIONSHIP,
};
pub use error::SchemaError;
pub use registry::{ContentTypeDescriptorCollection, CONTAINER_CONTENT_TYPE, LIST_CONTENT_TYPE};
