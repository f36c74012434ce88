//! The topic graph: an ordered tree of topics carrying attributes,
//! relationships and references.
//!
//! # Components
//!
//! - [`Topic`] - the node handle, owning its children
//! - [`AttributeCollection`] - dirty-tracked scalar values
//! - [`TopicRelationships`] - reciprocal multi-valued associations
//! - [`TopicReferences`] - reciprocal single-valued associations
//! - [`TopicFactory`] - validated construction
//!
//! # Example
//!
//! ```
//! use topicgraph_core::topic::TopicFactory;
//!
//! let root = TopicFactory::create("Root", "Page", None).unwrap();
//! let about = TopicFactory::create("About", "Page", Some(&root)).unwrap();
//!
//! assert_eq!(about.unique_key(), "Root:About");
//! assert_eq!(about.web_path(), "/About/");
//! ```

mod attributes;
mod children;
mod error;
mod factory;
mod key;
mod record;
mod references;
mod relationships;
#[allow(clippy::module_inception)]
mod topic;

pub use attributes::{
    AttributeCollection, CONTENT_TYPE_ATTRIBUTE, IS_DISABLED_ATTRIBUTE, IS_HIDDEN_ATTRIBUTE,
    KEY_ATTRIBUTE, LAST_MODIFIED_ATTRIBUTE, LAST_MODIFIED_BY_ATTRIBUTE, PARENT_ID_ATTRIBUTE,
    STRUCTURAL_ATTRIBUTES, TITLE_ATTRIBUTE,
};
pub use children::KeyedTopicCollection;
pub use error::TopicError;
pub use factory::{TopicFactory, TopicKind, ATTRIBUTE_DESCRIPTOR_SUFFIX, CONTENT_TYPE_DESCRIPTOR};
pub use key::{is_valid_key, validate_key};
pub use record::{AttributeRecord, TrackedRecord};
pub use references::{ReferenceCollection, TopicReferences, BASE_TOPIC_REFERENCE};
pub use relationships::{RelationshipDirection, RelationshipMultiMap, TopicRelationships};
pub use topic::{Topic, WeakTopic, UNIQUE_KEY_SEPARATOR, UNSAVED_ID};
