//! Convention-based mapping between topics and plain models.
//!
//! - [`TopicMappingService`] maps a topic into a [`MappedGraph`] of view
//!   models, following the associations requested by the caller.
//! - [`ReverseTopicMappingService`] writes a [`BindingModel`] back onto a
//!   topic after [`BindingModelValidator`] has checked it against the schema.
//!
//! Model shapes are declared with [`ModelDescriptor`]s and resolved by name
//! through a [`TypeLookupService`].

mod associations;
mod cache;
pub mod coercion;
mod descriptor;
mod error;
mod forward;
mod lookup;
mod model;
mod reverse;
mod validator;

pub use associations::AssociationTypes;
pub use cache::{MappedTopicCache, MappedTopicCacheEntry, Reservation};
pub use coercion::{ScalarType, ScalarValue};
pub use descriptor::{CollectionSource, ModelDescriptor, PropertyDescriptor, PropertyType};
pub use error::MappingError;
pub use forward::TopicMappingService;
pub use lookup::{resolve_named, resolve_view_model, StaticTypeLookupService, TypeLookupService};
pub use model::{BindingModel, BindingValue, MappedGraph, ModelId, ModelValue, ViewModel};
pub use reverse::ReverseTopicMappingService;
pub use validator::BindingModelValidator;
