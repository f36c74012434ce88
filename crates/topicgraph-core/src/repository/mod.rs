//! Persistence orchestration.
//!
//! [`TopicRepository`] enforces schema and tree rules and raises lifecycle
//! notifications; the physical write is delegated to a [`TopicStore`].
//! [`InMemoryTopicStore`] is a complete store kept in process memory.

mod base;
mod error;
mod events;
mod memory;
mod store;

pub use base::TopicRepository;
pub use error::RepositoryError;
pub use events::{RepositoryEvent, RepositoryEvents};
pub use memory::InMemoryTopicStore;
pub use store::{resolve_topic, TopicLookup, TopicStore};
