//! Default values for topicgraph configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Topic Defaults
// ============================================================================

/// Key of the root topic of a graph.
pub const DEFAULT_ROOT_KEY: &str = "Root";

/// Maximum number of base topics followed when resolving a derived attribute.
pub const DEFAULT_MAX_INHERITANCE_HOPS: usize = 5;

// ============================================================================
// Mapping Defaults
// ============================================================================

/// Suffix appended to a content type to find its view model (`Page` -> `PageViewModel`).
pub const DEFAULT_VIEW_MODEL_SUFFIX: &str = "ViewModel";

/// Second suffix tried when no view model matches the primary convention.
pub const DEFAULT_FALLBACK_VIEW_MODEL_SUFFIX: &str = "TopicViewModel";

/// Suffix appended to a content type to find its binding model.
pub const DEFAULT_BINDING_MODEL_SUFFIX: &str = "BindingModel";

/// Unique key of the topic holding metadata lookup lists.
pub const DEFAULT_METADATA_ROOT: &str = "Root:Configuration:Metadata";

/// Key of the list beneath each metadata topic holding its values.
pub const DEFAULT_LOOKUP_LIST_KEY: &str = "LookupList";

/// Associations mapped when a caller doesn't specify any.
pub const DEFAULT_ASSOCIATIONS: &[&str] = &[
    "Children",
    "Relationships",
    "IncomingRelationships",
    "References",
    "MappedCollections",
    "Parents",
];

// ============================================================================
// Repository Defaults
// ============================================================================

/// Capacity of the lifecycle event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Unique key of the topic holding content type descriptors.
pub const DEFAULT_CONTENT_TYPE_ROOT: &str = "Root:Configuration:ContentTypes";

// ============================================================================
// Config File Defaults
// ============================================================================

/// Project-local configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "topicgraph.toml";

/// Directory under the user config dir holding `config.toml`.
pub const DEFAULT_CONFIG_DIR: &str = "topicgraph";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "TOPICGRAPH_";
