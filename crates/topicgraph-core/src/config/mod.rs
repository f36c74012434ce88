//! Configuration management for topicgraph.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `topicgraph.toml` file
//! 3. User config `~/.config/topicgraph/config.toml`
//! 4. Built-in defaults (lowest priority)

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod defaults;

pub use defaults::*;

use crate::mapping::AssociationTypes;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Topic graph configuration.
    pub topics: TopicsConfig,

    /// Mapping conventions.
    pub mapping: MappingConfig,

    /// Repository orchestration.
    pub repository: RepositoryConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./topicgraph.toml` (project local)
    /// 2. `~/.config/topicgraph/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        // Try project-local config first
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_file(DEFAULT_CONFIG_FILE);
        }

        // Try user config
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(DEFAULT_CONFIG_DIR).join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        // Use defaults
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        let var = |name: &str| std::env::var(format!("{ENV_PREFIX}{name}")).ok();

        // Topic overrides
        if let Some(key) = var("ROOT_KEY") {
            self.topics.root_key = key;
        }
        if let Some(hops) = var("MAX_INHERITANCE_HOPS") {
            if let Ok(n) = hops.parse() {
                self.topics.max_inheritance_hops = n;
            }
        }

        // Mapping overrides
        if let Some(suffix) = var("VIEW_MODEL_SUFFIX") {
            self.mapping.view_model_suffix = suffix;
        }
        if let Some(suffix) = var("BINDING_MODEL_SUFFIX") {
            self.mapping.binding_model_suffix = suffix;
        }
        if let Some(root) = var("METADATA_ROOT") {
            self.mapping.metadata_root = root;
        }

        // Repository overrides
        if let Some(capacity) = var("EVENT_CAPACITY") {
            if let Ok(n) = capacity.parse() {
                self.repository.event_capacity = n;
            }
        }
    }

    /// Check values that would otherwise fail later and less clearly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !crate::topic::is_valid_key(&self.topics.root_key) {
            return Err(ConfigError::Invalid(format!(
                "root_key '{}' is not a valid topic key",
                self.topics.root_key
            )));
        }
        let root = &self.topics.root_key;
        let beneath_root = |key: &str| {
            key == root.as_str()
                || key
                    .strip_prefix(root.as_str())
                    .is_some_and(|rest| rest.starts_with(crate::topic::UNIQUE_KEY_SEPARATOR))
        };
        for (name, key) in [
            ("content_type_root", &self.repository.content_type_root),
            ("metadata_root", &self.mapping.metadata_root),
        ] {
            if !beneath_root(key) {
                return Err(ConfigError::Invalid(format!(
                    "{name} '{key}' is not beneath root_key '{root}'"
                )));
            }
        }
        if self.repository.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        self.mapping.associations()?;
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Topic graph configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Key of the root topic.
    pub root_key: String,

    /// Maximum base topics followed when resolving derived attribute values.
    pub max_inheritance_hops: usize,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            root_key: DEFAULT_ROOT_KEY.to_string(),
            max_inheritance_hops: DEFAULT_MAX_INHERITANCE_HOPS,
        }
    }
}

/// Mapping conventions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Suffix resolving a content type to its view model.
    pub view_model_suffix: String,

    /// Suffix tried when the primary view model convention finds nothing.
    pub fallback_view_model_suffix: String,

    /// Suffix resolving a content type to its binding model.
    pub binding_model_suffix: String,

    /// Unique key of the metadata root used for lookup lists.
    pub metadata_root: String,

    /// Key of the list beneath each metadata topic.
    pub lookup_list_key: String,

    /// Associations mapped by default.
    pub default_associations: Vec<String>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            view_model_suffix: DEFAULT_VIEW_MODEL_SUFFIX.to_string(),
            fallback_view_model_suffix: DEFAULT_FALLBACK_VIEW_MODEL_SUFFIX.to_string(),
            binding_model_suffix: DEFAULT_BINDING_MODEL_SUFFIX.to_string(),
            metadata_root: DEFAULT_METADATA_ROOT.to_string(),
            lookup_list_key: DEFAULT_LOOKUP_LIST_KEY.to_string(),
            default_associations: DEFAULT_ASSOCIATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MappingConfig {
    /// Parse the configured default associations.
    pub fn associations(&self) -> Result<AssociationTypes, ConfigError> {
        self.default_associations
            .iter()
            .try_fold(AssociationTypes::NONE, |acc, name| {
                AssociationTypes::parse(name)
                    .map(|a| acc | a)
                    .ok_or_else(|| ConfigError::Invalid(format!("unknown association '{name}'")))
            })
    }
}

/// Repository orchestration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,

    /// Unique key of the topic holding content type descriptors.
    pub content_type_root: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            content_type_root: DEFAULT_CONTENT_TYPE_ROOT.to_string(),
        }
    }
}
