//! Resolving model descriptors by name.

use std::collections::HashMap;
use std::sync::Arc;

use super::descriptor::ModelDescriptor;
use super::error::MappingError;
use crate::config::MappingConfig;

/// Resolves model type names to descriptors.
pub trait TypeLookupService: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<ModelDescriptor>>;
}

/// An in-memory registry of model descriptors.
#[derive(Debug, Default)]
pub struct StaticTypeLookupService {
    types: HashMap<String, Arc<ModelDescriptor>>,
}

impl StaticTypeLookupService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, descriptor: ModelDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn register(&mut self, descriptor: ModelDescriptor) {
        self.types
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeLookupService for StaticTypeLookupService {
    fn lookup(&self, name: &str) -> Option<Arc<ModelDescriptor>> {
        self.types.get(name).cloned()
    }
}

/// Resolve the view model for `content_type` by naming convention.
///
/// Tries `{ContentType}{view_model_suffix}`, then the fallback suffix.
pub fn resolve_view_model(
    types: &dyn TypeLookupService,
    config: &MappingConfig,
    content_type: &str,
) -> Result<Arc<ModelDescriptor>, MappingError> {
    let candidates = [
        format!("{content_type}{}", config.view_model_suffix),
        format!("{content_type}{}", config.fallback_view_model_suffix),
    ];
    candidates
        .iter()
        .find_map(|name| types.lookup(name))
        .ok_or_else(|| MappingError::UnknownModelType {
            content_type: content_type.to_string(),
            tried: candidates.join(", "),
        })
}

/// Resolve a model explicitly named by a property or caller.
pub fn resolve_named(
    types: &dyn TypeLookupService,
    name: &str,
) -> Result<Arc<ModelDescriptor>, MappingError> {
    types
        .lookup(name)
        .ok_or_else(|| MappingError::UnknownModelType {
            content_type: name.to_string(),
            tried: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convention_with_fallback() {
        let types = StaticTypeLookupService::new()
            .with(ModelDescriptor::new("PageViewModel"))
            .with(ModelDescriptor::new("ContactTopicViewModel"));
        let config = MappingConfig::default();

        assert_eq!(
            resolve_view_model(&types, &config, "Page").unwrap().name,
            "PageViewModel"
        );
        assert_eq!(
            resolve_view_model(&types, &config, "Contact").unwrap().name,
            "ContactTopicViewModel"
        );
        assert!(matches!(
            resolve_view_model(&types, &config, "Video"),
            Err(MappingError::UnknownModelType { .. })
        ));
    }
}
