//! Binding model validation against the schema.

use dashmap::DashSet;
use tracing::debug;

use super::descriptor::{CollectionSource, ModelDescriptor, PropertyDescriptor, PropertyType};
use super::error::MappingError;
use super::lookup::TypeLookupService;
use crate::schema::{ContentTypeDescriptorCollection, ModelType};
use crate::topic::{CONTENT_TYPE_ATTRIBUTE, KEY_ATTRIBUTE};

/// Checks that a binding model can be written to a content type.
///
/// A `(model type, content type)` pair is only validated once; later
/// calls for the same pair return immediately.
#[derive(Debug, Default)]
pub struct BindingModelValidator {
    validated: DashSet<(String, String)>,
}

impl BindingModelValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_validated(&self, model_type: &str, content_type: &str) -> bool {
        self.validated
            .contains(&(model_type.to_string(), content_type.to_string()))
    }

    /// Number of validated pairs.
    pub fn len(&self) -> usize {
        self.validated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validated.is_empty()
    }

    pub fn validate(
        &self,
        model: &ModelDescriptor,
        content_type: &str,
        schema: &ContentTypeDescriptorCollection,
        types: &dyn TypeLookupService,
    ) -> Result<(), MappingError> {
        if self.is_validated(&model.name, content_type) {
            return Ok(());
        }

        let attributes = schema.attribute_descriptors(content_type)?;
        for property in &model.properties {
            if property.disable_mapping
                || property.name == KEY_ATTRIBUTE
                || property.name == CONTENT_TYPE_ATTRIBUTE
            {
                continue;
            }
            let definition_error = |reason: &str| MappingError::ModelDefinition {
                model: model.name.clone(),
                property: property.name.clone(),
                reason: reason.to_string(),
            };

            let key = property.effective_key();
            if key == "Children" || property.source == CollectionSource::Children {
                return Err(definition_error("children cannot be bound to a topic"));
            }
            if key == "Parent" {
                return Err(definition_error("the parent cannot be bound to a topic"));
            }

            let attribute = attributes.iter().find(|a| a.key == key).ok_or_else(|| {
                MappingError::MissingAttribute {
                    model: model.name.clone(),
                    property: property.name.clone(),
                    content_type: content_type.to_string(),
                }
            })?;

            match attribute.model_type {
                ModelType::ScalarValue => {
                    if !matches!(property.property_type, PropertyType::Scalar(_)) {
                        return Err(definition_error("scalar attributes need a scalar property"));
                    }
                }
                ModelType::Relationship => {
                    if property.property_type != PropertyType::KeyList {
                        return Err(definition_error(
                            "relationships need a list of unique keys",
                        ));
                    }
                }
                ModelType::Reference => {
                    if property.property_type != PropertyType::Key {
                        return Err(definition_error("references need a unique key"));
                    }
                }
                ModelType::NestedTopic => validate_nested(property, types)
                    .map_err(|reason| definition_error(&reason))?,
            }
        }

        debug!(model = %model.name, content_type, "Validated binding model");
        self.validated
            .insert((model.name.clone(), content_type.to_string()));
        Ok(())
    }
}

fn validate_nested(
    property: &PropertyDescriptor,
    types: &dyn TypeLookupService,
) -> Result<(), String> {
    let PropertyType::ModelList { model } = &property.property_type else {
        return Err("nested topics need a list of binding models".to_string());
    };
    let name = model
        .as_deref()
        .ok_or_else(|| "nested topic lists must name their binding model".to_string())?;
    if types.lookup(name).is_none() {
        return Err(format!("nested binding model '{name}' is not registered"));
    }
    Ok(())
}
