//! Mapped view models and binding models.
//!
//! Forward mapping produces a [`MappedGraph`]: an arena of [`ViewModel`]s
//! addressed by [`ModelId`]. Associations between models are ids, so a
//! graph with cycles maps to a finite set of models with each topic
//! appearing once per model type.

use std::collections::{BTreeMap, HashSet};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::coercion::{ScalarType, ScalarValue};
use super::descriptor::{ModelDescriptor, PropertyType};
use super::error::MappingError;
use super::lookup::{resolve_named, TypeLookupService};
use crate::topic::{CONTENT_TYPE_ATTRIBUTE, KEY_ATTRIBUTE};

/// Index of a model within a [`MappedGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModelId(usize);

impl ModelId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A mapped property value.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelValue {
    Null,
    Scalar(ScalarValue),
    Key(String),
    Keys(Vec<String>),
    Model(ModelId),
    Models(Vec<ModelId>),
}

/// One mapped topic.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    pub model_type: String,
    pub topic_id: i64,
    pub topic_key: String,
    pub properties: BTreeMap<String, ModelValue>,
}

impl ViewModel {
    pub fn get(&self, name: &str) -> Option<&ModelValue> {
        self.properties.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<&ScalarValue> {
        match self.properties.get(name) {
            Some(ModelValue::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    /// A scalar property rendered as text.
    pub fn text(&self, name: &str) -> Option<String> {
        self.scalar(name).map(ScalarValue::to_attribute_string)
    }

    pub fn model(&self, name: &str) -> Option<ModelId> {
        match self.properties.get(name) {
            Some(ModelValue::Model(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn models(&self, name: &str) -> &[ModelId] {
        match self.properties.get(name) {
            Some(ModelValue::Models(ids)) => ids,
            _ => &[],
        }
    }
}

/// Models under construction during a single mapping run.
#[derive(Debug, Default)]
pub(crate) struct ModelArena {
    models: Mutex<Vec<ViewModel>>,
}

impl ModelArena {
    pub(crate) fn allocate(&self, model_type: &str, topic_id: i64, topic_key: &str) -> ModelId {
        let mut models = self.models.lock();
        models.push(ViewModel {
            model_type: model_type.to_string(),
            topic_id,
            topic_key: topic_key.to_string(),
            properties: BTreeMap::new(),
        });
        ModelId(models.len() - 1)
    }

    pub(crate) fn set_properties(&self, id: ModelId, values: Vec<(String, ModelValue)>) {
        let mut models = self.models.lock();
        if let Some(model) = models.get_mut(id.0) {
            model.properties.extend(values);
        }
    }

    pub(crate) fn into_graph(self, root: ModelId) -> MappedGraph {
        MappedGraph {
            root,
            models: self.models.into_inner(),
        }
    }
}

/// The result of a forward mapping run.
#[derive(Debug, Clone)]
pub struct MappedGraph {
    root: ModelId,
    models: Vec<ViewModel>,
}

impl MappedGraph {
    pub fn root_id(&self) -> ModelId {
        self.root
    }

    pub fn root(&self) -> &ViewModel {
        &self.models[self.root.0]
    }

    pub fn get(&self, id: ModelId) -> Option<&ViewModel> {
        self.models.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn models(&self) -> &[ViewModel] {
        &self.models
    }

    /// Resolve a list property of `id` into its models.
    pub fn related(&self, id: ModelId, name: &str) -> Vec<&ViewModel> {
        self.get(id)
            .map(|m| m.models(name).iter().filter_map(|id| self.get(*id)).collect())
            .unwrap_or_default()
    }

    /// Expand the model at `id` into a JSON tree.
    ///
    /// A model already being expanded further up the tree is written as a
    /// stub holding only `Id` and `Key`.
    pub fn to_json(&self, id: ModelId) -> Value {
        let mut path = HashSet::new();
        self.expand(id, &mut path)
    }

    fn expand(&self, id: ModelId, path: &mut HashSet<ModelId>) -> Value {
        let Some(model) = self.get(id) else {
            return Value::Null;
        };
        if !path.insert(id) {
            let mut stub = Map::new();
            stub.insert("Id".to_string(), Value::from(model.topic_id));
            stub.insert(KEY_ATTRIBUTE.to_string(), Value::from(model.topic_key.clone()));
            return Value::Object(stub);
        }

        let mut object = Map::new();
        for (name, value) in &model.properties {
            let json = match value {
                ModelValue::Null => Value::Null,
                ModelValue::Scalar(scalar) => scalar.to_json(),
                ModelValue::Key(key) => Value::from(key.clone()),
                ModelValue::Keys(keys) => Value::from(keys.clone()),
                ModelValue::Model(child) => self.expand(*child, path),
                ModelValue::Models(children) => Value::Array(
                    children.iter().map(|child| self.expand(*child, path)).collect(),
                ),
            };
            object.insert(name.clone(), json);
        }

        path.remove(&id);
        Value::Object(object)
    }

    /// Deserialize the root model into a caller type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, MappingError> {
        Ok(serde_json::from_value(self.to_json(self.root))?)
    }
}

/// A binding model property value.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingValue {
    Null,
    Scalar(ScalarValue),
    /// Unique key of a referenced topic.
    Key(String),
    /// Unique keys of related topics.
    Keys(Vec<String>),
    /// Nested topics, mapped into a hidden list beneath the target.
    Models(Vec<BindingModel>),
}

/// Inbound data bound to a topic by reverse mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingModel {
    pub model_type: String,
    pub key: String,
    pub content_type: String,
    pub properties: BTreeMap<String, BindingValue>,
}

impl BindingModel {
    pub fn new(
        model_type: impl Into<String>,
        key: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            model_type: model_type.into(),
            key: key.into(),
            content_type: content_type.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: BindingValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(name, BindingValue::Scalar(ScalarValue::Text(value.into())))
    }

    pub fn get(&self, name: &str) -> Option<&BindingValue> {
        self.properties.get(name)
    }

    /// Build a binding model from any serializable value.
    ///
    /// `Key` and `ContentType` are read from the value when present, and
    /// each property of `descriptor` is read by name. Nested models default
    /// to the content type named by their model type less `suffix`.
    pub fn from_serializable<T: Serialize>(
        value: &T,
        descriptor: &ModelDescriptor,
        content_type: &str,
        suffix: &str,
        types: &dyn TypeLookupService,
    ) -> Result<Self, MappingError> {
        let json = serde_json::to_value(value)?;
        Self::from_json(&json, descriptor, content_type, suffix, types)
    }

    fn from_json(
        json: &Value,
        descriptor: &ModelDescriptor,
        content_type: &str,
        suffix: &str,
        types: &dyn TypeLookupService,
    ) -> Result<Self, MappingError> {
        let object = json.as_object().ok_or_else(|| MappingError::Conversion {
            property: descriptor.name.clone(),
            value: json.to_string(),
            expected: "object".to_string(),
        })?;
        let key = object
            .get(KEY_ATTRIBUTE)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let content_type = object
            .get(CONTENT_TYPE_ATTRIBUTE)
            .and_then(Value::as_str)
            .unwrap_or(content_type);

        let mut model = Self::new(&descriptor.name, key, content_type);
        for property in &descriptor.properties {
            if property.disable_mapping {
                continue;
            }
            let Some(raw) = object.get(&property.name) else {
                continue;
            };
            let value =
                binding_value(raw, &property.property_type, &property.name, suffix, types)?;
            model.properties.insert(property.name.clone(), value);
        }
        Ok(model)
    }

    /// Copy the scalar and key properties of a mapped view model.
    pub fn from_view_model(
        view: &ViewModel,
        model_type: &str,
        content_type: &str,
        descriptor: &ModelDescriptor,
    ) -> Self {
        let mut model = Self::new(model_type, &view.topic_key, content_type);
        for property in &descriptor.properties {
            let value = match view.get(&property.name) {
                Some(ModelValue::Scalar(s)) => BindingValue::Scalar(s.clone()),
                Some(ModelValue::Key(k)) => BindingValue::Key(k.clone()),
                Some(ModelValue::Keys(k)) => BindingValue::Keys(k.clone()),
                Some(ModelValue::Null) => BindingValue::Null,
                _ => continue,
            };
            model.properties.insert(property.name.clone(), value);
        }
        model
    }
}

fn binding_value(
    raw: &Value,
    property_type: &PropertyType,
    property: &str,
    suffix: &str,
    types: &dyn TypeLookupService,
) -> Result<BindingValue, MappingError> {
    if raw.is_null() {
        return Ok(BindingValue::Null);
    }
    let conversion = |expected: &str| MappingError::Conversion {
        property: property.to_string(),
        value: raw.to_string(),
        expected: expected.to_string(),
    };
    match property_type {
        PropertyType::Scalar(ty) => ScalarValue::from_json(raw, *ty)
            .map(BindingValue::Scalar)
            .ok_or_else(|| conversion(scalar_name(*ty))),
        PropertyType::Key => raw
            .as_str()
            .map(|k| BindingValue::Key(k.to_string()))
            .ok_or_else(|| conversion("unique key")),
        PropertyType::KeyList => raw
            .as_array()
            .and_then(|items| {
                items
                    .iter()
                    .map(|i| i.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .map(BindingValue::Keys)
            .ok_or_else(|| conversion("list of unique keys")),
        PropertyType::ModelList { model } => {
            let name = model.as_deref().ok_or_else(|| MappingError::ModelDefinition {
                model: String::new(),
                property: property.to_string(),
                reason: "nested binding lists must name their model type".to_string(),
            })?;
            let nested = resolve_named(types, name)?;
            let items = raw.as_array().ok_or_else(|| conversion("list"))?;
            let content_type = name.strip_suffix(suffix).unwrap_or(name);
            items
                .iter()
                .map(|item| BindingModel::from_json(item, &nested, content_type, suffix, types))
                .collect::<Result<Vec<_>, _>>()
                .map(BindingValue::Models)
        }
        PropertyType::Model { .. } => Err(MappingError::ModelDefinition {
            model: String::new(),
            property: property.to_string(),
            reason: "binding models reference topics by key".to_string(),
        }),
    }
}

fn scalar_name(ty: ScalarType) -> &'static str {
    match ty {
        ScalarType::Text => "text",
        ScalarType::Bool => "bool",
        ScalarType::Int => "integer",
        ScalarType::Float => "float",
        ScalarType::DateTime => "datetime",
    }
}
