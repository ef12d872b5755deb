//! Schema-backed model instance.
//!
//! # Responsibility
//! - Hold one entity's attribute state, seeded from raw data and schema
//!   defaults.
//! - Run attribute validation and delegate persistence to the bound
//!   repository.
//!
//! # Invariants
//! - The attribute map always holds exactly the schema attributes.
//! - `save()` performs no I/O when validation fails.
//! - `errors()` reflects the most recent `validate()` call.

use crate::error::{ModelError, ModelResult};
use crate::model::schema::Schema;
use crate::model::{Attributes, ID_ATTRIBUTE};
use crate::repo::Repository;
use crate::validation::{describe_errors, validate_attributes, ErrorMap};
use log::debug;
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// One entity of a schema-described model type.
///
/// Serializes as a JSON object of its enumerable attributes.
#[derive(Clone)]
pub struct Model {
    schema: Arc<Schema>,
    attributes: Attributes,
    errors: ErrorMap,
    repository: Arc<dyn Repository>,
}

impl Model {
    /// Builds an instance bound to `repository`.
    ///
    /// Absent or `null` raw values take the schema default; keys outside
    /// the schema are dropped.
    pub fn new(schema: Arc<Schema>, raw: Attributes, repository: Arc<dyn Repository>) -> Self {
        let mut raw = raw;
        let mut attributes = Attributes::new();
        for name in schema.attribute_names() {
            let value = match raw.remove(name) {
                Some(value) if !value.is_null() => value,
                _ => schema.default_value(name).cloned().unwrap_or(Value::Null),
            };
            attributes.insert(name.clone(), value);
        }

        Self {
            schema,
            attributes,
            errors: ErrorMap::new(),
            repository,
        }
    }

    /// Builds an instance from a serializable value shaped like the schema.
    pub fn from_typed<T: Serialize>(
        schema: Arc<Schema>,
        value: &T,
        repository: Arc<dyn Repository>,
    ) -> ModelResult<Self> {
        let model = schema.name().to_string();
        match serde_json::to_value(value) {
            Ok(Value::Object(raw)) => Ok(Self::new(schema, raw, repository)),
            Ok(other) => Err(ModelError::validation(format!(
                "cannot build {model} from non-object value `{other}`"
            ))),
            Err(err) => Err(ModelError::wrap(format!("failed serializing {model}"), err)),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Failures recorded by the last failed `validate()`.
    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Deserializes one attribute into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> ModelResult<T> {
        let value = self.get(name).ok_or_else(|| self.unknown_attribute(name))?;
        serde_json::from_value(value.clone()).map_err(|err| {
            ModelError::wrap(
                format!("attribute `{name}` of {} has an unexpected type", self.schema.name()),
                err,
            )
        })
    }

    /// Replaces one attribute value. Names outside the schema are rejected.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> ModelResult<()> {
        match self.attributes.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(self.unknown_attribute(name)),
        }
    }

    /// Identifier value, `None` when unset.
    pub fn id(&self) -> Option<&Value> {
        self.get(ID_ATTRIBUTE).filter(|value| !value.is_null())
    }

    /// Whether the next `save()` creates rather than updates.
    ///
    /// `null`, `false`, `0` and `""` all count as "no identifier".
    pub fn is_new(&self) -> bool {
        match self.id() {
            None => true,
            Some(Value::Bool(flag)) => !flag,
            Some(Value::Number(number)) => number.as_f64() == Some(0.0),
            Some(Value::String(text)) => text.is_empty(),
            Some(_) => false,
        }
    }

    /// Enumerable attributes, in schema order.
    pub fn payload(&self) -> Attributes {
        self.schema
            .enumerable_attributes()
            .map(|name| {
                let value = self.attributes.get(name).cloned().unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect()
    }

    /// Deserializes all attributes into `T`.
    pub fn to_typed<T: DeserializeOwned>(&self) -> ModelResult<T> {
        serde_json::from_value(Value::Object(self.attributes.clone())).map_err(|err| {
            ModelError::wrap(format!("failed converting {}", self.schema.name()), err)
        })
    }

    /// Runs every attribute rule against the current values.
    ///
    /// On failure the engine's error map is stored on the instance and
    /// returned as the `details` of a `Validation` error.
    pub async fn validate(&mut self) -> ModelResult<()> {
        match validate_attributes(&self.attributes, self.schema.validators()).await {
            Ok(()) => {
                self.errors.clear();
                Ok(())
            }
            Err(errors) => {
                debug!(
                    "event=model_validate module=model status=error model={} failed_attributes={}",
                    self.schema.name(),
                    errors.len()
                );
                let message = format!(
                    "validation failure in model of class {}: {}",
                    self.schema.name(),
                    describe_errors(&errors)
                );
                let details = serde_json::to_value(&errors).unwrap_or(Value::Null);
                self.errors = errors;
                Err(ModelError::validation(message).with_details(details))
            }
        }
    }

    /// Validates, persists through the bound repository, then merges the
    /// repository's result into `self` (see [`Model::merge`]).
    pub async fn save(&mut self) -> ModelResult<()> {
        self.validate().await?;

        let repository = Arc::clone(&self.repository);
        let saved = repository.save(self).await?;
        self.merge(saved);
        Ok(())
    }

    /// Copies the enumerable attributes of `other` over this instance.
    ///
    /// Non-enumerable attributes never leave the instance, so they keep
    /// their local values.
    pub fn merge(&mut self, other: Model) {
        let mut incoming = other.attributes;
        for name in self.schema.enumerable_attributes() {
            if let Some(value) = incoming.remove(name) {
                self.attributes.insert(name.to_string(), value);
            }
        }
    }

    fn unknown_attribute(&self, name: &str) -> ModelError {
        ModelError::validation(format!(
            "unknown attribute `{name}` on model {}",
            self.schema.name()
        ))
    }
}

impl Debug for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("schema", &self.schema.name())
            .field("attributes", &self.attributes)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for name in self.schema.enumerable_attributes() {
            map.serialize_entry(name, self.attributes.get(name).unwrap_or(&Value::Null))?;
        }
        map.end()
    }
}
