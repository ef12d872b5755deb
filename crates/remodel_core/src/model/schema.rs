//! Declarative model schema and the collections derived from it.
//!
//! # Responsibility
//! - Merge caller attribute declarations over descriptor defaults.
//! - Derive attribute names, validators, default values and the writable
//!   subset once, when the schema is built.
//!
//! # Invariants
//! - A built `Schema` is immutable and shared behind `Arc`.
//! - Attribute names are unique SQL identifiers (they are interpolated into
//!   statement text by the SQL repository).
//! - `attribute_names()` keeps declaration order.

use crate::model::Attributes;
use crate::validation::{AttributeRule, RuleRef, Validators};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

static SQL_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern must compile")
});

/// Returns whether `name` can be spliced into SQL text as a bare identifier.
pub(crate) fn is_sql_identifier(name: &str) -> bool {
    SQL_IDENTIFIER.is_match(name)
}

/// Per-attribute declaration.
///
/// Defaults: `null` default value, enumerable, not writable, no validators.
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    default_value: Value,
    enumerable: bool,
    writable: bool,
    validators: Vec<RuleRef>,
}

impl Default for AttributeDescriptor {
    fn default() -> Self {
        Self {
            default_value: Value::Null,
            enumerable: true,
            writable: false,
            validators: Vec::new(),
        }
    }
}

impl AttributeDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value used when construction input is absent or `null`.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    /// Includes the attribute in INSERT/UPDATE column lists.
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    /// Excludes the attribute from the serialized model payload.
    pub fn non_enumerable(mut self) -> Self {
        self.enumerable = false;
        self
    }

    pub fn with_rule(mut self, rule: impl AttributeRule + 'static) -> Self {
        self.validators.push(Arc::new(rule));
        self
    }

    pub fn with_rule_ref(mut self, rule: RuleRef) -> Self {
        self.validators.push(rule);
        self
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    pub fn is_enumerable(&self) -> bool {
        self.enumerable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn rules(&self) -> &[RuleRef] {
        &self.validators
    }

    /// Structured defaults mark attributes stored as JSON text.
    pub fn is_structured(&self) -> bool {
        self.default_value.is_object() || self.default_value.is_array()
    }
}

/// Schema construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("model name cannot be empty")]
    EmptyModelName,
    #[error("schema for `{model}` declares no attributes")]
    NoAttributes { model: String },
    #[error("schema for `{model}` declares `{attribute}` more than once")]
    DuplicateAttribute { model: String, attribute: String },
    #[error("schema for `{model}` uses invalid attribute name `{attribute}`")]
    InvalidAttributeName { model: String, attribute: String },
}

/// Immutable description of one model type.
#[derive(Debug)]
pub struct Schema {
    name: String,
    attribute_names: Vec<String>,
    descriptors: HashMap<String, AttributeDescriptor>,
    validators: Validators,
    default_attributes: Attributes,
    writable_attributes: Vec<String>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Model type name used in error messages and log events.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.descriptors.contains_key(attribute)
    }

    pub fn descriptor(&self, attribute: &str) -> Option<&AttributeDescriptor> {
        self.descriptors.get(attribute)
    }

    /// Rule lists for attributes that declare at least one rule.
    pub fn validators(&self) -> &Validators {
        &self.validators
    }

    pub fn default_attributes(&self) -> &Attributes {
        &self.default_attributes
    }

    pub fn default_value(&self, attribute: &str) -> Option<&Value> {
        self.default_attributes.get(attribute)
    }

    pub fn writable_attributes(&self) -> &[String] {
        &self.writable_attributes
    }

    pub fn enumerable_attributes(&self) -> impl Iterator<Item = &str> + '_ {
        self.attribute_names
            .iter()
            .filter(|name| self.descriptors[name.as_str()].is_enumerable())
            .map(String::as_str)
    }
}

/// Collects attribute declarations for [`Schema::builder`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    attributes: Vec<(String, AttributeDescriptor)>,
}

impl SchemaBuilder {
    pub fn attribute(mut self, name: impl Into<String>, descriptor: AttributeDescriptor) -> Self {
        self.attributes.push((name.into(), descriptor));
        self
    }

    /// Validates declarations and derives the frozen collections.
    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        let model = self.name.trim().to_string();
        if model.is_empty() {
            return Err(SchemaError::EmptyModelName);
        }
        if self.attributes.is_empty() {
            return Err(SchemaError::NoAttributes { model });
        }

        {
            let mut seen = HashSet::new();
            for (attribute, _) in &self.attributes {
                if !is_sql_identifier(attribute) {
                    return Err(SchemaError::InvalidAttributeName {
                        model,
                        attribute: attribute.clone(),
                    });
                }
                if !seen.insert(attribute.as_str()) {
                    return Err(SchemaError::DuplicateAttribute {
                        model,
                        attribute: attribute.clone(),
                    });
                }
            }
        }

        let attribute_names: Vec<String> =
            self.attributes.iter().map(|(name, _)| name.clone()).collect();

        let mut validators = Validators::new();
        let mut default_attributes = Attributes::new();
        let mut writable_attributes = Vec::new();
        for (name, descriptor) in &self.attributes {
            if !descriptor.validators.is_empty() {
                validators.insert(name.clone(), descriptor.validators.clone());
            }
            default_attributes.insert(name.clone(), descriptor.default_value.clone());
            if descriptor.writable {
                writable_attributes.push(name.clone());
            }
        }

        Ok(Arc::new(Schema {
            name: model,
            attribute_names,
            descriptors: self.attributes.into_iter().collect(),
            validators,
            default_attributes,
            writable_attributes,
        }))
    }
}
