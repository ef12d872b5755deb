//! Asynchronous attribute validation engine.
//!
//! # Responsibility
//! - Evaluate per-attribute rule lists against a model's attribute map.
//! - Report failures as an attribute -> messages map.
//!
//! # Invariants
//! - Every rule of every attribute is evaluated; failures never short-circuit
//!   the remaining rules.
//! - Messages for one attribute keep rule declaration order.

mod rules;

pub use rules::{CustomRule, LengthRule, NumericRule, Rule, RuleFuture};

use crate::model::Attributes;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Validation failures keyed by attribute name.
pub type ErrorMap = BTreeMap<String, Vec<String>>;

/// Shared handle to one rule.
pub type RuleRef = Arc<dyn AttributeRule>;

/// Rule lists keyed by attribute name.
pub type Validators = BTreeMap<String, Vec<RuleRef>>;

/// One validation rule applied to a single attribute value.
///
/// Rules may await (lookups against another service, for instance); the
/// whole attribute map is available for cross-field checks.
#[async_trait]
pub trait AttributeRule: Debug + Send + Sync {
    /// Returns `Some(message)` when `value` violates the rule.
    async fn check(&self, value: &Value, attributes: &Attributes) -> Option<String>;
}

/// Runs `validators` against `attributes`.
///
/// Attributes missing from the map are checked as `null`.
pub async fn validate_attributes(
    attributes: &Attributes,
    validators: &Validators,
) -> Result<(), ErrorMap> {
    let mut errors = ErrorMap::new();

    for (name, rules) in validators {
        let value = attributes.get(name).unwrap_or(&Value::Null);
        for rule in rules {
            if let Some(message) = rule.check(value, attributes).await {
                errors.entry(name.clone()).or_default().push(message);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Renders an error map as `attr: message, message; attr: message`.
pub fn describe_errors(errors: &ErrorMap) -> String {
    errors
        .iter()
        .map(|(name, messages)| format!("{name}: {}", messages.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}
