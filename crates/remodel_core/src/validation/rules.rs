//! Built-in attribute rules.
//!
//! Every rule except `Presence` treats `null` as "not provided" and passes;
//! pair a rule with `Presence` to make the attribute mandatory.

use super::AttributeRule;
use crate::model::Attributes;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$")
        .case_insensitive(true)
        .build()
        .expect("email pattern must compile")
});

/// Declarative rule evaluated without I/O.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Rejects `null`, whitespace-only strings, empty arrays and objects.
    Presence,
    Length(LengthRule),
    Email,
    /// Whole-value match; build with [`Rule::format`].
    Format(Regex),
    Numericality(NumericRule),
    Inclusion(Vec<Value>),
    Array,
    Object,
}

impl Rule {
    pub fn length() -> LengthRule {
        LengthRule::default()
    }

    pub fn numericality() -> NumericRule {
        NumericRule::default()
    }

    /// Compiles `pattern` anchored at both ends.
    pub fn format(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{pattern})$")).map(Self::Format)
    }

    pub fn inclusion<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Inclusion(values.into_iter().map(Into::into).collect())
    }

    fn evaluate(&self, value: &Value) -> Option<String> {
        if let Self::Presence = self {
            return is_blank(value).then(|| "can't be blank".to_string());
        }
        if value.is_null() {
            return None;
        }

        match self {
            Self::Presence => None,
            Self::Length(rule) => rule.evaluate(value),
            Self::Email => match value {
                Value::String(text) if EMAIL_PATTERN.is_match(text) => None,
                _ => Some("is not a valid email".to_string()),
            },
            Self::Format(pattern) => match value {
                Value::String(text) if pattern.is_match(text) => None,
                _ => Some("is invalid".to_string()),
            },
            Self::Numericality(rule) => rule.evaluate(value),
            Self::Inclusion(allowed) => {
                (!allowed.contains(value)).then(|| "is not included in the list".to_string())
            }
            Self::Array => (!value.is_array()).then(|| "is not an array".to_string()),
            Self::Object => (!value.is_object()).then(|| "is not an object".to_string()),
        }
    }
}

#[async_trait]
impl AttributeRule for Rule {
    async fn check(&self, value: &Value, _attributes: &Attributes) -> Option<String> {
        self.evaluate(value)
    }
}

impl From<LengthRule> for Rule {
    fn from(rule: LengthRule) -> Self {
        Self::Length(rule)
    }
}

impl From<NumericRule> for Rule {
    fn from(rule: NumericRule) -> Self {
        Self::Numericality(rule)
    }
}

/// Character count for strings, element count for arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LengthRule {
    pub is: Option<usize>,
    pub minimum: Option<usize>,
    pub maximum: Option<usize>,
}

impl LengthRule {
    pub fn exactly(mut self, length: usize) -> Self {
        self.is = Some(length);
        self
    }

    pub fn min(mut self, length: usize) -> Self {
        self.minimum = Some(length);
        self
    }

    pub fn max(mut self, length: usize) -> Self {
        self.maximum = Some(length);
        self
    }

    fn evaluate(&self, value: &Value) -> Option<String> {
        let length = match value {
            Value::String(text) => text.chars().count(),
            Value::Array(items) => items.len(),
            _ => return Some("has an incorrect length".to_string()),
        };

        if let Some(expected) = self.is.filter(|expected| length != *expected) {
            return Some(format!(
                "is the wrong length (should be {expected} characters)"
            ));
        }
        if let Some(minimum) = self.minimum.filter(|minimum| length < *minimum) {
            return Some(format!("is too short (minimum is {minimum} characters)"));
        }
        if let Some(maximum) = self.maximum.filter(|maximum| length > *maximum) {
            return Some(format!("is too long (maximum is {maximum} characters)"));
        }
        None
    }
}

/// Numeric bounds. Numeric strings are accepted and parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericRule {
    pub only_integer: bool,
    pub greater_than: Option<f64>,
    pub greater_than_or_equal_to: Option<f64>,
    pub less_than: Option<f64>,
    pub less_than_or_equal_to: Option<f64>,
}

impl NumericRule {
    pub fn integer(mut self) -> Self {
        self.only_integer = true;
        self
    }

    pub fn greater_than(mut self, bound: f64) -> Self {
        self.greater_than = Some(bound);
        self
    }

    pub fn at_least(mut self, bound: f64) -> Self {
        self.greater_than_or_equal_to = Some(bound);
        self
    }

    pub fn less_than(mut self, bound: f64) -> Self {
        self.less_than = Some(bound);
        self
    }

    pub fn at_most(mut self, bound: f64) -> Self {
        self.less_than_or_equal_to = Some(bound);
        self
    }

    fn evaluate(&self, value: &Value) -> Option<String> {
        let number = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        let Some(number) = number.filter(|number| number.is_finite()) else {
            return Some("is not a number".to_string());
        };

        if self.only_integer && number.fract() != 0.0 {
            return Some("must be an integer".to_string());
        }
        if let Some(bound) = self.greater_than.filter(|bound| number <= *bound) {
            return Some(format!("must be greater than {}", display_number(bound)));
        }
        if let Some(bound) = self.greater_than_or_equal_to.filter(|bound| number < *bound) {
            return Some(format!(
                "must be greater than or equal to {}",
                display_number(bound)
            ));
        }
        if let Some(bound) = self.less_than.filter(|bound| number >= *bound) {
            return Some(format!("must be less than {}", display_number(bound)));
        }
        if let Some(bound) = self.less_than_or_equal_to.filter(|bound| number > *bound) {
            return Some(format!(
                "must be less than or equal to {}",
                display_number(bound)
            ));
        }
        None
    }
}

/// Future returned by a [`CustomRule`] check.
pub type RuleFuture = Pin<Box<dyn Future<Output = Option<String>> + Send>>;

type CheckFn = dyn Fn(Value, Attributes) -> RuleFuture + Send + Sync;

/// Caller-supplied asynchronous rule.
///
/// Unlike the built-ins, the closure also sees `null` values.
#[derive(Clone)]
pub struct CustomRule {
    name: String,
    check: Arc<CheckFn>,
}

impl CustomRule {
    pub fn new<F, Fut>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(Value, Attributes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(move |value, attributes| {
                Box::pin(check(value, attributes)) as RuleFuture
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Debug for CustomRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AttributeRule for CustomRule {
    async fn check(&self, value: &Value, attributes: &Attributes) -> Option<String> {
        (self.check)(value.clone(), attributes.clone()).await
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn display_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
