//! Schema-driven domain models.
//!
//! # Responsibility
//! - Describe model types declaratively (`schema`).
//! - Hold and validate per-entity attribute state (`instance`).
//!
//! # Invariants
//! - Attribute values are JSON values; structured values stay structured in
//!   memory and are only encoded at the storage boundary.
//! - The identifier attribute is always named `id`.

pub mod instance;
pub mod schema;

use serde_json::{Map, Value};

/// Attribute name -> value map used for raw rows, filters and state.
pub type Attributes = Map<String, Value>;

/// Name of the identifier attribute.
pub const ID_ATTRIBUTE: &str = "id";
