//! Schema-driven models persisted through interchangeable repositories.
//!
//! A [`Schema`] describes one model type; a [`Model`] holds one entity's
//! attributes and validates them; a [`Repository`] (REST or SQLite) finds and
//! saves models without per-type HTTP or SQL code.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod validation;

pub use config::{ConfigError, HttpConfig, SqlConfig};
pub use db::{Database, DbError};
pub use error::{ErrorKind, ModelError, ModelResult};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig, LoggingError};
pub use model::instance::Model;
pub use model::schema::{AttributeDescriptor, Schema, SchemaBuilder, SchemaError};
pub use model::{Attributes, ID_ATTRIBUTE};
pub use repo::http_repo::{HttpFailure, HttpRepository};
pub use repo::sql_repo::SqlRepository;
pub use repo::{DeleteRepository, Repository};
pub use validation::{AttributeRule, CustomRule, ErrorMap, LengthRule, NumericRule, Rule};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
