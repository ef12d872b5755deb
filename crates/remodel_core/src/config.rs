//! Repository configuration.
//!
//! # Responsibility
//! - Describe where each repository backend talks to.
//! - Load those settings from the environment (and a `.env` file).
//!
//! # Invariants
//! - HTTP endpoints are absolute `http`/`https` URLs without a trailing `/`.
//! - SQL table names are plain identifiers.

use crate::model::schema::is_sql_identifier;
use reqwest::Url;
use std::env::VarError;
use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(String),
    #[error("invalid setting `{name}`: {reason}")]
    Invalid { name: String, reason: String },
}

/// Settings for [`crate::HttpRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub endpoint: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub bearer_token: Option<String>,
}

impl HttpConfig {
    pub fn new(endpoint: impl Into<String>) -> ConfigResult<Self> {
        Ok(Self {
            endpoint: normalize_endpoint("endpoint", endpoint.into())?,
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Reads `<PREFIX>_ENDPOINT` (required) and `<PREFIX>_TOKEN` (optional).
    pub fn from_env(prefix: &str) -> ConfigResult<Self> {
        let endpoint_var = format!("{prefix}_ENDPOINT");
        let endpoint = required_var(&endpoint_var)?;
        Ok(Self {
            endpoint: normalize_endpoint(&endpoint_var, endpoint)?,
            bearer_token: optional_var(&format!("{prefix}_TOKEN"))?,
        })
    }
}

/// Settings for [`crate::SqlRepository::from_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlConfig {
    pub database_path: PathBuf,
    pub table: String,
}

impl SqlConfig {
    pub fn new(database_path: impl Into<PathBuf>, table: impl Into<String>) -> ConfigResult<Self> {
        Ok(Self {
            database_path: database_path.into(),
            table: check_table("table", table.into())?,
        })
    }

    /// Reads `<PREFIX>_DATABASE` and `<PREFIX>_TABLE`, both required.
    pub fn from_env(prefix: &str) -> ConfigResult<Self> {
        let table_var = format!("{prefix}_TABLE");
        let database = required_var(&format!("{prefix}_DATABASE"))?;
        let table = required_var(&table_var)?;
        Ok(Self {
            database_path: PathBuf::from(database),
            table: check_table(&table_var, table)?,
        })
    }
}

fn required_var(name: &str) -> ConfigResult<String> {
    optional_var(name)?.ok_or_else(|| ConfigError::Missing(name.to_string()))
}

fn optional_var(name: &str) -> ConfigResult<Option<String>> {
    match dotenvy::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(dotenvy::Error::EnvVar(VarError::NotPresent)) => Ok(None),
        Err(err) => Err(ConfigError::Invalid {
            name: name.to_string(),
            reason: err.to_string(),
        }),
    }
}

fn normalize_endpoint(name: &str, endpoint: String) -> ConfigResult<String> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|err| ConfigError::Invalid {
        name: name.to_string(),
        reason: format!("`{trimmed}` is not a URL: {err}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            name: name.to_string(),
            reason: format!("unsupported scheme `{}`", url.scheme()),
        });
    }
    Ok(trimmed.to_string())
}

fn check_table(name: &str, table: String) -> ConfigResult<String> {
    if is_sql_identifier(&table) {
        Ok(table)
    } else {
        Err(ConfigError::Invalid {
            name: name.to_string(),
            reason: format!("`{table}` is not a plain table name"),
        })
    }
}
