//! REST-backed repository.
//!
//! # Responsibility
//! - Map `find`/`save` onto `GET {endpoint}`, `POST {endpoint}` and
//!   `PATCH {endpoint}/{id}`.
//! - Translate HTTP status codes into domain error kinds.
//!
//! # Invariants
//! - Request bodies are the model's enumerable attributes.
//! - Each call performs exactly one request; no retries.

use crate::config::HttpConfig;
use crate::error::{ModelError, ModelResult};
use crate::model::instance::Model;
use crate::model::schema::Schema;
use crate::model::Attributes;
use crate::repo::{bind_rows, upgrade, Repository};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Transport-level failure kept as the `source()` of translated errors.
#[derive(Debug, Error)]
pub enum HttpFailure {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with status {status}")]
    Status {
        status: StatusCode,
        body: Option<Value>,
    },
    #[error("unexpected response payload: {0}")]
    Payload(String),
    #[error("cannot address item under endpoint: {0}")]
    Endpoint(String),
}

impl HttpFailure {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport(err) => err.status(),
            Self::Status { status, .. } => Some(*status),
            Self::Payload(_) | Self::Endpoint(_) => None,
        }
    }

    /// JSON error body sent by the server, when it sent one.
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Status { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

/// Repository talking to a JSON REST collection endpoint.
#[derive(Debug)]
pub struct HttpRepository {
    this: Weak<HttpRepository>,
    schema: Arc<Schema>,
    client: Client,
    config: HttpConfig,
}

impl HttpRepository {
    pub fn new(schema: Arc<Schema>, config: HttpConfig) -> Arc<Self> {
        Self::with_client(schema, config, Client::new())
    }

    /// Uses a preconfigured client (proxies, TLS roots, default headers).
    pub fn with_client(schema: Arc<Schema>, config: HttpConfig, client: Client) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            schema,
            client,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Builds a new, unsaved model bound to this repository.
    pub fn build(&self, raw: Attributes) -> ModelResult<Model> {
        let repository = upgrade(&self.this, &self.schema)?;
        Ok(Model::new(Arc::clone(&self.schema), raw, repository))
    }

    async fn send(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<Value, HttpFailure> {
        let request_id = Uuid::new_v4();
        let started_at = Instant::now();

        let mut request = request.header(REQUEST_ID_HEADER, request_id.to_string());
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let result = exchange(request).await;
        match &result {
            Ok(_) => debug!(
                "event=repo_{operation} module=repo_http status=ok model={} request_id={request_id} duration_ms={}",
                self.schema.name(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=repo_{operation} module=repo_http status=error model={} request_id={request_id} duration_ms={} http_status={} error={err}",
                self.schema.name(),
                started_at.elapsed().as_millis(),
                err.status().map_or(0, |status| status.as_u16())
            ),
        }
        result
    }

    /// `{endpoint}/{id}` with the id percent-encoded as a single segment.
    fn item_url(&self, id: Option<&Value>) -> Result<Url, HttpFailure> {
        let endpoint = &self.config.endpoint;
        let mut url = Url::parse(endpoint)
            .map_err(|err| HttpFailure::Endpoint(format!("`{endpoint}`: {err}")))?;
        url.path_segments_mut()
            .map_err(|()| HttpFailure::Endpoint(format!("`{endpoint}` cannot be a base")))?
            .pop_if_empty()
            .push(&id_segment(id));
        Ok(url)
    }

    fn find_error(&self, failure: HttpFailure) -> ModelError {
        match failure.status() {
            Some(StatusCode::BAD_REQUEST) => {
                ModelError::validation("invalid search criteria").with_source(failure)
            }
            Some(StatusCode::UNAUTHORIZED) => {
                ModelError::authorization("unauthorized").with_source(failure)
            }
            _ => ModelError::wrap(
                format!(
                    "unknown error retrieving {} model(s) from repository",
                    self.schema.name()
                ),
                failure,
            ),
        }
    }

    fn save_error(&self, failure: HttpFailure, creating: bool) -> ModelError {
        match failure.status() {
            Some(StatusCode::BAD_REQUEST) => {
                let details = failure.body().cloned().unwrap_or(Value::Null);
                ModelError::validation("property validation failed")
                    .with_details(details)
                    .with_source(failure)
            }
            Some(StatusCode::NOT_FOUND) => {
                ModelError::not_found("property not found").with_source(failure)
            }
            Some(StatusCode::UNAUTHORIZED) => {
                ModelError::authorization("unauthorized").with_source(failure)
            }
            _ => {
                let operation = if creating { "creating" } else { "updating" };
                ModelError::wrap(
                    format!("unknown error {operation} {}", self.schema.name()),
                    failure,
                )
            }
        }
    }
}

#[async_trait]
impl Repository for HttpRepository {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    async fn find_raw(&self, filter: Option<&Attributes>) -> ModelResult<Vec<Attributes>> {
        let query = filter.map(query_pairs).unwrap_or_default();
        let request = self.client.get(&self.config.endpoint).query(&query);

        self.send(request, "find")
            .await
            .and_then(rows_from_payload)
            .map_err(|failure| self.find_error(failure))
    }

    async fn find(&self, filter: Option<&Attributes>) -> ModelResult<Vec<Model>> {
        let rows = self.find_raw(filter).await?;
        let repository = upgrade(&self.this, &self.schema)?;
        Ok(bind_rows(&self.schema, &repository, rows))
    }

    async fn save(&self, model: &mut Model) -> ModelResult<Model> {
        let creating = model.is_new();
        let (request, operation) = if creating {
            (Ok(self.client.post(&self.config.endpoint).json(&*model)), "create")
        } else {
            let request = self
                .item_url(model.id())
                .map(|url| self.client.patch(url).json(&*model));
            (request, "update")
        };

        let response = match request {
            Ok(request) => self.send(request, operation).await,
            Err(failure) => Err(failure),
        };
        let body = response
            .and_then(|payload| match payload {
                Value::Object(body) => Ok(body),
                other => Err(HttpFailure::Payload(format!(
                    "expected a JSON object, got `{other}`"
                ))),
            })
            .map_err(|failure| self.save_error(failure, creating))?;

        self.build(body)
    }
}

async fn exchange(request: RequestBuilder) -> Result<Value, HttpFailure> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.json::<Value>().await.ok();
        return Err(HttpFailure::Status { status, body });
    }
    Ok(response.json::<Value>().await?)
}

fn rows_from_payload(payload: Value) -> Result<Vec<Attributes>, HttpFailure> {
    let Value::Array(items) = payload else {
        return Err(HttpFailure::Payload(format!(
            "expected a JSON array, got `{payload}`"
        )));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Ok(row),
            other => Err(HttpFailure::Payload(format!(
                "expected a JSON object, got `{other}`"
            ))),
        })
        .collect()
}

/// Null filters are omitted; strings are sent verbatim, other values as JSON.
fn query_pairs(filter: &Attributes) -> Vec<(String, String)> {
    filter
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), scalar_text(value)))
        .collect()
}

fn id_segment(id: Option<&Value>) -> String {
    id.map(scalar_text).unwrap_or_default()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
