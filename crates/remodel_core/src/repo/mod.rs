//! Repository abstraction and its backends.
//!
//! # Responsibility
//! - Define the capability interface models persist through.
//! - Keep transport details (HTTP, SQL) behind that interface.
//!
//! # Invariants
//! - Repositories return `ModelError` only; transport failures are
//!   translated at this boundary.
//! - Models returned by a repository are bound to that repository.

pub mod http_repo;
pub mod sql_repo;

use crate::error::{ModelError, ModelResult};
use crate::model::instance::Model;
use crate::model::schema::Schema;
use crate::model::{Attributes, ID_ATTRIBUTE};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Weak};

/// Find/save capability shared by every backend.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Schema of the model type this repository persists.
    fn schema(&self) -> &Arc<Schema>;

    /// Returns matching rows without building models.
    async fn find_raw(&self, filter: Option<&Attributes>) -> ModelResult<Vec<Attributes>>;

    /// Returns matching rows as models bound to this repository.
    async fn find(&self, filter: Option<&Attributes>) -> ModelResult<Vec<Model>>;

    /// Creates (no identifier) or updates (identifier) `model`.
    ///
    /// Returns the persisted state; backends may also update `model` in
    /// place (for example with a generated identifier).
    async fn save(&self, model: &mut Model) -> ModelResult<Model>;

    async fn find_all_raw(&self) -> ModelResult<Vec<Attributes>> {
        self.find_raw(None).await
    }

    async fn find_all(&self) -> ModelResult<Vec<Model>> {
        self.find(None).await
    }

    /// First match, or `None`.
    async fn find_one(&self, filter: &Attributes) -> ModelResult<Option<Model>> {
        Ok(self.find(Some(filter)).await?.into_iter().next())
    }

    async fn find_one_raw(&self, filter: &Attributes) -> ModelResult<Option<Attributes>> {
        Ok(self.find_raw(Some(filter)).await?.into_iter().next())
    }

    async fn find_by_id(&self, id: Value) -> ModelResult<Option<Model>> {
        self.find_one(&id_filter(id)).await
    }

    async fn find_by_id_raw(&self, id: Value) -> ModelResult<Option<Attributes>> {
        self.find_one_raw(&id_filter(id)).await
    }
}

/// Row deletion, offered by backends that support it.
#[async_trait]
pub trait DeleteRepository: Repository {
    /// Deletes rows matching `filter`; returns the affected row count.
    async fn delete(&self, filter: &Attributes) -> ModelResult<usize>;

    /// Deletes every row.
    async fn delete_all(&self) -> ModelResult<usize>;
}

fn id_filter(id: Value) -> Attributes {
    let mut filter = Attributes::new();
    filter.insert(ID_ATTRIBUTE.to_string(), id);
    filter
}

/// Upgrades a repository's self-reference for binding new models.
pub(crate) fn upgrade<R>(this: &Weak<R>, schema: &Schema) -> ModelResult<Arc<dyn Repository>>
where
    R: Repository + 'static,
{
    match this.upgrade() {
        Some(repository) => Ok(repository as Arc<dyn Repository>),
        None => Err(ModelError::general(format!(
            "repository for {} is no longer available",
            schema.name()
        ))),
    }
}

/// Builds bound models from raw rows.
pub(crate) fn bind_rows(
    schema: &Arc<Schema>,
    repository: &Arc<dyn Repository>,
    rows: Vec<Attributes>,
) -> Vec<Model> {
    rows.into_iter()
        .map(|row| Model::new(Arc::clone(schema), row, Arc::clone(repository)))
        .collect()
}

/// Filter keys that name schema attributes, in filter order.
pub(crate) fn recognized_keys<'a>(schema: &Schema, filter: &'a Attributes) -> Vec<&'a str> {
    filter
        .keys()
        .map(String::as_str)
        .filter(|key| schema.contains(key))
        .collect()
}
