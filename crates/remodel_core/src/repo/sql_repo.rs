//! SQLite-backed repository.
//!
//! # Responsibility
//! - Build per-call parameterized SQL for find/insert/update/delete.
//! - Encode structured attribute values as JSON text and decode them on
//!   the way back.
//!
//! # Invariants
//! - Statements only splice schema attribute names and the configured table
//!   name; every value is bound through a `:name` placeholder.
//! - Only writable attributes appear in INSERT/UPDATE column lists.
//! - Filter keys outside the schema are ignored.

use crate::config::SqlConfig;
use crate::db::{Database, DbError};
use crate::error::{BoxError, ModelError, ModelResult};
use crate::model::instance::Model;
use crate::model::schema::{is_sql_identifier, Schema};
use crate::model::{Attributes, ID_ATTRIBUTE};
use crate::repo::{bind_rows, recognized_keys, upgrade, DeleteRepository, Repository};
use async_trait::async_trait;
use log::{debug, error, warn};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ToSql};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Named parameters bound to one statement, keys include the leading `:`.
type NamedValues = Vec<(String, SqlValue)>;

/// Repository persisting one model type into one table.
#[derive(Debug)]
pub struct SqlRepository {
    this: Weak<SqlRepository>,
    schema: Arc<Schema>,
    db: Database,
    table: String,
}

impl SqlRepository {
    pub fn new(
        schema: Arc<Schema>,
        db: Database,
        table: impl Into<String>,
    ) -> ModelResult<Arc<Self>> {
        let table = table.into();
        if !is_sql_identifier(&table) {
            return Err(ModelError::general(format!(
                "invalid table name `{table}` for {}",
                schema.name()
            )));
        }

        Ok(Arc::new_cyclic(|this| Self {
            this: this.clone(),
            schema,
            db,
            table,
        }))
    }

    /// Opens the configured database file and binds `schema` to its table.
    pub fn from_config(schema: Arc<Schema>, config: &SqlConfig) -> ModelResult<Arc<Self>> {
        let db = Database::open(&config.database_path).map_err(|err| {
            ModelError::wrap(format!("failed opening database for {}", schema.name()), err)
        })?;
        Self::new(schema, db, config.table.clone())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Builds a new, unsaved model bound to this repository.
    pub fn build(&self, raw: Attributes) -> ModelResult<Model> {
        let repository = upgrade(&self.this, &self.schema)?;
        Ok(Model::new(Arc::clone(&self.schema), raw, repository))
    }

    /// `a = :a AND b = :b` over recognized filter keys, with bound values.
    fn conditions(&self, filter: Option<&Attributes>) -> (Vec<String>, NamedValues) {
        let Some(filter) = filter else {
            return (Vec::new(), Vec::new());
        };

        recognized_keys(&self.schema, filter)
            .into_iter()
            .map(|name| {
                let value = filter.get(name).unwrap_or(&Value::Null);
                (format!("{name} = :{name}"), (format!(":{name}"), to_sql(value)))
            })
            .unzip()
    }

    fn named_values<'a>(
        &self,
        model: &Model,
        names: impl Iterator<Item = &'a str>,
    ) -> NamedValues {
        names
            .map(|name| {
                let value = model.get(name).unwrap_or(&Value::Null);
                (format!(":{name}"), to_sql(value))
            })
            .collect()
    }

    async fn insert(&self, model: &Model) -> Result<i64, DbError> {
        let writable = self.schema.writable_attributes();
        let sql = if writable.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table)
        } else {
            let placeholders: Vec<String> =
                writable.iter().map(|name| format!(":{name}")).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                writable.join(", "),
                placeholders.join(", ")
            )
        };
        let values = self.named_values(model, writable.iter().map(String::as_str));

        self.db
            .run(move |conn| {
                execute(conn, &sql, &values)?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    async fn update(&self, model: &Model) -> Result<usize, DbError> {
        let writable = self.schema.writable_attributes();
        if writable.is_empty() {
            return Ok(0);
        }

        let assignments: Vec<String> = writable
            .iter()
            .map(|name| format!("{name} = :{name}"))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {ID_ATTRIBUTE} = :{ID_ATTRIBUTE}",
            self.table,
            assignments.join(", ")
        );

        let mut bound: Vec<&str> = writable.iter().map(String::as_str).collect();
        if !bound.contains(&ID_ATTRIBUTE) {
            bound.push(ID_ATTRIBUTE);
        }
        let values = self.named_values(model, bound.into_iter());

        self.db.run(move |conn| execute(conn, &sql, &values)).await
    }

    /// Decodes JSON-text columns whose schema default is structured and
    /// integer columns whose default is a boolean.
    fn decode_row(&self, row: Attributes) -> Result<Attributes, serde_json::Error> {
        row.into_iter()
            .map(|(column, value)| {
                let decoded = match (self.schema.descriptor(&column), value) {
                    (Some(descriptor), Value::String(text)) if descriptor.is_structured() => {
                        serde_json::from_str(&text)?
                    }
                    (Some(descriptor), Value::Number(number))
                        if descriptor.default_value().is_boolean() =>
                    {
                        Value::Bool(number.as_i64().map_or(true, |flag| flag != 0))
                    }
                    (_, value) => value,
                };
                Ok((column, decoded))
            })
            .collect()
    }

    fn failure(
        &self,
        operation: &str,
        started_at: Instant,
        cause: impl Into<BoxError>,
    ) -> ModelError {
        let cause = cause.into();
        error!(
            "event=repo_{operation} module=repo_sql status=error model={} table={} duration_ms={} error={}",
            self.schema.name(),
            self.table,
            started_at.elapsed().as_millis(),
            cause
        );
        ModelError::wrap(format!("failed {operation} {}", self.schema.name()), cause)
    }

    fn log_ok(&self, operation: &str, started_at: Instant, rows: usize) {
        debug!(
            "event=repo_{operation} module=repo_sql status=ok model={} table={} rows={rows} duration_ms={}",
            self.schema.name(),
            self.table,
            started_at.elapsed().as_millis()
        );
    }
}

#[async_trait]
impl Repository for SqlRepository {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    async fn find_raw(&self, filter: Option<&Attributes>) -> ModelResult<Vec<Attributes>> {
        let started_at = Instant::now();
        let (conditions, values) = self.conditions(filter);

        let mut sql = format!("SELECT * FROM {}", self.table);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let rows = self
            .db
            .run(move |conn| query(conn, &sql, &values))
            .await
            .map_err(|err| self.failure("querying", started_at, err))?;

        let decoded = rows
            .into_iter()
            .map(|row| self.decode_row(row))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| self.failure("querying", started_at, err))?;

        self.log_ok("querying", started_at, decoded.len());
        Ok(decoded)
    }

    async fn find(&self, filter: Option<&Attributes>) -> ModelResult<Vec<Model>> {
        let rows = self.find_raw(filter).await?;
        let repository = upgrade(&self.this, &self.schema)?;
        Ok(bind_rows(&self.schema, &repository, rows))
    }

    /// Inserts new models (assigning the generated `id` in place) and
    /// updates existing ones by `id`.
    async fn save(&self, model: &mut Model) -> ModelResult<Model> {
        let started_at = Instant::now();

        if model.is_new() {
            let id = self
                .insert(model)
                .await
                .map_err(|err| self.failure("inserting", started_at, err))?;
            if self.schema.contains(ID_ATTRIBUTE) {
                model.set(ID_ATTRIBUTE, id)?;
            }
            self.log_ok("inserting", started_at, 1);
        } else {
            let affected = self
                .update(model)
                .await
                .map_err(|err| self.failure("updating", started_at, err))?;
            if affected == 0 {
                warn!(
                    "event=repo_updating module=repo_sql status=ok model={} table={} rows=0",
                    self.schema.name(),
                    self.table
                );
            }
            self.log_ok("updating", started_at, affected);
        }

        Ok(model.clone())
    }
}

#[async_trait]
impl DeleteRepository for SqlRepository {
    /// A filter without any schema attribute deletes nothing.
    async fn delete(&self, filter: &Attributes) -> ModelResult<usize> {
        let started_at = Instant::now();
        let (conditions, values) = self.conditions(Some(filter));
        if conditions.is_empty() {
            warn!(
                "event=repo_deleting module=repo_sql status=skipped model={} table={} reason=no_recognized_filter",
                self.schema.name(),
                self.table
            );
            return Ok(0);
        }

        let sql = format!("DELETE FROM {} WHERE {}", self.table, conditions.join(" AND "));
        let affected = self
            .db
            .run(move |conn| execute(conn, &sql, &values))
            .await
            .map_err(|err| self.failure("deleting", started_at, err))?;

        self.log_ok("deleting", started_at, affected);
        Ok(affected)
    }

    async fn delete_all(&self) -> ModelResult<usize> {
        let started_at = Instant::now();
        let sql = format!("DELETE FROM {}", self.table);
        let affected = self
            .db
            .run(move |conn| conn.execute(&sql, []))
            .await
            .map_err(|err| self.failure("deleting", started_at, err))?;

        self.log_ok("deleting", started_at, affected);
        Ok(affected)
    }
}

fn as_params(values: &NamedValues) -> Vec<(&str, &dyn ToSql)> {
    values
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect()
}

fn execute(conn: &Connection, sql: &str, values: &NamedValues) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(sql)?;
    stmt.execute(as_params(values).as_slice())
}

fn query(conn: &Connection, sql: &str, values: &NamedValues) -> rusqlite::Result<Vec<Attributes>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = stmt.query(as_params(values).as_slice())?;
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        let mut attributes = Attributes::new();
        for (index, column) in columns.iter().enumerate() {
            attributes.insert(column.clone(), from_sql(row.get_ref(index)?));
        }
        results.push(attributes);
    }
    Ok(results)
}

/// Structured values become JSON text; booleans become `0/1`.
fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match (number.as_i64(), number.as_f64()) {
            (Some(integer), _) => SqlValue::Integer(integer),
            (None, Some(real)) => SqlValue::Real(real),
            (None, None) => SqlValue::Text(number.to_string()),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::from(integer),
        ValueRef::Real(real) => serde_json::Number::from_f64(real)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::{from_sql, to_sql};
    use rusqlite::types::{Value as SqlValue, ValueRef};
    use serde_json::{json, Value};

    #[test]
    fn structured_values_are_encoded_as_json_text() {
        assert_eq!(
            to_sql(&json!({"theme": "dark"})),
            SqlValue::Text(r#"{"theme":"dark"}"#.to_string())
        );
        assert_eq!(to_sql(&json!([1, 2])), SqlValue::Text("[1,2]".to_string()));
        assert_eq!(to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(to_sql(&Value::Null), SqlValue::Null);
    }

    #[test]
    fn sqlite_values_map_to_json() {
        assert_eq!(from_sql(ValueRef::Integer(7)), json!(7));
        assert_eq!(from_sql(ValueRef::Real(0.25)), json!(0.25));
        assert_eq!(from_sql(ValueRef::Text(b"hi")), json!("hi"));
        assert_eq!(from_sql(ValueRef::Blob(&[1, 2])), json!([1, 2]));
        assert_eq!(from_sql(ValueRef::Null), Value::Null);
    }
}
