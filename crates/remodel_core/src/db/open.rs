//! Connection bootstrap and statement dispatch.

use super::DbResult;
use log::{error, info};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared SQLite connection.
///
/// Cloning is cheap; clones use the same underlying connection. Each
/// [`Database::run`] call holds the connection for one closure only.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) a database file.
    ///
    /// # Side effects
    /// - Emits `db_open` logging events with duration and status.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        open_with("file", move || Connection::open(path))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        open_with("memory", Connection::open_in_memory)
    }

    /// Executes DDL or other multi-statement SQL.
    pub async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let sql = sql.to_string();
        self.run(move |conn| conn.execute_batch(&sql)).await
    }

    /// Runs `work` against the connection on tokio's blocking pool.
    pub async fn run<T, F>(&self, work: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let value = tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            work(&guard)
        })
        .await??;
        Ok(value)
    }
}

fn open_with<F>(mode: &'static str, connect: F) -> DbResult<Database>
where
    F: FnOnce() -> rusqlite::Result<Connection>,
{
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let result = connect().and_then(|conn| {
        bootstrap_connection(&conn)?;
        Ok(conn)
    });

    match result {
        Ok(conn) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(Database {
                conn: Arc::new(Mutex::new(conn)),
            })
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err.into())
        }
    }
}

fn bootstrap_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Database;
    use std::time::Duration;

    #[tokio::test]
    async fn in_memory_database_enables_foreign_keys() {
        let db = Database::open_in_memory().expect("in-memory database should open");
        let enabled: i64 = db
            .run(|conn| conn.query_row("PRAGMA foreign_keys;", [], |row| row.get(0)))
            .await
            .expect("pragma should be readable");
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn clones_share_one_connection() {
        let db = Database::open_in_memory().expect("in-memory database should open");
        db.execute_batch("CREATE TABLE t (v INTEGER);")
            .await
            .expect("ddl should run");

        let clone = db.clone();
        clone
            .run(|conn| conn.execute("INSERT INTO t (v) VALUES (1)", []))
            .await
            .expect("insert should run");

        let count: i64 = db
            .run(|conn| conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0)))
            .await
            .expect("count should run");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn batch_waits_for_running_statement() {
        let db = Database::open_in_memory().expect("in-memory database should open");
        db.execute_batch("CREATE TABLE t (v INTEGER);")
            .await
            .expect("ddl should run");

        let slow = db.run(|conn| {
            std::thread::sleep(Duration::from_millis(50));
            conn.execute("INSERT INTO t (v) VALUES (1)", [])
        });
        let batch = db.execute_batch("INSERT INTO t (v) VALUES (2);");
        let (slow, batch) = tokio::join!(slow, batch);
        slow.expect("slow insert should run");
        batch.expect("batch should run");

        let count: i64 = db
            .run(|conn| conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0)))
            .await
            .expect("count should run");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn file_database_persists_between_handles() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("store.db");

        Database::open(&path)
            .expect("file database should open")
            .execute_batch("CREATE TABLE kept (v TEXT);")
            .await
            .expect("ddl should run");

        Database::open(&path)
            .expect("reopen should succeed")
            .execute_batch("INSERT INTO kept (v) VALUES ('x');")
            .await
            .expect("table should still exist");
    }
}
