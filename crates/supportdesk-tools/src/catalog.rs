use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use supportdesk_core::error::{Result, SupportError};
use supportdesk_core::traits::CatalogGateway;
use supportdesk_core::types::{CatalogList, QueryOutcome, SchemaInfo};

/// In-process gateway over a directory of `<name>.db` SQLite files.
///
/// Every call opens its own read-only connection and drops it before
/// returning, so nothing is shared between runs.
pub struct SqliteCatalog {
    dir: PathBuf,
}

impl SqliteCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a catalog name to its file, refusing anything path-like.
    fn db_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.contains(['/', '\\'])
            && name != "."
            && name != "..";
        let path = self.dir.join(format!("{}.db", name));
        if !valid || !path.is_file() {
            return Err(SupportError::NotFound(format!("database '{}'", name)));
        }
        Ok(path)
    }
}

fn open_read_only(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| {
        SupportError::GatewayUnavailable(format!("cannot open {}: {}", path.display(), e))
    })
}

fn read_schema(path: &Path) -> Result<SchemaInfo> {
    let conn = open_read_only(path)?;
    let mut stmt = conn
        .prepare(
            "SELECT sql FROM sqlite_master \
             WHERE type IN ('table', 'view') AND sql IS NOT NULL ORDER BY name",
        )
        .map_err(|e| SupportError::Database(e.to_string()))?;
    let statements = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| SupportError::Database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SupportError::Database(e.to_string()))?;
    Ok(SchemaInfo { statements })
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
    }
}

/// Row keys must be unique, so a repeated column name gets a `:n` suffix
/// (`SELECT o.id, c.id` yields `id` and `id:1`).
fn unique_columns(names: Vec<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let mut key = name.to_string();
        let mut n = 0;
        while out.contains(&key) {
            n += 1;
            key = format!("{}:{}", name, n);
        }
        out.push(key);
    }
    out
}

/// Run a query; engine errors become `QueryOutcome::Failed`.
fn execute_query(path: &Path, sql: &str) -> Result<QueryOutcome> {
    let conn = open_read_only(path)?;
    let failed = |e: rusqlite::Error| QueryOutcome::Failed {
        error: e.to_string(),
    };

    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(e) => return Ok(failed(e)),
    };
    let columns = unique_columns(stmt.column_names());

    let mut rows = match stmt.query([]) {
        Ok(rows) => rows,
        Err(e) => return Ok(failed(e)),
    };
    let mut out = Vec::new();
    loop {
        match rows.next() {
            Ok(Some(row)) => {
                let mut obj = serde_json::Map::new();
                for (i, col) in columns.iter().enumerate() {
                    let value = match row.get_ref(i) {
                        Ok(v) => to_json(v),
                        Err(e) => return Ok(failed(e)),
                    };
                    obj.insert(col.clone(), value);
                }
                out.push(obj);
            }
            Ok(None) => break,
            Err(e) => return Ok(failed(e)),
        }
    }
    Ok(QueryOutcome::Rows { columns, rows: out })
}

async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SupportError::GatewayUnavailable(format!("catalog task failed: {}", e)))?
}

impl CatalogGateway for SqliteCatalog {
    fn list_catalogs(&self) -> BoxFuture<'_, Result<CatalogList>> {
        Box::pin(async move {
            // A missing directory simply has no catalogs
            if !self.dir.is_dir() {
                return Ok(CatalogList::default());
            }
            let pattern = self.dir.join("*.db");
            let paths = glob::glob(&pattern.to_string_lossy())
                .map_err(|e| SupportError::GatewayUnavailable(e.to_string()))?;
            let mut names: Vec<String> = paths
                .filter_map(|p| p.ok())
                .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .collect();
            names.sort();
            debug!(dir = %self.dir.display(), count = names.len(), "Listed catalogs");
            Ok(CatalogList { names })
        })
    }

    fn get_schema<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<SchemaInfo>> {
        Box::pin(async move {
            let path = self.db_path(name)?;
            blocking(move || read_schema(&path)).await
        })
    }

    fn run_query<'a>(&'a self, name: &'a str, sql: &'a str) -> BoxFuture<'a, Result<QueryOutcome>> {
        Box::pin(async move {
            let path = self.db_path(name)?;
            let sql = sql.to_string();
            let outcome = blocking(move || execute_query(&path, &sql)).await?;
            debug!(catalog = name, rows = outcome.row_count(), failed = outcome.is_failed(), "Query ran");
            Ok(outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, SqliteCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("orders.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (order_id TEXT, status TEXT, amount REAL, note BLOB);
             INSERT INTO orders VALUES ('A1', 'shipped', 19.5, x'0102');
             INSERT INTO orders VALUES ('A2', 'pending', NULL, NULL);",
        )
        .unwrap();
        drop(conn);
        std::fs::write(dir.path().join("notes.txt"), "not a database").unwrap();
        let catalog = SqliteCatalog::new(dir.path());
        (dir, catalog)
    }

    #[test]
    fn test_unique_columns() {
        assert_eq!(
            unique_columns(vec!["id", "id", "name", "id"]),
            vec!["id", "id:1", "name", "id:2"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_column_names_keep_every_value() {
        let (_dir, catalog) = fixture();
        let outcome = catalog
            .run_query("orders", "SELECT a.order_id, b.order_id FROM orders a JOIN orders b ON b.status = 'pending' WHERE a.status = 'shipped'")
            .await
            .unwrap();
        match outcome {
            QueryOutcome::Rows { columns, rows } => {
                assert_eq!(columns, vec!["order_id", "order_id:1"]);
                assert_eq!(rows[0]["order_id"], "A1");
                assert_eq!(rows[0]["order_id:1"], "A2");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_catalogs() {
        let (_dir, catalog) = fixture();
        let list = catalog.list_catalogs().await.unwrap();
        assert_eq!(list.names, vec!["orders"]);
    }

    #[tokio::test]
    async fn test_missing_dir_lists_nothing() {
        let catalog = SqliteCatalog::new("/nonexistent/supportdesk/catalogs");
        assert!(catalog.list_catalogs().await.unwrap().names.is_empty());
    }

    #[tokio::test]
    async fn test_schema() {
        let (_dir, catalog) = fixture();
        let schema = catalog.get_schema("orders").await.unwrap();
        assert_eq!(schema.statements.len(), 1);
        assert!(schema.statements[0].starts_with("CREATE TABLE orders"));
    }

    #[tokio::test]
    async fn test_unknown_and_path_like_names() {
        let (_dir, catalog) = fixture();
        for name in ["missing", "../orders", "", ".."] {
            let err = catalog.get_schema(name).await.unwrap_err();
            assert!(matches!(err, SupportError::NotFound(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn test_query_rows() {
        let (_dir, catalog) = fixture();
        let outcome = catalog
            .run_query("orders", "SELECT order_id, amount, note FROM orders ORDER BY order_id")
            .await
            .unwrap();
        match outcome {
            QueryOutcome::Rows { columns, rows } => {
                assert_eq!(columns, vec!["order_id", "amount", "note"]);
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0]["order_id"], "A1");
                assert_eq!(rows[0]["amount"], 19.5);
                assert_eq!(rows[0]["note"], "<blob 2 bytes>");
                assert!(rows[1]["amount"].is_null());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_errors_are_data() {
        let (_dir, catalog) = fixture();
        let outcome = catalog
            .run_query("orders", "SELECT * FROM refunds")
            .await
            .unwrap();
        match outcome {
            QueryOutcome::Failed { error } => assert!(error.contains("refunds")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_is_read_only() {
        let (_dir, catalog) = fixture();
        let outcome = catalog
            .run_query("orders", "DELETE FROM orders")
            .await
            .unwrap();
        assert!(outcome.is_failed());
        let rows = catalog
            .run_query("orders", "SELECT * FROM orders")
            .await
            .unwrap();
        assert_eq!(rows.row_count(), 2);
    }
}
