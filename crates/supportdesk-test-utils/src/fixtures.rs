use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use rusqlite::Connection;
use tempfile::TempDir;

use supportdesk_core::error::{Result, SupportError};
use supportdesk_core::sql_policy::SqlPolicy;
use supportdesk_core::traits::CatalogGateway;
use supportdesk_core::types::{CatalogList, QueryOutcome, SchemaInfo};
use supportdesk_tools::{SqliteCatalog, ToolRegistry};

/// Create `orders.db` and `support.db` with a few rows each.
///
/// `orders.db` has `orders_table` with spaced, quoted column names the way a
/// CSV import produces them; `support.db` has `tickets`.
pub fn seed_support_catalogs(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let db_err = |e: rusqlite::Error| SupportError::Database(e.to_string());

    let orders = Connection::open(dir.join("orders.db")).map_err(db_err)?;
    orders
        .execute_batch(
            r#"
            CREATE TABLE orders_table (
                "Order ID" TEXT,
                "Customer Name" TEXT,
                "Customer Gender" TEXT,
                "Status" TEXT
            );
            INSERT INTO orders_table VALUES ('1001', 'Asha Rao', 'Female', 'shipped');
            INSERT INTO orders_table VALUES ('1002', 'Ben Ortiz', 'Male', 'delayed');
            INSERT INTO orders_table VALUES ('1003', 'Chen Li', 'Female', 'delivered');
            "#,
        )
        .map_err(db_err)?;

    let support = Connection::open(dir.join("support.db")).map_err(db_err)?;
    support
        .execute_batch(
            r#"
            CREATE TABLE tickets (
                ticket_id INTEGER PRIMARY KEY,
                customer TEXT NOT NULL,
                status TEXT NOT NULL,
                subject TEXT
            );
            INSERT INTO tickets VALUES (1, 'Asha Rao', 'open', 'Late delivery');
            INSERT INTO tickets VALUES (2, 'Ben Ortiz', 'closed', 'Refund request');
            INSERT INTO tickets VALUES (3, 'Chen Li', 'open', 'Damaged item');
            "#,
        )
        .map_err(db_err)?;
    Ok(())
}

/// A temporary catalog directory seeded by `seed_support_catalogs`.
pub struct CatalogFixture {
    pub dir: TempDir,
    pub catalog: Arc<SqliteCatalog>,
}

impl CatalogFixture {
    /// Registry with the catalog tools bound to this fixture.
    pub fn registry(&self, policy: SqlPolicy) -> ToolRegistry {
        ToolRegistry::with_catalog_tools(self.catalog.clone(), policy, 30)
    }
}

/// Seed a fresh temporary catalog directory.
pub fn catalog_fixture() -> Result<CatalogFixture> {
    let dir = tempfile::tempdir()?;
    seed_support_catalogs(dir.path())?;
    let catalog = Arc::new(SqliteCatalog::new(dir.path()));
    Ok(CatalogFixture { dir, catalog })
}

/// Gateway whose transport is always down.
pub struct UnavailableCatalog;

impl CatalogGateway for UnavailableCatalog {
    fn list_catalogs(&self) -> BoxFuture<'_, Result<CatalogList>> {
        Box::pin(async { Err(SupportError::GatewayUnavailable("connection refused".into())) })
    }

    fn get_schema<'a>(&'a self, _name: &'a str) -> BoxFuture<'a, Result<SchemaInfo>> {
        Box::pin(async { Err(SupportError::GatewayUnavailable("connection refused".into())) })
    }

    fn run_query<'a>(&'a self, _name: &'a str, _sql: &'a str) -> BoxFuture<'a, Result<QueryOutcome>> {
        Box::pin(async { Err(SupportError::GatewayUnavailable("connection refused".into())) })
    }
}
