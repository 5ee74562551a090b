use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use order_intake_shared::error::OrderError;
use sea_orm::{DatabaseConnection, SqlxSqliteConnector};
use sea_orm_migration::MigratorTrait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::ConnectOptions;
use tracing::debug;

use crate::migration::Migrator;

const MEMORY_DB: &str = ":memory:";

/// Open (creating if needed) the database at `db_path` and bring the schema up to date.
pub async fn new(db_path: &Path) -> Result<DatabaseConnection, OrderError> {
    start_db(Some(db_path), Some(1000)).await
}

/// Opens a database, in memory when no path is given.
pub async fn start_db(
    db_path: Option<&Path>,
    slow_query_ms: Option<u64>,
) -> Result<DatabaseConnection, OrderError> {
    let db_path = db_path
        .map(|p| p.display().to_string())
        .unwrap_or(MEMORY_DB.to_string());
    let db_url = format!("sqlite://{}?mode=rwc", db_path);
    debug!("Opening Database: {db_url}");

    let options = SqliteConnectOptions::from_str(&db_url)
        .map_err(|err| OrderError::Configuration(format!("invalid database url: {err:?}")))?
        .foreign_keys(true)
        .log_statements(log::LevelFilter::Trace)
        .log_slow_statements(
            log::LevelFilter::Warn,
            Duration::from_millis(slow_query_ms.unwrap_or(500)),
        );

    // every connection to :memory: is its own database, so pin it to one
    let pool_options = match db_path == MEMORY_DB {
        true => SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None),
        false => SqlitePoolOptions::new(),
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|err| OrderError::DatabaseError(format!("connection failed: {err:?}")))?;

    let conn = SqlxSqliteConnector::from_sqlx_sqlite_pool(pool);

    Migrator::up(&conn, None).await?;
    debug!("Database migrations applied");

    Ok(conn)
}
