//! Database initialization
//!
//! Opens (creating when missing) the SQLite database and makes sure the scan
//! history and saved-scan tables exist. Idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

/// Connect to `database_url` and create tables if needed
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    let pool = connect(database_url).await?;

    // In-memory databases reject WAL and only need the busy timeout
    if !is_memory_url(database_url) {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
    }

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_tables(&pool).await?;

    info!(database_url = %database_url, "Database ready");
    Ok(pool)
}

/// Open a connection pool without touching the schema
///
/// Each connection to `sqlite::memory:` is a separate database, so in-memory
/// URLs get a single-connection pool.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let max_connections = if is_memory_url(database_url) { 1 } else { 10 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Create every table the hub uses
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_barcodes_table(pool).await?;
    create_saved_scans_table(pool).await?;
    Ok(())
}

/// Append-only history of every scan the hub accepted
pub async fn create_barcodes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS barcodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            barcode_id TEXT NOT NULL UNIQUE,
            barcode_data TEXT NOT NULL,
            barcode_type TEXT,
            source TEXT NOT NULL,
            product_name TEXT,
            product_id TEXT,
            price REAL NOT NULL DEFAULT 0,
            location_x REAL NOT NULL DEFAULT 0,
            location_y REAL NOT NULL DEFAULT 0,
            location_z REAL NOT NULL DEFAULT 0,
            category TEXT,
            metadata TEXT,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_barcodes_data_created ON barcodes(barcode_data, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// User-confirmed scans
pub async fn create_saved_scans_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS saved_scans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            barcode_data TEXT NOT NULL,
            barcode_type TEXT,
            source TEXT NOT NULL,
            product_name TEXT,
            category TEXT,
            price REAL NOT NULL DEFAULT 0,
            description TEXT,
            metadata TEXT,
            saved_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_saved_scans_barcode_saved ON saved_scans(barcode_data, saved_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
