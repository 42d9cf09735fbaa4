//! User-confirmed scans (`saved_scans` table)
//!
//! The same barcode value cannot be saved twice within a trailing window
//! (5 minutes by default) measured from its most recent `saved_at`. The
//! duplicate check and the insert run under a per-barcode async lock so two
//! concurrent saves of one value cannot both pass the check.

use chrono::{DateTime, Duration, Utc};
use robridge_common::{Clock, Result, SavedScan};
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// A scan the user asked to keep
#[derive(Debug, Clone, Default)]
pub struct NewSavedScan {
    pub barcode_data: String,
    pub barcode_type: Option<String>,
    pub source: String,
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub metadata: Option<Value>,
}

/// Result of [`SavedScanStore::save`]
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved { id: i64 },
    Duplicate {
        last_saved: DateTime<Utc>,
        minutes_ago: f64,
    },
}

pub struct SavedScanStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    window: Duration,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SavedScanStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            pool,
            clock,
            window,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Insert unless the barcode was saved within the window
    pub async fn save(&self, scan: &NewSavedScan) -> Result<SaveOutcome> {
        let lock = self.lock_for(&scan.barcode_data);
        let result = {
            let _guard = lock.lock().await;
            self.check_and_insert(scan).await
        };
        self.release(&scan.barcode_data, lock);
        result
    }

    async fn check_and_insert(&self, scan: &NewSavedScan) -> Result<SaveOutcome> {
        let now = self.clock.now();

        let last_saved: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT saved_at FROM saved_scans WHERE barcode_data = ? ORDER BY saved_at DESC LIMIT 1",
        )
        .bind(&scan.barcode_data)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(last_saved) = last_saved {
            let elapsed = now - last_saved;
            if elapsed < self.window {
                let minutes_ago = elapsed.num_milliseconds() as f64 / 60_000.0;
                info!(
                    barcode = %scan.barcode_data,
                    minutes_ago = format!("{:.1}", minutes_ago),
                    "Duplicate save prevented"
                );
                return Ok(SaveOutcome::Duplicate {
                    last_saved,
                    minutes_ago,
                });
            }
        }

        let result = sqlx::query(
            r#"
            INSERT INTO saved_scans (
                barcode_data, barcode_type, source, product_name,
                category, price, description, metadata, saved_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&scan.barcode_data)
        .bind(&scan.barcode_type)
        .bind(&scan.source)
        .bind(&scan.product_name)
        .bind(&scan.category)
        .bind(scan.price.unwrap_or(0.0))
        .bind(&scan.description)
        .bind(scan.metadata.as_ref().map(Value::to_string))
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(barcode = %scan.barcode_data, saved_id = id, "Scan saved");
        Ok(SaveOutcome::Saved { id })
    }

    fn lock_for(&self, barcode: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(barcode.to_string()).or_default().clone()
    }

    /// Drop the map entry once no other save is waiting on it
    fn release(&self, barcode: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map plus ours
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(barcode);
        }
    }

    /// Newest first
    pub async fn list(&self) -> Result<Vec<SavedScan>> {
        let rows = sqlx::query_as::<_, SavedScan>(
            r#"
            SELECT id, barcode_data, barcode_type, source, product_name,
                   category, price, description, metadata, saved_at
            FROM saved_scans
            ORDER BY saved_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Returns whether a row was removed
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM saved_scans WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!(saved_id = id, removed = result.rows_affected(), "Delete saved scan");
        Ok(result.rows_affected() > 0)
    }

    /// Remove every saved scan; returns the number of rows removed
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM saved_scans")
            .execute(&self.pool)
            .await?;

        info!(removed = result.rows_affected(), "Cleared saved scans");
        Ok(result.rows_affected())
    }

    #[cfg(test)]
    fn pending_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
