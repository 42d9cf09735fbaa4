//! Scan history (`barcodes` table)

use chrono::{DateTime, Utc};
use robridge_common::{Result, StoredScan};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use uuid::Uuid;

/// `source` column value for scans ingested from ESP32 devices
pub const ESP32_SOURCE: &str = "esp32";

/// Column list shared by the read queries
const COLUMNS: &str = "id, barcode_id, barcode_data, barcode_type, source, product_name, \
     product_id, price, location_x, location_y, location_z, category, metadata, created_at";

/// A scan about to be appended
#[derive(Debug, Clone)]
pub struct NewScan {
    pub barcode_data: String,
    pub barcode_type: Option<String>,
    pub source: String,
    pub product_name: Option<String>,
    pub product_id: Option<String>,
    pub price: f64,
    pub location: (f64, f64, f64),
    pub category: Option<String>,
    pub metadata: Value,
}

/// `SCAN_<unix-millis>_<9 random chars>`
pub fn make_barcode_id(at: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("SCAN_{}_{}", at.timestamp_millis(), &random[..9])
}

/// Append one scan; returns the row id and the generated `barcode_id`
pub async fn insert_scan(
    pool: &SqlitePool,
    scan: &NewScan,
    created_at: DateTime<Utc>,
) -> Result<(i64, String)> {
    let barcode_id = make_barcode_id(created_at);
    let (x, y, z) = scan.location;

    let result = sqlx::query(
        r#"
        INSERT INTO barcodes (
            barcode_id, barcode_data, barcode_type, source, product_name,
            product_id, price, location_x, location_y, location_z,
            category, metadata, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&barcode_id)
    .bind(&scan.barcode_data)
    .bind(&scan.barcode_type)
    .bind(&scan.source)
    .bind(&scan.product_name)
    .bind(&scan.product_id)
    .bind(scan.price)
    .bind(x)
    .bind(y)
    .bind(z)
    .bind(&scan.category)
    .bind(scan.metadata.to_string())
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok((result.last_insert_rowid(), barcode_id))
}

/// Newest first, optionally restricted to one source
pub async fn list_scans(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
    source: Option<&str>,
) -> Result<Vec<StoredScan>> {
    let rows = match source {
        Some(source) => {
            sqlx::query_as::<_, StoredScan>(&format!(
                "SELECT {} FROM barcodes WHERE source = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                COLUMNS
            ))
            .bind(source)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, StoredScan>(&format!(
                "SELECT {} FROM barcodes ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                COLUMNS
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows)
}

/// Most recent row for a barcode value
pub async fn lookup_latest(pool: &SqlitePool, barcode_data: &str) -> Result<Option<StoredScan>> {
    let row = sqlx::query_as::<_, StoredScan>(&format!(
        "SELECT {} FROM barcodes WHERE barcode_data = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        COLUMNS
    ))
    .bind(barcode_data)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Remove one row by id; `false` when no such row exists
pub async fn delete_scan(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM barcodes WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Row counts grouped by source and by barcode type
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub by_source: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub total: i64,
}

pub async fn stats(pool: &SqlitePool) -> Result<ScanStats> {
    let groups: Vec<(String, Option<String>, i64)> = sqlx::query_as(
        "SELECT source, barcode_type, COUNT(*) FROM barcodes GROUP BY source, barcode_type",
    )
    .fetch_all(pool)
    .await?;

    let mut stats = ScanStats::default();
    for (source, barcode_type, count) in groups {
        stats.total += count;
        *stats.by_source.entry(source).or_insert(0) += count;
        *stats
            .by_type
            .entry(barcode_type.unwrap_or_else(|| "unknown".to_string()))
            .or_insert(0) += count;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    async fn setup_db() -> SqlitePool {
        robridge_common::db::init_database("sqlite::memory:")
            .await
            .unwrap()
    }

    fn scan(barcode: &str, source: &str, barcode_type: &str) -> NewScan {
        NewScan {
            barcode_data: barcode.to_string(),
            barcode_type: Some(barcode_type.to_string()),
            source: source.to_string(),
            product_name: Some(format!("Product {}", barcode)),
            product_id: Some(barcode.to_string()),
            price: 0.0,
            location: (0.0, 0.0, 0.0),
            category: Some("Scanned Product".to_string()),
            metadata: json!({"deviceId": "cam-1"}),
        }
    }

    #[test]
    fn test_barcode_id_format() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = make_barcode_id(at);

        assert!(id.starts_with("SCAN_1709294400000_"));
        assert_eq!(id.len(), "SCAN_1709294400000_".len() + 9);
    }

    #[tokio::test]
    async fn test_insert_and_list_newest_first() {
        let pool = setup_db().await;
        let t0 = Utc::now();

        insert_scan(&pool, &scan("111", ESP32_SOURCE, "EAN13"), t0).await.unwrap();
        insert_scan(&pool, &scan("222", ESP32_SOURCE, "EAN13"), t0 + Duration::seconds(1))
            .await
            .unwrap();
        insert_scan(&pool, &scan("333", "web", "QR"), t0 + Duration::seconds(2))
            .await
            .unwrap();

        let all = list_scans(&pool, 100, 0, None).await.unwrap();
        let barcodes: Vec<&str> = all.iter().map(|s| s.barcode_data.as_str()).collect();
        assert_eq!(barcodes, vec!["333", "222", "111"]);
        assert_eq!(all[2].metadata, Some(json!({"deviceId": "cam-1"})));

        let esp32 = list_scans(&pool, 100, 0, Some(ESP32_SOURCE)).await.unwrap();
        assert_eq!(esp32.len(), 2);

        let page = list_scans(&pool, 1, 1, None).await.unwrap();
        assert_eq!(page[0].barcode_data, "222");
    }

    #[tokio::test]
    async fn test_lookup_latest() {
        let pool = setup_db().await;
        let t0 = Utc::now();

        let mut older = scan("555", ESP32_SOURCE, "EAN13");
        older.product_name = Some("Old Name".to_string());
        insert_scan(&pool, &older, t0).await.unwrap();
        insert_scan(&pool, &scan("555", ESP32_SOURCE, "EAN13"), t0 + Duration::seconds(5))
            .await
            .unwrap();

        let found = lookup_latest(&pool, "555").await.unwrap().unwrap();
        assert_eq!(found.product_name.as_deref(), Some("Product 555"));
        assert!(lookup_latest(&pool, "999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_grouping() {
        let pool = setup_db().await;
        let now = Utc::now();

        insert_scan(&pool, &scan("1", ESP32_SOURCE, "EAN13"), now).await.unwrap();
        insert_scan(&pool, &scan("2", ESP32_SOURCE, "QR"), now).await.unwrap();
        insert_scan(&pool, &scan("3", "web", "QR"), now).await.unwrap();

        let stats = stats(&pool).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_source["esp32"], 2);
        assert_eq!(stats.by_source["web"], 1);
        assert_eq!(stats.by_type["QR"], 2);
        assert_eq!(stats.by_type["EAN13"], 1);
    }

    #[tokio::test]
    async fn test_delete_scan() {
        let pool = setup_db().await;
        let (keep, _) = insert_scan(&pool, &scan("111", ESP32_SOURCE, "EAN13"), Utc::now())
            .await
            .unwrap();
        let (gone, _) = insert_scan(&pool, &scan("222", ESP32_SOURCE, "EAN13"), Utc::now())
            .await
            .unwrap();

        assert!(delete_scan(&pool, gone).await.unwrap());
        assert!(!delete_scan(&pool, gone).await.unwrap());

        let rows = list_scans(&pool, 10, 0, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, keep);
    }
}
