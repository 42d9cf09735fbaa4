//! Row mapping for the scan tables
//!
//! `metadata` columns hold JSON text. Text that does not parse is surfaced
//! as a JSON string instead of failing the whole row.

use crate::models::{SavedScan, StoredScan};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, FromRow, Row};

fn parse_metadata(raw: Option<String>) -> Option<Value> {
    raw.map(|text| serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

impl<'r> FromRow<'r, SqliteRow> for SavedScan {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            barcode_data: row.try_get("barcode_data")?,
            barcode_type: row.try_get("barcode_type")?,
            source: row.try_get("source")?,
            product_name: row.try_get("product_name")?,
            category: row.try_get("category")?,
            price: row.try_get("price")?,
            description: row.try_get("description")?,
            metadata: parse_metadata(row.try_get("metadata")?),
            saved_at: row.try_get("saved_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for StoredScan {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            barcode_id: row.try_get("barcode_id")?,
            barcode_data: row.try_get("barcode_data")?,
            barcode_type: row.try_get("barcode_type")?,
            source: row.try_get("source")?,
            product_name: row.try_get("product_name")?,
            product_id: row.try_get("product_id")?,
            price: row.try_get("price")?,
            location_x: row.try_get("location_x")?,
            location_y: row.try_get("location_y")?,
            location_z: row.try_get("location_z")?,
            category: row.try_get("category")?,
            metadata: parse_metadata(row.try_get("metadata")?),
            created_at: row.try_get("created_at")?,
        })
    }
}
