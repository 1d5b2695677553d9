//! JSON ingestion of daily indicator reports.
//!
//! The input is an array of objects:
//!
//! ```json
//! [
//!   {"date": "2024-06-10", "store": "paris", "seller": "alice", "revenue": 80.0, "sales": 2},
//!   {"date": "2024-06-10T18:30:00Z", "store": "paris", "revenue": 15.5, "prospects": 4}
//! ]
//! ```
//!
//! Rows without `seller` belong to the store manager. Missing indicators are
//! zero from here on; nothing downstream re-checks them. A malformed row is
//! skipped on its own and never rejects the rest of the file.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::aggregate::{RawDailyRecord, SourceTag};
use crate::date_util::parse_date_key;
use crate::error::{Error, Result};
use crate::storage::repository;

/// One row as written by the recording workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRow {
    pub date: String,
    pub store: Option<String>,
    pub seller: Option<String>,
    pub revenue: Option<f64>,
    pub sales: Option<u64>,
    pub clients: Option<u64>,
    pub items: Option<u64>,
    pub prospects: Option<u64>,
}

/// A validated row ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedRecord {
    pub store_id: String,
    pub record: RawDailyRecord,
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}

impl ImportRow {
    /// Validate and normalize the row. `default_store` applies when the row names none.
    pub fn into_record(self, default_store: Option<&str>) -> Result<ImportedRecord> {
        let date = parse_date_key(&self.date)
            .ok_or_else(|| Error::Import(format!("invalid date: {}", self.date)))?;

        let store_id = self
            .store
            .as_deref()
            .or(default_store)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Import(format!("no store for record dated {}", self.date)))?
            .to_string();

        let source = match self.seller.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => SourceTag::Seller(name.to_string()),
            _ => SourceTag::Manager,
        };

        let revenue = self.revenue.unwrap_or(0.0);
        if !revenue.is_finite() || revenue < 0.0 {
            return Err(Error::Import(format!(
                "revenue must be a non-negative number, got {revenue} on {}",
                self.date
            )));
        }

        Ok(ImportedRecord {
            store_id,
            record: RawDailyRecord {
                date,
                source,
                revenue,
                sales_count: storable_count("sales", self.sales, &self.date)?,
                clients_count: storable_count("clients", self.clients, &self.date)?,
                items_count: storable_count("items", self.items, &self.date)?,
                prospects_count: storable_count("prospects", self.prospects, &self.date)?,
            },
        })
    }
}

/// Missing counts are zero. SQLite integers are signed, so anything above `i64::MAX` is refused.
fn storable_count(field: &str, value: Option<u64>, date: &str) -> Result<u64> {
    let value = value.unwrap_or(0);
    match i64::try_from(value) {
        Ok(_) => Ok(value),
        Err(_) => Err(Error::Import(format!("{field} count {value} is too large on {date}"))),
    }
}

/// Parse a JSON document into raw rows. Only the array shape is checked here;
/// each row is decoded by [`validate_rows`].
pub fn parse_rows(json: &str) -> Result<Vec<serde_json::Value>> {
    Ok(serde_json::from_str(json)?)
}

/// Decode and validate every row, keeping the good ones and describing the bad ones.
pub fn validate_rows(
    rows: Vec<serde_json::Value>,
    default_store: Option<&str>,
) -> (Vec<ImportedRecord>, ImportReport) {
    let mut report = ImportReport::default();
    let mut records = Vec::with_capacity(rows.len());
    for (i, value) in rows.into_iter().enumerate() {
        let decoded = serde_json::from_value::<ImportRow>(value)
            .map_err(Error::from)
            .and_then(|row| row.into_record(default_store));
        match decoded {
            Ok(record) => records.push(record),
            Err(e) => {
                log::warn!("Skipping row {}: {e}", i + 1);
                report.skipped += 1;
                report.errors.push(format!("row {}: {e}", i + 1));
            }
        }
    }
    (records, report)
}

/// Write validated records in one transaction. Nothing is kept if any write fails.
pub fn store_records(conn: &mut Connection, records: &[ImportedRecord]) -> std::result::Result<(), rusqlite::Error> {
    let tx = conn.transaction()?;
    for imported in records {
        repository::upsert_store(&tx, &imported.store_id, None)?;
        repository::upsert_source(&tx, &imported.store_id, &imported.record.source)?;
        repository::upsert_daily_record(&tx, &imported.store_id, &imported.record)?;
    }
    tx.commit()
}
