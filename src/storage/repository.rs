use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::aggregate::{RawDailyRecord, SourceTag};
use crate::date_util::{date_key, parse_date_key};

/// A store and how much data it holds.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub store_id: String,
    pub name: Option<String>,
    pub source_count: u64,
    pub record_count: u64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}

// ── Stores ─────────────────────────────────────────────────────────

pub fn upsert_store(conn: &Connection, store_id: &str, name: Option<&str>) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO stores (store_id, name, created_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(store_id) DO UPDATE SET name = COALESCE(excluded.name, stores.name)",
        params![store_id, name],
    )?;
    Ok(())
}

pub fn list_stores(conn: &Connection) -> Result<Vec<StoreSummary>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT s.store_id, s.name,
                (SELECT COUNT(*) FROM sources src WHERE src.store_id = s.store_id),
                COUNT(r.date_key), MIN(r.date_key), MAX(r.date_key)
         FROM stores s
         LEFT JOIN daily_records r ON r.store_id = s.store_id
         GROUP BY s.store_id
         ORDER BY s.store_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(StoreSummary {
            store_id: row.get(0)?,
            name: row.get(1)?,
            source_count: row.get::<_, i64>(2)? as u64,
            record_count: row.get::<_, i64>(3)? as u64,
            first_date: row.get(4)?,
            last_date: row.get(5)?,
        })
    })?;
    rows.collect()
}

// ── Sources ────────────────────────────────────────────────────────

pub fn upsert_source(conn: &Connection, store_id: &str, source: &SourceTag) -> Result<(), rusqlite::Error> {
    let (kind, seller_name) = match source {
        SourceTag::Manager => ("manager", None),
        SourceTag::Seller(name) => ("seller", Some(name.as_str())),
    };
    conn.execute(
        "INSERT OR IGNORE INTO sources (store_id, source_key, source_kind, seller_name, created_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        params![store_id, source.to_key(), kind, seller_name],
    )?;
    Ok(())
}

/// Every source of a store, manager first, sellers by name.
pub fn list_sources(conn: &Connection, store_id: &str) -> Result<Vec<SourceTag>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT source_kind, seller_name FROM sources
         WHERE store_id = ?1
         ORDER BY source_kind = 'seller', seller_name",
    )?;
    let rows = stmt.query_map(params![store_id], |row| {
        let kind: String = row.get(0)?;
        let name: Option<String> = row.get(1)?;
        Ok(match (kind.as_str(), name) {
            ("seller", Some(name)) => SourceTag::Seller(name),
            _ => SourceTag::Manager,
        })
    })?;
    rows.collect()
}

// ── Daily records ──────────────────────────────────────────────────

/// Insert or replace one source's figures for a day.
pub fn upsert_daily_record(
    conn: &Connection,
    store_id: &str,
    record: &RawDailyRecord,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO daily_records (
            store_id, source_key, date_key, revenue,
            sales_count, clients_count, items_count, prospects_count, imported_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
        ON CONFLICT(store_id, source_key, date_key) DO UPDATE SET
            revenue=excluded.revenue, sales_count=excluded.sales_count,
            clients_count=excluded.clients_count, items_count=excluded.items_count,
            prospects_count=excluded.prospects_count, imported_at=excluded.imported_at",
        params![
            store_id,
            record.source.to_key(),
            date_key(record.date),
            record.revenue,
            record.sales_count,
            record.clients_count,
            record.items_count,
            record.prospects_count,
        ],
    )?;
    Ok(())
}

/// Records of one source with `start <= date <= end`, ordered by date.
pub fn records_for_source(
    conn: &Connection,
    store_id: &str,
    source: &SourceTag,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<RawDailyRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT date_key, revenue, sales_count, clients_count, items_count, prospects_count
         FROM daily_records
         WHERE store_id = ?1 AND source_key = ?2 AND date_key >= ?3 AND date_key <= ?4
         ORDER BY date_key",
    )?;
    let rows = stmt.query_map(
        params![store_id, source.to_key(), date_key(start), date_key(end)],
        |row| record_from_row(row, source),
    )?;

    let mut records = Vec::new();
    for row in rows {
        match row? {
            Some(record) => records.push(record),
            None => log::warn!("Skipping record with unreadable date for {source} in {store_id}"),
        }
    }
    Ok(records)
}

/// Distinct dates with at least one record for a store.
pub fn record_dates(conn: &Connection, store_id: &str) -> Result<Vec<NaiveDate>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT date_key FROM daily_records WHERE store_id = ?1 ORDER BY date_key",
    )?;
    let rows = stmt.query_map(params![store_id], |row| row.get::<_, String>(0))?;
    let mut dates = Vec::new();
    for key in rows {
        if let Some(d) = parse_date_key(&key?) {
            dates.push(d);
        }
    }
    Ok(dates)
}

fn record_from_row(row: &Row<'_>, source: &SourceTag) -> Result<Option<RawDailyRecord>, rusqlite::Error> {
    let key: String = row.get(0)?;
    let Some(date) = parse_date_key(&key) else {
        return Ok(None);
    };
    Ok(Some(RawDailyRecord {
        date,
        source: source.clone(),
        revenue: row.get(1)?,
        sales_count: row.get::<_, i64>(2)?.max(0) as u64,
        clients_count: row.get::<_, i64>(3)?.max(0) as u64,
        items_count: row.get::<_, i64>(4)?.max(0) as u64,
        prospects_count: row.get::<_, i64>(5)?.max(0) as u64,
    }))
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Import jobs ────────────────────────────────────────────────────

pub fn insert_import_job(conn: &Connection, file_path: &str) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO import_jobs (file_path, status, started_at)
         VALUES (?1, 'running', datetime('now'))",
        params![file_path],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_import_job(
    conn: &Connection,
    job_id: i64,
    status: &str,
    imported_rows: u64,
    skipped_rows: u64,
    error_message: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE import_jobs SET
            status = ?2, completed_at = datetime('now'),
            imported_rows = ?3, skipped_rows = ?4, error_message = ?5
         WHERE id = ?1",
        params![
            job_id,
            status,
            imported_rows,
            skipped_rows,
            error_message,
        ],
    )?;
    Ok(())
}

pub fn last_import_at(conn: &Connection) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT MAX(completed_at) FROM import_jobs WHERE status = 'completed'",
        [],
        |row| row.get(0),
    )
}
