pub mod aggregate;
pub mod date_util;
pub mod error;
pub mod import;
pub mod period;
pub mod storage;

pub use aggregate::{
    bucket_by_month, build_view, extract_years, fill_gaps, filter_range, merge_sources, summarize,
    with_derived_metrics, AggregatedPeriodEntry, DerivedMetrics, KpiSummary, KpiTotals, PeriodLabel,
    RawDailyRecord, SourceTag,
};
pub use error::{Error, Result};
pub use import::ImportReport;
pub use period::{
    month_range, resolve_range, week_range, year_range, CalendarRange, Granularity, Period,
};
pub use storage::repository::StoreSummary;
pub use storage::Database;

use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use storage::{fetch, repository};

/// Config key holding the view used when a report names none.
pub const CONFIG_DEFAULT_GRANULARITY: &str = "default_granularity";
/// Config key holding the store used when a report names none.
pub const CONFIG_DEFAULT_STORE: &str = "default_store";

/// What to report on. `today` anchors the default period; the library never reads the clock.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub granularity: Option<Granularity>,
    pub parameter: Option<String>,
    pub store: Option<String>,
    pub today: NaiveDate,
}

/// An aggregated view of one store over one period.
#[derive(Debug, Clone, Serialize)]
pub struct KpiReport {
    pub store_id: String,
    pub granularity: Granularity,
    pub period_key: String,
    pub previous_key: String,
    pub next_key: String,
    pub range: CalendarRange,
    pub summary: KpiSummary,
    pub entries: Vec<AggregatedPeriodEntry>,
}

impl KpiReport {
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str("label,sort_key,active_days,total_revenue,total_sales,total_clients,total_items,total_prospects,average_basket,conversion_rate,items_per_sale\n");
        for entry in &self.entries {
            let m = entry.metrics.unwrap_or_default();
            out.push_str(&format!(
                "{},{},{},{:.2},{},{},{},{},{:.2},{:.2},{:.2}\n",
                csv_escape(&entry.label.to_string()),
                entry.sort_key,
                entry.active_days,
                entry.totals.total_revenue,
                entry.totals.total_sales,
                entry.totals.total_clients,
                entry.totals.total_items,
                entry.totals.total_prospects,
                m.average_basket,
                m.conversion_rate,
                m.items_per_sale,
            ));
        }
        out
    }
}

/// Main entry point: reports over a local KPI warehouse.
pub struct KpiBoard {
    db: Database,
}

impl KpiBoard {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Reports ────────────────────────────────────────────────────

    /// Fetch every source of the store for the requested period and run the
    /// aggregation pipeline over them.
    pub async fn report(&self, request: &ReportRequest) -> Result<KpiReport> {
        let granularity = match request.granularity {
            Some(g) => g,
            None => match self.config_get(CONFIG_DEFAULT_GRANULARITY).await? {
                Some(value) => value.parse()?,
                None => Granularity::Month,
            },
        };
        let store_id = self.resolve_store(request.store.as_deref()).await?;

        let requested = match request.parameter.as_deref() {
            Some(parameter) => Period::parse(granularity, parameter)?,
            None => Period::current(granularity, request.today),
        };
        let range = requested.calendar_range()?;
        // W53 of a 52-week year resolves to W01 of the next year; report that week's key.
        let period = Period::current(granularity, range.start_date);

        let sources = fetch::fetch_source_records(&self.db, &store_id, &range).await?;
        let entries = build_view(granularity, &range, &sources);
        let summary = summarize(&entries);
        log::info!(
            "{store_id} {granularity} {period}: {} rows, revenue {:.2}",
            entries.len(),
            summary.totals.total_revenue
        );

        Ok(KpiReport {
            store_id,
            granularity,
            period_key: period.to_key(),
            previous_key: period.previous().to_key(),
            next_key: period.next().to_key(),
            range,
            summary,
            entries,
        })
    }

    /// Years with data for a store, most recent first.
    pub async fn available_years(&self, store: Option<&str>) -> Result<Vec<i32>> {
        let store_id = self.resolve_store(store).await?;
        let dates = self
            .db
            .reader()
            .call(move |conn| repository::record_dates(conn, &store_id))
            .await?;
        Ok(extract_years(&dates))
    }

    // ── Stores and sources ─────────────────────────────────────────

    pub async fn list_stores(&self) -> Result<Vec<StoreSummary>> {
        self.db
            .reader()
            .call(|conn| repository::list_stores(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn list_sources(&self, store: Option<&str>) -> Result<Vec<SourceTag>> {
        let store_id = self.resolve_store(store).await?;
        fetch::list_store_sources(&self.db, &store_id).await
    }

    // ── Import ─────────────────────────────────────────────────────

    /// Import a JSON file of daily records. Invalid rows are skipped and reported.
    pub async fn import_file(&self, path: impl AsRef<Path>, store: Option<&str>) -> Result<ImportReport> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let default_store = match store {
            Some(s) => Some(s.to_string()),
            None => self.config_get(CONFIG_DEFAULT_STORE).await?,
        };

        let rows = import::parse_rows(&contents)?;
        let (records, mut report) = import::validate_rows(rows, default_store.as_deref());
        let skipped = report.skipped;
        let file_path = path.display().to_string();

        // The job row lives outside the record transaction; a rolled-back
        // import still leaves a `failed` job.
        let written = self
            .db
            .writer()
            .call(move |conn| {
                let job_id = repository::insert_import_job(conn, &file_path)?;
                let outcome = match import::store_records(conn, &records) {
                    Ok(()) => {
                        repository::finish_import_job(
                            conn,
                            job_id,
                            "completed",
                            records.len() as u64,
                            skipped,
                            None,
                        )?;
                        Ok(records.len() as u64)
                    }
                    Err(e) => {
                        let message = e.to_string();
                        repository::finish_import_job(conn, job_id, "failed", 0, skipped, Some(&message))?;
                        Err(message)
                    }
                };
                Ok::<_, rusqlite::Error>(outcome)
            })
            .await?;

        report.imported = match written {
            Ok(imported) => imported,
            Err(message) => {
                log::error!("Import of {} failed: {message}", path.display());
                return Err(Error::Database(message));
            }
        };

        log::info!(
            "Imported {} records from {} ({} skipped)",
            report.imported,
            path.display(),
            report.skipped
        );
        Ok(report)
    }

    // ── Config ─────────────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Set a config value. Known keys are validated before they are stored.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        if key == CONFIG_DEFAULT_GRANULARITY {
            value.parse::<Granularity>()?;
        }
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn resolve_store(&self, store: Option<&str>) -> Result<String> {
        if let Some(s) = store {
            return Ok(s.to_string());
        }
        self.config_get(CONFIG_DEFAULT_STORE).await?.ok_or_else(|| {
            Error::Config(format!(
                "no store selected. Pass --store or run: kpiboard config set {CONFIG_DEFAULT_STORE} <STORE>"
            ))
        })
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn board_with(json: &str) -> KpiBoard {
        let board = KpiBoard::new(Database::open_memory().await.unwrap());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        board.import_file(file.path(), None).await.unwrap();
        board
    }

    fn request(granularity: Granularity, parameter: &str) -> ReportRequest {
        ReportRequest {
            granularity: Some(granularity),
            parameter: Some(parameter.to_string()),
            store: Some("paris".to_string()),
            today: d(2024, 6, 15),
        }
    }

    const JUNE: &str = r#"[
        {"date": "2024-06-10", "store": "paris", "seller": "alice", "revenue": 80, "sales": 2},
        {"date": "2024-06-10", "store": "paris", "seller": "bob", "revenue": 40, "sales": 1},
        {"date": "2024-05-02", "store": "paris", "revenue": 10, "sales": 1},
        {"date": "2023-11-20", "store": "paris", "seller": "bob", "revenue": 5, "sales": 1},
        {"date": "2024-06-10", "store": "lyon", "seller": "carl", "revenue": 999, "sales": 9}
    ]"#;

    #[tokio::test]
    async fn test_month_report_end_to_end() {
        let board = board_with(JUNE).await;
        let report = board.report(&request(Granularity::Month, "2024-06")).await.unwrap();

        assert_eq!(report.period_key, "2024-06");
        assert_eq!(report.previous_key, "2024-05");
        assert_eq!(report.next_key, "2024-07");
        assert_eq!(report.range.nominal_day_count, 30);
        assert_eq!(report.entries.len(), 30);

        for entry in &report.entries {
            let metrics = entry.metrics.unwrap();
            if entry.label == PeriodLabel::Day(d(2024, 6, 10)) {
                assert_eq!(entry.totals.total_revenue, 120.0);
                assert_eq!(entry.totals.total_sales, 3);
                assert_eq!(metrics.average_basket, 40.0);
            } else {
                assert!(entry.totals.is_zero());
                assert_eq!(metrics, DerivedMetrics::default());
            }
        }
        assert_eq!(report.summary.totals.total_revenue, 120.0);
        assert_eq!(report.summary.active_days, 1);
    }

    #[tokio::test]
    async fn test_year_report_and_years() {
        let board = board_with(JUNE).await;
        let report = board.report(&request(Granularity::Year, "2024")).await.unwrap();
        let labels: Vec<String> = report.entries.iter().map(|e| e.label.to_string()).collect();
        assert_eq!(labels, vec!["May", "June"]);
        assert_eq!(report.entries[1].totals.total_revenue, 120.0);

        assert_eq!(board.available_years(Some("paris")).await.unwrap(), vec![2024, 2023]);
        assert_eq!(board.available_years(Some("lyon")).await.unwrap(), vec![2024]);
    }

    #[tokio::test]
    async fn test_defaults_from_config_and_clock() {
        let board = board_with(JUNE).await;
        board.config_set(CONFIG_DEFAULT_STORE, "paris").await.unwrap();
        board.config_set(CONFIG_DEFAULT_GRANULARITY, "week").await.unwrap();
        assert!(board.config_set(CONFIG_DEFAULT_GRANULARITY, "decade").await.is_err());

        let report = board
            .report(&ReportRequest {
                granularity: None,
                parameter: None,
                store: None,
                today: d(2024, 6, 12),
            })
            .await
            .unwrap();
        assert_eq!(report.store_id, "paris");
        assert_eq!(report.granularity, Granularity::Week);
        assert_eq!(report.period_key, "2024-W24");
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].sort_key, "2024-06-10");
    }

    #[tokio::test]
    async fn test_report_errors() {
        let board = board_with(JUNE).await;
        let err = board.report(&request(Granularity::Week, "2024-W60")).await;
        assert!(matches!(err, Err(Error::InvalidRangeInput(_))));

        let no_store = ReportRequest {
            store: None,
            ..request(Granularity::Month, "2024-06")
        };
        assert!(matches!(board.report(&no_store).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_import_skips_bad_rows_and_lists_sources() {
        let board = KpiBoard::new(Database::open_memory().await.unwrap());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"[
                {"date": "2024-06-10", "seller": "alice", "revenue": 80},
                {"date": "bad", "seller": "alice"},
                {"date": "2024-06-11", "revenue": 3}
            ]"#,
        )
        .unwrap();

        let report = board.import_file(file.path(), Some("nice")).await.unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 1);

        let sources = board.list_sources(Some("nice")).await.unwrap();
        assert_eq!(sources, vec![SourceTag::Manager, SourceTag::Seller("alice".into())]);
        let stores = board.list_stores().await.unwrap();
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].record_count, 2);
    }

    #[tokio::test]
    async fn test_week_53_of_short_year_reports_normalized_keys() {
        let board = board_with(JUNE).await;
        let report = board.report(&request(Granularity::Week, "2021-W53")).await.unwrap();
        assert_eq!(report.range.start_date, d(2022, 1, 3));
        assert_eq!(report.period_key, "2022-W01");
        assert_eq!(report.previous_key, "2021-W52");
        assert_eq!(report.next_key, "2022-W02");

        let long_year = board.report(&request(Granularity::Week, "2020-W53")).await.unwrap();
        assert_eq!(long_year.period_key, "2020-W53");
        assert_eq!(long_year.range.start_date, d(2020, 12, 28));
    }

    async fn import_json(board: &KpiBoard, json: &str) -> Result<ImportReport> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        board.import_file(file.path(), Some("paris")).await
    }

    async fn import_jobs(board: &KpiBoard) -> Vec<(String, i64, Option<String>)> {
        board
            .db()
            .reader()
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT status, imported_rows, error_message FROM import_jobs ORDER BY id",
                )?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_oversized_count_skips_row_and_keeps_the_rest() {
        let board = KpiBoard::new(Database::open_memory().await.unwrap());
        let report = import_json(
            &board,
            r#"[
                {"date": "2024-06-10", "seller": "alice", "revenue": 80, "sales": 2},
                {"date": "2024-06-11", "seller": "alice", "sales": 18446744073709551615},
                {"date": "2024-06-12", "seller": "bob", "sales": -1}
            ]"#,
        )
        .await
        .unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 2);

        let stores = board.list_stores().await.unwrap();
        assert_eq!(stores[0].record_count, 1);
        assert_eq!(import_jobs(&board).await, vec![("completed".to_string(), 1, None)]);
    }

    #[tokio::test]
    async fn test_failed_write_marks_job_failed() {
        let board = KpiBoard::new(Database::open_memory().await.unwrap());
        board
            .db()
            .writer()
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_records BEFORE INSERT ON daily_records
                     BEGIN SELECT RAISE(ABORT, 'records are read-only'); END;",
                )
            })
            .await
            .unwrap();

        let result = import_json(
            &board,
            r#"[{"date": "2024-06-10", "revenue": 10}, {"date": "nope"}]"#,
        )
        .await;
        assert!(matches!(result, Err(Error::Database(ref m)) if m.contains("read-only")));

        let jobs = import_jobs(&board).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].0, "failed");
        assert_eq!(jobs[0].1, 0);
        assert!(jobs[0].2.as_deref().is_some_and(|m| m.contains("read-only")));

        // The store upsert ran inside the rolled-back transaction too.
        assert!(board.list_stores().await.unwrap().is_empty());
        let last = board
            .db()
            .reader()
            .call(|conn| repository::last_import_at(conn))
            .await
            .unwrap();
        assert!(last.is_none());
    }

    #[tokio::test]
    async fn test_csv_output() {
        let board = board_with(JUNE).await;
        let report = board.report(&request(Granularity::Year, "2024")).await.unwrap();
        let csv = report.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("label,sort_key"));
        assert_eq!(lines[2], "June,2024-06,1,120.00,3,0,0,0,40.00,0.00,0.00");
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("June"), "June");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
    }
}
