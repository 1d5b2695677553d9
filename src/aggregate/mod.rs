pub mod bucket;
pub mod derived;
pub mod gap;
pub mod types;

pub use bucket::bucket_by_month;
pub use derived::with_derived_metrics;
pub use gap::fill_gaps;
pub use types::*;

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::period::{CalendarRange, Granularity};

/// Combine per-source record lists into one row per reported date.
///
/// Numeric fields are summed across sources; source order does not matter.
/// Dates nobody reported are absent. Output order is unspecified.
pub fn merge_sources(sources: &[Vec<RawDailyRecord>]) -> Vec<AggregatedPeriodEntry> {
    let mut by_date: HashMap<NaiveDate, KpiTotals> = HashMap::new();
    for record in sources.iter().flatten() {
        by_date.entry(record.date).or_default().add_record(record);
    }

    by_date
        .into_iter()
        .map(|(date, totals)| AggregatedPeriodEntry::day(date, totals))
        .collect()
}

/// Keep the entries whose date falls inside `range`, bounds inclusive.
pub fn filter_range(
    entries: Vec<AggregatedPeriodEntry>,
    range: &CalendarRange,
) -> Vec<AggregatedPeriodEntry> {
    entries
        .into_iter()
        .filter(|e| e.start_date().is_some_and(|d| range.contains(d)))
        .collect()
}

/// Distinct calendar years present, most recent first.
pub fn extract_years<T: Dated>(entries: &[T]) -> Vec<i32> {
    let years: BTreeSet<i32> = entries.iter().filter_map(Dated::calendar_year).collect();
    years.into_iter().rev().collect()
}

/// Run the full pipeline for one view: merge, clip to range, then fill days
/// (month view) or roll up into months (year view), then derive metrics.
///
/// Week views are neither filled nor bucketed, only sorted.
pub fn build_view(
    granularity: Granularity,
    range: &CalendarRange,
    sources: &[Vec<RawDailyRecord>],
) -> Vec<AggregatedPeriodEntry> {
    let merged = merge_sources(sources);
    let merged_count = merged.len();
    let filtered = filter_range(merged, range);
    log::debug!(
        "{granularity} view {}..{}: {} sources, {merged_count} merged days, {} in range",
        range.start_date,
        range.end_date,
        sources.len(),
        filtered.len()
    );

    let shaped = match granularity {
        Granularity::Month => fill_gaps(filtered, range),
        Granularity::Year => bucket_by_month(&filtered),
        Granularity::Week => {
            let mut days = filtered;
            days.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
            days
        }
    };

    with_derived_metrics(shaped)
}

/// Sum a whole view and derive its period-level ratios.
pub fn summarize(entries: &[AggregatedPeriodEntry]) -> KpiSummary {
    let mut totals = KpiTotals::default();
    let mut active_days = 0;
    for entry in entries {
        totals.add(&entry.totals);
        active_days += entry.active_days;
    }
    KpiSummary {
        rows: entries.len(),
        active_days,
        totals,
        metrics: DerivedMetrics::from_totals(&totals),
    }
}
