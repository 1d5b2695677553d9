use std::collections::HashMap;

use chrono::NaiveDate;

use super::types::{AggregatedPeriodEntry, PeriodLabel};
use crate::period::CalendarRange;

/// Expand a month view into one row per calendar day of `range`.
///
/// Days nobody reported become zero-valued placeholders, so an empty input
/// still yields the full range. Output is chronological. Entries outside the
/// range, or not labelled by day, are dropped.
pub fn fill_gaps(
    entries: Vec<AggregatedPeriodEntry>,
    range: &CalendarRange,
) -> Vec<AggregatedPeriodEntry> {
    let mut by_day: HashMap<NaiveDate, AggregatedPeriodEntry> = HashMap::with_capacity(entries.len());
    for entry in entries {
        let PeriodLabel::Day(date) = entry.label else {
            continue;
        };
        if !range.contains(date) {
            continue;
        }
        match by_day.get_mut(&date) {
            Some(existing) => {
                existing.totals.add(&entry.totals);
                existing.active_days = existing.active_days.max(entry.active_days);
            }
            None => {
                by_day.insert(date, entry);
            }
        }
    }

    let filled: Vec<AggregatedPeriodEntry> = range
        .days()
        .map(|day| {
            by_day
                .remove(&day)
                .unwrap_or_else(|| AggregatedPeriodEntry::placeholder(day))
        })
        .collect();

    log::debug!(
        "filled {} days ({} placeholders) for {}..{}",
        filled.len(),
        filled.iter().filter(|e| e.active_days == 0).count(),
        range.start_date,
        range.end_date
    );
    filled
}
