use std::collections::BTreeMap;

use chrono::Datelike;

use super::types::{AggregatedPeriodEntry, KpiTotals};

/// Roll daily rows up into one row per month present, in chronological order.
///
/// Months without any input row are not synthesized.
pub fn bucket_by_month(entries: &[AggregatedPeriodEntry]) -> Vec<AggregatedPeriodEntry> {
    let mut buckets: BTreeMap<(i32, u32), (KpiTotals, u32)> = BTreeMap::new();

    for entry in entries {
        let Some(date) = entry.start_date() else {
            continue;
        };
        let (totals, days) = buckets.entry((date.year(), date.month())).or_default();
        totals.add(&entry.totals);
        *days += entry.active_days;
    }

    buckets
        .into_iter()
        .map(|((year, month), (totals, days))| AggregatedPeriodEntry::month(year, month, totals, days))
        .collect()
}
