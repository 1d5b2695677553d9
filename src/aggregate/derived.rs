use super::types::{AggregatedPeriodEntry, DerivedMetrics, KpiTotals};

impl DerivedMetrics {
    pub fn from_totals(totals: &KpiTotals) -> Self {
        Self {
            average_basket: ratio(totals.total_revenue, totals.total_sales),
            conversion_rate: ratio(totals.total_sales as f64 * 100.0, totals.total_prospects),
            items_per_sale: ratio(totals.total_items as f64, totals.total_sales),
        }
    }
}

/// Annotate every entry with its ratio metrics.
pub fn with_derived_metrics(entries: Vec<AggregatedPeriodEntry>) -> Vec<AggregatedPeriodEntry> {
    entries
        .into_iter()
        .map(|mut entry| {
            entry.metrics = Some(DerivedMetrics::from_totals(&entry.totals));
            entry
        })
        .collect()
}

fn ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator > 0 {
        numerator / denominator as f64
    } else {
        0.0
    }
}
