use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};

use crate::date_util::{date_key, month_name};
use crate::error::{Error, Result};

/// Who reported a daily record: one seller, or the store manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceTag {
    Manager,
    Seller(String),
}

impl SourceTag {
    /// Storage key: `manager` or `seller:<name>`.
    pub fn to_key(&self) -> String {
        match self {
            SourceTag::Manager => "manager".to_string(),
            SourceTag::Seller(name) => format!("seller:{name}"),
        }
    }

    pub fn parse(key: &str) -> Result<Self> {
        let key = key.trim();
        if key == "manager" {
            return Ok(SourceTag::Manager);
        }
        match key.strip_prefix("seller:") {
            Some(name) if !name.trim().is_empty() => Ok(SourceTag::Seller(name.trim().to_string())),
            _ => Err(Error::Import(format!("invalid source key: {key}"))),
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key())
    }
}

/// One source's indicators for one calendar day.
///
/// Numeric fields are always present; missing values are zeroed when the
/// record is ingested, never inside the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawDailyRecord {
    pub date: NaiveDate,
    pub source: SourceTag,
    pub revenue: f64,
    pub sales_count: u64,
    pub clients_count: u64,
    pub items_count: u64,
    pub prospects_count: u64,
}

impl RawDailyRecord {
    /// A record with every indicator at zero.
    pub fn empty(date: NaiveDate, source: SourceTag) -> Self {
        Self {
            date,
            source,
            revenue: 0.0,
            sales_count: 0,
            clients_count: 0,
            items_count: 0,
            prospects_count: 0,
        }
    }
}

/// The five additive indicators of a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KpiTotals {
    pub total_revenue: f64,
    pub total_sales: u64,
    pub total_clients: u64,
    pub total_items: u64,
    pub total_prospects: u64,
}

impl KpiTotals {
    /// Counts saturate at `u64::MAX` instead of overflowing.
    pub fn add_record(&mut self, record: &RawDailyRecord) {
        self.total_revenue += record.revenue;
        self.total_sales = self.total_sales.saturating_add(record.sales_count);
        self.total_clients = self.total_clients.saturating_add(record.clients_count);
        self.total_items = self.total_items.saturating_add(record.items_count);
        self.total_prospects = self.total_prospects.saturating_add(record.prospects_count);
    }

    pub fn add(&mut self, other: &KpiTotals) {
        self.total_revenue += other.total_revenue;
        self.total_sales = self.total_sales.saturating_add(other.total_sales);
        self.total_clients = self.total_clients.saturating_add(other.total_clients);
        self.total_items = self.total_items.saturating_add(other.total_items);
        self.total_prospects = self.total_prospects.saturating_add(other.total_prospects);
    }

    pub fn is_zero(&self) -> bool {
        *self == KpiTotals::default()
    }
}

/// Ratio metrics derived from a period's totals. Zero whenever the denominator is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub average_basket: f64,
    /// Sales over prospects, as a percentage.
    pub conversion_rate: f64,
    pub items_per_sale: f64,
}

/// Row label: a calendar day, or a month in a yearly view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeriodLabel {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
}

impl PeriodLabel {
    /// Chronologically sortable key: `YYYY-MM-DD` for days, `YYYY-MM` for months.
    pub fn sort_key(&self) -> String {
        match self {
            PeriodLabel::Day(d) => date_key(*d),
            PeriodLabel::Month { year, month } => format!("{year:04}-{month:02}"),
        }
    }

    /// First calendar day covered by the label.
    pub fn start_date(&self) -> Option<NaiveDate> {
        match self {
            PeriodLabel::Day(d) => Some(*d),
            PeriodLabel::Month { year, month } => NaiveDate::from_ymd_opt(*year, *month, 1),
        }
    }
}

impl fmt::Display for PeriodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodLabel::Day(d) => write!(f, "{}", date_key(*d)),
            PeriodLabel::Month { year, month } => match month_name(*month) {
                Some(name) => f.write_str(name),
                None => write!(f, "{year:04}-{month:02}"),
            },
        }
    }
}

impl Serialize for PeriodLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One output row: a day or a month bucket with summed totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedPeriodEntry {
    pub label: PeriodLabel,
    pub sort_key: String,
    /// Days with at least one report that fed this row. Zero for placeholder days.
    pub active_days: u32,
    #[serde(flatten)]
    pub totals: KpiTotals,
    /// Set by [`crate::aggregate::with_derived_metrics`].
    #[serde(flatten)]
    pub metrics: Option<DerivedMetrics>,
}

impl AggregatedPeriodEntry {
    pub fn day(date: NaiveDate, totals: KpiTotals) -> Self {
        let label = PeriodLabel::Day(date);
        Self {
            sort_key: label.sort_key(),
            label,
            active_days: 1,
            totals,
            metrics: None,
        }
    }

    /// A zero-valued day standing in for a day nobody reported.
    pub fn placeholder(date: NaiveDate) -> Self {
        Self {
            active_days: 0,
            ..Self::day(date, KpiTotals::default())
        }
    }

    pub fn month(year: i32, month: u32, totals: KpiTotals, active_days: u32) -> Self {
        let label = PeriodLabel::Month { year, month };
        Self {
            sort_key: label.sort_key(),
            label,
            active_days,
            totals,
            metrics: None,
        }
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.label.start_date()
    }
}

/// Anything carrying a calendar date, for year catalogues.
pub trait Dated {
    fn date(&self) -> Option<NaiveDate>;

    fn calendar_year(&self) -> Option<i32> {
        self.date().map(|d| Datelike::year(&d))
    }
}

impl Dated for RawDailyRecord {
    fn date(&self) -> Option<NaiveDate> {
        Some(self.date)
    }
}

impl Dated for AggregatedPeriodEntry {
    fn date(&self) -> Option<NaiveDate> {
        self.start_date()
    }
}

impl Dated for NaiveDate {
    fn date(&self) -> Option<NaiveDate> {
        Some(*self)
    }
}

/// Headline figures for a whole view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiSummary {
    pub rows: usize,
    pub active_days: u32,
    #[serde(flatten)]
    pub totals: KpiTotals,
    #[serde(flatten)]
    pub metrics: DerivedMetrics,
}
