use chrono::{Datelike, Duration, Month, NaiveDate};

/// Get the last day of a given month (the day before the 1st of the next month).
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(first_of_next - Duration::days(1))
}

/// English month name for 1-12.
pub fn month_name(month: u32) -> Option<&'static str> {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
}

/// Canonical `YYYY-MM-DD` key for a date.
pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// `YYYY-MM` prefix of a date, used to sort month buckets.
pub fn month_key(d: NaiveDate) -> String {
    format!("{:04}-{:02}", d.year(), d.month())
}

/// Parse a stored date, dropping any time-of-day suffix.
///
/// Accepts `2024-06-10`, `2024-06-10T23:15:00Z` and `2024-06-10 08:00:00`.
pub fn parse_date_key(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let day = s.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Iterate every day of `[start, end]` inclusive.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}
