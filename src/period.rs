use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::date_util::{days_between, last_day_of_month};
use crate::error::{Error, Result};

static RE_WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-W(\d{1,2})$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());

/// The calendar window size being viewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Week,
    Month,
    Year,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }

    /// The parameter selecting the period that contains `today`,
    /// e.g. `2024-W23`, `2024-06` or `2024`.
    pub fn current_parameter(&self, today: NaiveDate) -> String {
        Period::current(*self, today).to_key()
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "week" | "w" => Ok(Granularity::Week),
            "month" | "m" => Ok(Granularity::Month),
            "year" | "y" => Ok(Granularity::Year),
            other => Err(Error::InvalidRangeInput(format!(
                "unknown granularity: {other} (expected week, month or year)"
            ))),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inclusive date range with its nominal length in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub nominal_day_count: u32,
}

impl CalendarRange {
    /// Day-granularity membership test, both bounds inclusive.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Every calendar day of the range, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        days_between(self.start_date, self.end_date)
    }
}

/// A concrete week, month or year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    /// ISO year and ISO week number (1-53).
    Week(i32, u8),
    Month(i32, u8),
    Year(i32),
}

impl Period {
    /// Parse the selector parameter for a granularity.
    ///
    /// Supported formats:
    /// - week: `2025-W05` or `2025-W5`
    /// - month: `2025-01`
    /// - year: `2025`
    pub fn parse(granularity: Granularity, s: &str) -> Result<Self> {
        let s = s.trim();
        match granularity {
            Granularity::Week => {
                let caps = RE_WEEK
                    .captures(s)
                    .ok_or_else(|| Error::InvalidRangeInput(format!("invalid ISO week: {s}")))?;
                let year = parse_number::<i32>(&caps[1], s)?;
                let week = parse_number::<u8>(&caps[2], s)?;
                if !(1..=53).contains(&week) {
                    return Err(Error::InvalidRangeInput(format!(
                        "week number out of range: {s}"
                    )));
                }
                Ok(Period::Week(year, week))
            }
            Granularity::Month => {
                let caps = RE_MONTH
                    .captures(s)
                    .ok_or_else(|| Error::InvalidRangeInput(format!("invalid month: {s}")))?;
                let year = parse_number::<i32>(&caps[1], s)?;
                let month = parse_number::<u8>(&caps[2], s)?;
                if !(1..=12).contains(&month) {
                    return Err(Error::InvalidRangeInput(format!(
                        "month out of range: {s}"
                    )));
                }
                Ok(Period::Month(year, month))
            }
            Granularity::Year => {
                let year = s
                    .parse::<i32>()
                    .map_err(|_| Error::InvalidRangeInput(format!("invalid year: {s}")))?;
                Ok(Period::Year(year))
            }
        }
    }

    /// The period of the given granularity containing `today`.
    pub fn current(granularity: Granularity, today: NaiveDate) -> Self {
        match granularity {
            Granularity::Week => {
                let iw = today.iso_week();
                Period::Week(iw.year(), iw.week() as u8)
            }
            Granularity::Month => Period::Month(today.year(), today.month() as u8),
            Granularity::Year => Period::Year(today.year()),
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            Period::Week(..) => Granularity::Week,
            Period::Month(..) => Granularity::Month,
            Period::Year(_) => Granularity::Year,
        }
    }

    /// Convert to a canonical key string for storage/lookup.
    pub fn to_key(&self) -> String {
        match self {
            Period::Week(y, w) => format!("{y}-W{w:02}"),
            Period::Month(y, m) => format!("{y}-{m:02}"),
            Period::Year(y) => format!("{y}"),
        }
    }

    /// Resolve the inclusive date range covered by this period.
    pub fn calendar_range(&self) -> Result<CalendarRange> {
        let out_of_range = || Error::InvalidRangeInput(format!("date out of range: {self}"));
        match self {
            Period::Week(y, w) => {
                let start = iso_week_monday(*y, *w).ok_or_else(out_of_range)?;
                Ok(CalendarRange {
                    start_date: start,
                    end_date: start + Duration::days(6),
                    nominal_day_count: 7,
                })
            }
            Period::Month(y, m) => {
                let start =
                    NaiveDate::from_ymd_opt(*y, *m as u32, 1).ok_or_else(out_of_range)?;
                let end = last_day_of_month(*y, *m as u32).ok_or_else(out_of_range)?;
                Ok(CalendarRange {
                    start_date: start,
                    end_date: end,
                    nominal_day_count: ((end - start).num_days() + 1) as u32,
                })
            }
            Period::Year(y) => Ok(CalendarRange {
                start_date: NaiveDate::from_ymd_opt(*y, 1, 1).ok_or_else(out_of_range)?,
                end_date: NaiveDate::from_ymd_opt(*y, 12, 31).ok_or_else(out_of_range)?,
                nominal_day_count: 365,
            }),
        }
    }

    /// Get the previous period of the same type.
    pub fn previous(&self) -> Self {
        match self {
            Period::Week(y, w) => shift_week(*y, *w, -1),
            Period::Month(y, m) => {
                if *m == 1 {
                    Period::Month(y - 1, 12)
                } else {
                    Period::Month(*y, m - 1)
                }
            }
            Period::Year(y) => Period::Year(y - 1),
        }
    }

    /// Get the next period of the same type.
    pub fn next(&self) -> Self {
        match self {
            Period::Week(y, w) => shift_week(*y, *w, 1),
            Period::Month(y, m) => {
                if *m == 12 {
                    Period::Month(y + 1, 1)
                } else {
                    Period::Month(*y, m + 1)
                }
            }
            Period::Year(y) => Period::Year(y + 1),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

/// Range of an ISO week string such as `2024-W05`. Always seven days, Monday to Sunday.
pub fn week_range(iso_week: &str) -> Result<CalendarRange> {
    Period::parse(Granularity::Week, iso_week)?.calendar_range()
}

/// Range of a `YYYY-MM` month, first to last calendar day.
pub fn month_range(year_month: &str) -> Result<CalendarRange> {
    Period::parse(Granularity::Month, year_month)?.calendar_range()
}

/// January 1st to December 31st. The nominal day count stays 365 in leap years.
pub fn year_range(year: i32) -> Result<CalendarRange> {
    Period::Year(year).calendar_range()
}

/// Resolve a granularity selector and its parameter into a date range.
pub fn resolve_range(granularity: Granularity, parameter: &str) -> Result<CalendarRange> {
    Period::parse(granularity, parameter)?.calendar_range()
}

/// Number of ISO weeks (52 or 53) in an ISO year. December 28th always falls in the last one.
pub fn iso_weeks_in_year(year: i32) -> Option<u8> {
    NaiveDate::from_ymd_opt(year, 12, 28).map(|d| d.iso_week().week() as u8)
}

/// Monday of ISO week `week`: January 4th is always in week 1, so walk back
/// to its Monday and advance whole weeks from there.
fn iso_week_monday(year: i32, week: u8) -> Option<NaiveDate> {
    let jan4 = NaiveDate::from_ymd_opt(year, 1, 4)?;
    let week1_monday = jan4 - Duration::days(jan4.weekday().num_days_from_monday() as i64);
    week1_monday.checked_add_signed(Duration::days((week as i64 - 1) * 7))
}

fn shift_week(year: i32, week: u8, delta: i64) -> Period {
    match iso_week_monday(year, week).and_then(|d| d.checked_add_signed(Duration::days(7 * delta))) {
        Some(monday) => {
            let iw = monday.iso_week();
            Period::Week(iw.year(), iw.week() as u8)
        }
        None => Period::Week(year, week),
    }
}

fn parse_number<T: FromStr>(digits: &str, input: &str) -> Result<T> {
    digits
        .parse()
        .map_err(|_| Error::InvalidRangeInput(format!("invalid number in {input}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_granularity() {
        assert_eq!("week".parse::<Granularity>().unwrap(), Granularity::Week);
        assert_eq!("Month".parse::<Granularity>().unwrap(), Granularity::Month);
        assert_eq!(" year ".parse::<Granularity>().unwrap(), Granularity::Year);
        assert!("quarter".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_parse_week() {
        assert_eq!(
            Period::parse(Granularity::Week, "2025-W05").unwrap(),
            Period::Week(2025, 5)
        );
        assert_eq!(
            Period::parse(Granularity::Week, "2025-W1").unwrap(),
            Period::Week(2025, 1)
        );
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["2024-W00", "2024-W54", "2024W05", "W05", "garbage"] {
            assert!(
                matches!(week_range(bad), Err(Error::InvalidRangeInput(_))),
                "{bad} should be rejected"
            );
        }
        for bad in ["2024-13", "2024-00", "2024-6", "2024/06", ""] {
            assert!(
                matches!(month_range(bad), Err(Error::InvalidRangeInput(_))),
                "{bad} should be rejected"
            );
        }
        for bad in ["20x4", "2024.5", ""] {
            assert!(
                matches!(
                    resolve_range(Granularity::Year, bad),
                    Err(Error::InvalidRangeInput(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_week_range_known_dates() {
        // 2024 starts on a Monday
        let r = week_range("2024-W01").unwrap();
        assert_eq!(r.start_date, d(2024, 1, 1));
        assert_eq!(r.end_date, d(2024, 1, 7));

        // Week 1 of 2025 begins in December 2024
        let r = week_range("2025-W01").unwrap();
        assert_eq!(r.start_date, d(2024, 12, 30));
        assert_eq!(r.end_date, d(2025, 1, 5));

        let r = week_range("2020-W53").unwrap();
        assert_eq!(r.start_date, d(2020, 12, 28));
        assert_eq!(r.end_date, d(2021, 1, 3));
    }

    #[test]
    fn test_week_ranges_tile_the_calendar() {
        let mut previous_end: Option<NaiveDate> = None;
        for year in 2015..=2030 {
            let weeks = iso_weeks_in_year(year).unwrap();
            for week in 1..=weeks {
                let r = week_range(&format!("{year}-W{week:02}")).unwrap();
                assert_eq!(r.nominal_day_count, 7);
                assert_eq!(r.start_date.weekday(), Weekday::Mon);
                assert_eq!(r.end_date.weekday(), Weekday::Sun);
                assert_eq!((r.end_date - r.start_date).num_days(), 6);
                if let Some(prev) = previous_end {
                    assert_eq!(r.start_date, prev + Duration::days(1), "gap or overlap at {year}-W{week}");
                }
                previous_end = Some(r.end_date);
            }
        }
    }

    #[test]
    fn test_month_range_day_counts() {
        assert_eq!(month_range("2024-02").unwrap().nominal_day_count, 29);
        assert_eq!(month_range("2023-02").unwrap().nominal_day_count, 28);
        assert_eq!(month_range("2024-04").unwrap().nominal_day_count, 30);
        assert_eq!(month_range("2024-12").unwrap().nominal_day_count, 31);

        let r = month_range("2024-02").unwrap();
        assert_eq!(r.start_date, d(2024, 2, 1));
        assert_eq!(r.end_date, d(2024, 2, 29));
    }

    #[test]
    fn test_year_range() {
        let r = year_range(2024).unwrap();
        assert_eq!(r.start_date, d(2024, 1, 1));
        assert_eq!(r.end_date, d(2024, 12, 31));
        assert_eq!(r.nominal_day_count, 365);
        assert_eq!(resolve_range(Granularity::Year, "2024").unwrap(), r);
    }

    #[test]
    fn test_range_contains_and_days() {
        let r = month_range("2023-02").unwrap();
        assert!(r.contains(d(2023, 2, 1)));
        assert!(r.contains(d(2023, 2, 28)));
        assert!(!r.contains(d(2023, 3, 1)));
        assert!(!r.contains(d(2023, 1, 31)));
        assert_eq!(r.days().count(), 28);
    }

    #[test]
    fn test_to_key() {
        assert_eq!(Period::Week(2025, 5).to_key(), "2025-W05");
        assert_eq!(Period::Month(2025, 1).to_key(), "2025-01");
        assert_eq!(Period::Year(2025).to_key(), "2025");
    }

    #[test]
    fn test_current_parameter() {
        let today = d(2024, 12, 31);
        assert_eq!(Granularity::Week.current_parameter(today), "2025-W01");
        assert_eq!(Granularity::Month.current_parameter(today), "2024-12");
        assert_eq!(Granularity::Year.current_parameter(today), "2024");
    }

    #[test]
    fn test_previous_and_next() {
        assert_eq!(Period::Month(2025, 1).previous(), Period::Month(2024, 12));
        assert_eq!(Period::Month(2024, 12).next(), Period::Month(2025, 1));
        assert_eq!(Period::Year(2025).previous(), Period::Year(2024));
        assert_eq!(Period::Week(2025, 10).next(), Period::Week(2025, 11));

        // 2020 has 53 ISO weeks, 2021 has 52
        assert_eq!(Period::Week(2021, 1).previous(), Period::Week(2020, 53));
        assert_eq!(Period::Week(2020, 53).next(), Period::Week(2021, 1));
        assert_eq!(Period::Week(2022, 1).previous(), Period::Week(2021, 52));
        assert_eq!(Period::Week(2021, 52).next(), Period::Week(2022, 1));
    }
}
