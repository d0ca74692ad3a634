//! Timestamp parsing and calendar-aware date arithmetic.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta};

use crate::error::{InventoryError, Result};

/// Average month length used for fractional months.
const DAYS_PER_MONTH: f64 = 30.43;

/// Unit of an update cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    /// Parse an ISO-8601 duration designator (`D`, `W`, `M`, `Y`).
    pub fn from_designator(designator: char) -> Option<Self> {
        match designator {
            'D' => Some(Self::Day),
            'W' => Some(Self::Week),
            'M' => Some(Self::Month),
            'Y' => Some(Self::Year),
            _ => None,
        }
    }
}

/// Declared update cadence of a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cadence {
    /// No scheduled update (`PT1S`, missing or unreadable code).
    Unscheduled,
    /// Expected to be updated every `n` units.
    Every { n: f64, unit: TimeUnit },
}

/// Parse a frequency code such as `P1M`, `P6M`, `P1Y` or `P0.5M`.
///
/// Anything that is not a `P<n><unit>` token is [`Cadence::Unscheduled`].
///
/// # Examples
/// ```
/// use open_data_inventory::dates::{parse_frequency, Cadence, TimeUnit};
///
/// assert_eq!(parse_frequency("P3W"), Cadence::Every { n: 3.0, unit: TimeUnit::Week });
/// assert_eq!(parse_frequency("PT1S"), Cadence::Unscheduled);
/// assert_eq!(parse_frequency("as_needed"), Cadence::Unscheduled);
/// ```
pub fn parse_frequency(code: &str) -> Cadence {
    let code = code.trim();
    if code == "PT1S" {
        return Cadence::Unscheduled;
    }
    let Some(body) = code.strip_prefix('P') else {
        return Cadence::Unscheduled;
    };
    let Some(designator) = body.chars().last() else {
        return Cadence::Unscheduled;
    };
    let Some(unit) = TimeUnit::from_designator(designator) else {
        return Cadence::Unscheduled;
    };

    match body[..body.len() - designator.len_utf8()].parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => Cadence::Every { n, unit },
        _ => Cadence::Unscheduled,
    }
}

/// Parse a CKAN timestamp.
///
/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS[.f]`, the same with a space
/// separator, and plain dates (midnight).
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// The date `n` units before `from`.
///
/// Days and weeks are fixed-length. Months walk back the calendar and clamp
/// the day to the target month's length; a fractional month subtracts
/// `30.43 * fraction` days, rounded half to even, after the whole months.
/// Years are `n * 12` months, rounded half to even.
///
/// # Errors
/// `InventoryError::InvalidDuration` for negative or non-finite `n`, or a
/// result outside the representable range.
pub fn date_ago(n: f64, unit: TimeUnit, from: NaiveDateTime) -> Result<NaiveDateTime> {
    if !n.is_finite() || n < 0.0 {
        return Err(InventoryError::InvalidDuration(format!(
            "n = {n}, n must be >= 0"
        )));
    }

    match unit {
        TimeUnit::Day => days_ago(n, from),
        TimeUnit::Week => days_ago(n * 7.0, from),
        TimeUnit::Month if n.fract() == 0.0 => months_ago(n as u32, from),
        TimeUnit::Month => {
            let base = months_ago(n.trunc() as u32, from)?;
            days_ago((DAYS_PER_MONTH * n.fract()).round_ties_even(), base)
        }
        TimeUnit::Year => months_ago((n * 12.0).round_ties_even() as u32, from),
    }
}

fn days_ago(days: f64, from: NaiveDateTime) -> Result<NaiveDateTime> {
    let millis = (days * 86_400_000.0).round() as i64;
    TimeDelta::try_milliseconds(millis)
        .and_then(|delta| from.checked_sub_signed(delta))
        .ok_or_else(|| InventoryError::InvalidDuration(format!("{days} days before {from}")))
}

fn months_ago(months: u32, from: NaiveDateTime) -> Result<NaiveDateTime> {
    let total = i64::from(from.year()) * 12 + i64::from(from.month0()) - i64::from(months);
    let year = i32::try_from(total.div_euclid(12))
        .map_err(|_| InventoryError::InvalidDuration(format!("{months} months before {from}")))?;
    let month = total.rem_euclid(12) as u32 + 1;
    let day = from.day().min(days_in_month(year, month));

    NaiveDate::from_ymd_opt(year, month, day)
        .map(|date| date.and_time(from.time()))
        .ok_or_else(|| InventoryError::InvalidDuration(format!("{months} months before {from}")))
}

/// Number of days in the given month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}
