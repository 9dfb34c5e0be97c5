//! Row timestamps
//!
//! Backend rows carry their timestamp as a string in one of several shapes.
//! Anything that does not parse is reported as `None` and the row is left
//! out of availability instead of failing the batch.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// A row that can report the calendar date it belongs to
pub trait Timestamped {
    /// Calendar date of the row, `None` when missing or unparseable
    fn timestamp(&self) -> Option<NaiveDate>;
}

impl Timestamped for NaiveDate {
    fn timestamp(&self) -> Option<NaiveDate> {
        Some(*self)
    }
}

impl<T: Timestamped> Timestamped for &T {
    fn timestamp(&self) -> Option<NaiveDate> {
        (**self).timestamp()
    }
}

const DATETIME_FORMATS: [&str; 3] =
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a backend timestamp into a calendar date
///
/// Accepts `YYYY-MM-DD`, RFC 3339 date-times (the date is taken in the
/// timestamp's own offset) and naive `YYYY-MM-DD HH:MM:SS` forms.
#[must_use]
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}
