//! Range compilation
//!
//! Turns a period selection into a concrete half-open `[from, to)` date range.

use crate::availability::AvailabilityMap;
use crate::selection::{Period, PeriodSelection};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Label of an unbounded range
pub const OVERALL_LABEL: &str = "Overall";
/// Label of a caller-pinned range
pub const CUSTOM_LABEL: &str = "Custom";

/// Concrete date interval a widget queries with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectiveRange {
    #[serde(rename = "fromInclusive")]
    pub from_inclusive: Option<NaiveDate>,
    #[serde(rename = "toExclusive")]
    pub to_exclusive: Option<NaiveDate>,
    pub label: String,
}

impl EffectiveRange {
    /// Unbounded range
    #[must_use]
    pub fn overall() -> Self {
        Self {
            from_inclusive: None,
            to_exclusive: None,
            label: OVERALL_LABEL.to_string(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.from_inclusive.is_none() && self.to_exclusive.is_none()
    }

    /// Half-open membership test
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from_inclusive.map_or(true, |from| date >= from)
            && self.to_exclusive.map_or(true, |to| date < to)
    }

    /// Keep rows whose timestamp falls inside the range
    ///
    /// Undated rows only survive an unbounded range.
    #[must_use]
    pub fn filter_rows<R>(&self, rows: impl IntoIterator<Item = R>) -> Vec<R>
    where
        R: crate::Timestamped,
    {
        rows.into_iter()
            .filter(|row| match row.timestamp() {
                Some(date) => self.contains(date),
                None => self.is_unbounded(),
            })
            .collect()
    }

    /// `from` / `to` ISO date query parameters
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(from) = self.from_inclusive {
            pairs.push(("from", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = self.to_exclusive {
            pairs.push(("to", to.format("%Y-%m-%d").to_string()));
        }
        pairs
    }
}

impl std::fmt::Display for EffectiveRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.from_inclusive, self.to_exclusive) {
            (None, None) => f.write_str(&self.label),
            (from, to) => {
                let fmt =
                    |d: Option<NaiveDate>| d.map_or_else(|| "..".to_string(), |d| d.to_string());
                write!(f, "{} [{}, {})", self.label, fmt(from), fmt(to))
            }
        }
    }
}

/// Caller-pinned window that bypasses range compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomWindow {
    pub from_inclusive: Option<NaiveDate>,
    pub to_exclusive: Option<NaiveDate>,
}

impl CustomWindow {
    #[inline]
    #[must_use]
    pub fn new(from_inclusive: Option<NaiveDate>, to_exclusive: Option<NaiveDate>) -> Self {
        Self {
            from_inclusive,
            to_exclusive,
        }
    }

    /// The window as a range, verbatim
    #[must_use]
    pub fn to_range(&self) -> EffectiveRange {
        EffectiveRange {
            from_inclusive: self.from_inclusive,
            to_exclusive: self.to_exclusive,
            label: CUSTOM_LABEL.to_string(),
        }
    }
}

/// Range compilation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// Selection names a period with no data
    #[error("period {0} has no data")]
    UnavailablePeriod(String),

    /// Year outside the representable calendar
    #[error("year {0} is out of range")]
    YearOutOfRange(i32),
}

/// Compile a selection without consulting availability
pub fn compile_period(selection: &PeriodSelection) -> Result<EffectiveRange, RangeError> {
    match selection.period() {
        Period::Overall => Ok(EffectiveRange::overall()),
        Period::Yearly { year } => {
            let from = NaiveDate::from_ymd_opt(year, 1, 1).ok_or(RangeError::YearOutOfRange(year))?;
            let to = year
                .checked_add(1)
                .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1))
                .ok_or(RangeError::YearOutOfRange(year))?;
            Ok(EffectiveRange {
                from_inclusive: Some(from),
                to_exclusive: Some(to),
                label: format!("Year {year}"),
            })
        }
        Period::Quarterly { year, quarter } => {
            let from = quarter.start_date(year).ok_or(RangeError::YearOutOfRange(year))?;
            let to = quarter.end_exclusive(year).ok_or(RangeError::YearOutOfRange(year))?;
            Ok(EffectiveRange {
                from_inclusive: Some(from),
                to_exclusive: Some(to),
                label: format!("{year} {quarter}"),
            })
        }
    }
}

/// Compiles selections into ranges, or passes a pinned window through
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeCompiler {
    window: Option<CustomWindow>,
}

impl RangeCompiler {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiler locked to a caller window
    #[inline]
    #[must_use]
    pub fn locked(window: CustomWindow) -> Self {
        Self {
            window: Some(window),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.window.is_some()
    }

    #[inline]
    #[must_use]
    pub fn window(&self) -> Option<&CustomWindow> {
        self.window.as_ref()
    }

    /// Compile `selection`
    ///
    /// A pinned window is returned verbatim. Otherwise a selection naming a
    /// period missing from non-empty availability is refused, so an
    /// unrepaired selection can never reach the backend.
    pub fn compile(
        &self,
        selection: &PeriodSelection,
        availability: &AvailabilityMap,
    ) -> Result<EffectiveRange, RangeError> {
        if let Some(window) = &self.window {
            return Ok(window.to_range());
        }

        if !availability.is_empty() {
            match selection.period() {
                Period::Overall => {}
                Period::Yearly { year } if !availability.contains_year(year) => {
                    return Err(RangeError::UnavailablePeriod(format!("Year {year}")));
                }
                Period::Quarterly { year, quarter } if !availability.contains(year, quarter) => {
                    return Err(RangeError::UnavailablePeriod(format!("{year} {quarter}")));
                }
                _ => {}
            }
        }

        compile_period(selection)
    }
}
