//! Calendar quarters

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Calendar quarter with fixed month boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quarter {
    /// January to March
    Q1,
    /// April to June
    Q2,
    /// July to September
    Q3,
    /// October to December
    Q4,
}

impl Quarter {
    /// All quarters in calendar order
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    /// Quarter containing a 1-based month
    #[must_use]
    pub fn from_month(month: u32) -> Option<Self> {
        match month {
            1..=3 => Some(Self::Q1),
            4..=6 => Some(Self::Q2),
            7..=9 => Some(Self::Q3),
            10..=12 => Some(Self::Q4),
            _ => None,
        }
    }

    /// Quarter containing a date
    #[inline]
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        // chrono months are always 1..=12
        Self::from_month(date.month()).unwrap_or(Self::Q4)
    }

    /// Numeric suffix (1-4)
    #[inline]
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::Q1 => 1,
            Self::Q2 => 2,
            Self::Q3 => 3,
            Self::Q4 => 4,
        }
    }

    /// First month of the quarter
    #[inline]
    #[must_use]
    pub fn start_month(self) -> u32 {
        u32::from(self.number()) * 3 - 2
    }

    /// First day of the quarter in `year`
    #[must_use]
    pub fn start_date(self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.start_month(), 1)
    }

    /// First day after the quarter (Q4 rolls into January of the next year)
    #[must_use]
    pub fn end_exclusive(self, year: i32) -> Option<NaiveDate> {
        match self {
            Self::Q4 => NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1),
            _ => NaiveDate::from_ymd_opt(year, self.start_month() + 3, 1),
        }
    }

    /// Distance in quarters to another quarter of the same year
    #[inline]
    #[must_use]
    pub fn distance(self, other: Quarter) -> u8 {
        self.number().abs_diff(other.number())
    }
}

impl std::fmt::Display for Quarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{}", self.number())
    }
}

/// Error parsing a quarter label
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid quarter: {0:?} (expected Q1..Q4)")]
pub struct QuarterParseError(pub String);

impl FromStr for Quarter {
    type Err = QuarterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Q1" | "1" => Ok(Self::Q1),
            "Q2" | "2" => Ok(Self::Q2),
            "Q3" | "3" => Ok(Self::Q3),
            "Q4" | "4" => Ok(Self::Q4),
            _ => Err(QuarterParseError(s.to_string())),
        }
    }
}
