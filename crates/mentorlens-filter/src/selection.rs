//! Period selection state machine
//!
//! A widget's period filter is one of three states:
//!
//! ```text
//!            set_mode(Quarterly)                 set_mode(Yearly)
//!   Overall ─────────────────────▶ Quarterly(y,q) ◀──────────────▶ Yearly(y)
//!      ▲     (y = latest year,                       (q seeded to first
//!      │      q = first quarter of y)                  quarter of y)
//!      └──────────────────── set_mode(Overall) ─────────────────────┘
//! ```
//!
//! The selection keeps a year and quarter in every mode so switching modes
//! restores sensible values. Whenever availability changes the selection is
//! repaired so it never names a period without data.

use crate::availability::AvailabilityMap;
use crate::quarter::Quarter;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Period filter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodMode {
    /// No date bound
    #[default]
    Overall,
    /// One quarter of one year
    Quarterly,
    /// One calendar year
    Yearly,
}

impl PeriodMode {
    /// Whether the mode filters by year
    #[inline]
    #[must_use]
    pub fn requires_year(self) -> bool {
        !matches!(self, Self::Overall)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overall => "overall",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

impl std::fmt::Display for PeriodMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a period mode name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown period mode: {0:?} (expected overall, quarterly or yearly)")]
pub struct PeriodModeParseError(pub String);

impl FromStr for PeriodMode {
    type Err = PeriodModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overall" | "all" => Ok(Self::Overall),
            "quarterly" | "quarter" => Ok(Self::Quarterly),
            "yearly" | "year" => Ok(Self::Yearly),
            _ => Err(PeriodModeParseError(s.to_string())),
        }
    }
}

/// Live period selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodSelection {
    pub mode: PeriodMode,
    pub year: i32,
    pub quarter: Quarter,
}

impl PeriodSelection {
    #[inline]
    #[must_use]
    pub fn overall(year: i32) -> Self {
        Self {
            mode: PeriodMode::Overall,
            year,
            quarter: Quarter::Q1,
        }
    }

    #[inline]
    #[must_use]
    pub fn quarterly(year: i32, quarter: Quarter) -> Self {
        Self {
            mode: PeriodMode::Quarterly,
            year,
            quarter,
        }
    }

    #[inline]
    #[must_use]
    pub fn yearly(year: i32) -> Self {
        Self {
            mode: PeriodMode::Yearly,
            year,
            quarter: Quarter::Q1,
        }
    }

    /// State-machine view of the selection
    #[must_use]
    pub fn period(&self) -> Period {
        match self.mode {
            PeriodMode::Overall => Period::Overall,
            PeriodMode::Quarterly => Period::Quarterly {
                year: self.year,
                quarter: self.quarter,
            },
            PeriodMode::Yearly => Period::Yearly { year: self.year },
        }
    }
}

/// The period a selection currently denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Overall,
    Quarterly { year: i32, quarter: Quarter },
    Yearly { year: i32 },
}

/// Rejected selection transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// Controls are read-only because a custom window is pinned
    #[error("period selection is locked to a custom window")]
    Locked,

    /// Year has no data
    #[error("no data available for year {0}")]
    UnavailableYear(i32),

    /// Quarter has no data in the selected year
    #[error("no data available for {year} {quarter}")]
    UnavailableQuarter { year: i32, quarter: Quarter },
}

/// Repair a selection against availability
///
/// A missing year snaps to the latest available year; a missing quarter snaps
/// to the nearest available quarter of that year (earlier on ties). Empty
/// availability leaves the selection untouched. Valid selections are
/// returned unchanged, so repair is idempotent.
#[must_use]
pub fn repair_selection(
    selection: PeriodSelection,
    availability: &AvailabilityMap,
) -> PeriodSelection {
    let Some(latest) = availability.latest_year() else {
        return selection;
    };

    let mut repaired = selection;
    if !availability.contains_year(repaired.year) {
        repaired.year = latest;
    }
    if !availability.contains(repaired.year, repaired.quarter) {
        if let Some(q) = availability.nearest_quarter(repaired.year, repaired.quarter) {
            repaired.quarter = q;
        }
    }
    repaired
}

/// Period selector state machine
///
/// Created fresh per scope in `Overall` mode. Transitions happen only through
/// the methods below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodSelector {
    selection: PeriodSelection,
    locked: bool,
    touched: bool,
}

impl PeriodSelector {
    /// Fresh selector in `Overall` mode
    #[inline]
    #[must_use]
    pub fn new(initial_year: i32) -> Self {
        Self::from_selection(PeriodSelection::overall(initial_year))
    }

    /// Selector starting from an explicit selection
    #[inline]
    #[must_use]
    pub fn from_selection(selection: PeriodSelection) -> Self {
        Self {
            selection,
            locked: false,
            touched: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn selection(&self) -> PeriodSelection {
        self.selection
    }

    /// Whether controls are read-only
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Make controls read-only (a custom window is pinned)
    #[inline]
    pub fn lock(&mut self) {
        self.locked = true;
    }

    #[inline]
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Whether the user has driven any transition since creation
    #[inline]
    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Switch period mode
    ///
    /// Leaving `Overall` moves the year to the latest available year; entering
    /// `Quarterly` seeds the quarter with the first available quarter of the year.
    pub fn set_mode(
        &mut self,
        mode: PeriodMode,
        availability: &AvailabilityMap,
    ) -> Result<PeriodSelection, SelectionError> {
        self.ensure_unlocked()?;
        let previous = self.selection.mode;

        if previous == PeriodMode::Overall && mode.requires_year() {
            if let Some(latest) = availability.latest_year() {
                self.selection.year = latest;
            }
        }
        if mode == PeriodMode::Quarterly && previous != PeriodMode::Quarterly {
            if let Some(first) = availability.first_quarter(self.selection.year) {
                self.selection.quarter = first;
            }
        }

        self.selection.mode = mode;
        self.touched = true;
        Ok(self.selection)
    }

    /// Select a year
    ///
    /// The quarter moves to the first available quarter when the current one
    /// has no data in the new year.
    pub fn set_year(
        &mut self,
        year: i32,
        availability: &AvailabilityMap,
    ) -> Result<PeriodSelection, SelectionError> {
        self.ensure_unlocked()?;
        if !availability.is_empty() && !availability.contains_year(year) {
            return Err(SelectionError::UnavailableYear(year));
        }

        self.selection.year = year;
        if !availability.contains(year, self.selection.quarter) {
            if let Some(first) = availability.first_quarter(year) {
                self.selection.quarter = first;
            }
        }
        self.touched = true;
        Ok(self.selection)
    }

    /// Select a quarter of the current year
    pub fn set_quarter(
        &mut self,
        quarter: Quarter,
        availability: &AvailabilityMap,
    ) -> Result<PeriodSelection, SelectionError> {
        self.ensure_unlocked()?;
        let year = self.selection.year;
        if availability.contains_year(year) && !availability.contains(year, quarter) {
            return Err(SelectionError::UnavailableQuarter { year, quarter });
        }

        self.selection.quarter = quarter;
        self.touched = true;
        Ok(self.selection)
    }

    /// Apply a whole selection (used when restoring defaults)
    pub fn apply(&mut self, selection: PeriodSelection) -> Result<PeriodSelection, SelectionError> {
        self.ensure_unlocked()?;
        self.selection = selection;
        self.touched = true;
        Ok(self.selection)
    }

    /// Seed an untouched selector from scope defaults
    ///
    /// Returns `false` when the user already changed the selection.
    pub fn seed(&mut self, selection: PeriodSelection) -> bool {
        if self.touched {
            return false;
        }
        self.selection = selection;
        true
    }

    /// Repair against fresh availability, returning whether anything changed
    ///
    /// Runs regardless of the lock: a locked selector is ignored by range
    /// compilation but must still never name an impossible period.
    pub fn repair(&mut self, availability: &AvailabilityMap) -> bool {
        let repaired = repair_selection(self.selection, availability);
        let changed = repaired != self.selection;
        self.selection = repaired;
        changed
    }

    fn ensure_unlocked(&self) -> Result<(), SelectionError> {
        if self.locked {
            Err(SelectionError::Locked)
        } else {
            Ok(())
        }
    }
}
