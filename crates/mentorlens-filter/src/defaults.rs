//! Scope defaults and dirty tracking
//!
//! The "no filter applied" selection of a scope is captured once, the first
//! time availability finishes loading for that scope. It backs the
//! "Clear Filter" control: the live selection is dirty when it differs.

use crate::availability::AvailabilityMap;
use crate::quarter::Quarter;
use crate::scope::Scope;
use crate::selection::PeriodSelection;

/// Default selection captured for one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultsSnapshot {
    scope: Scope,
    selection: PeriodSelection,
}

impl DefaultsSnapshot {
    /// Capture the natural default of a scope
    ///
    /// `Overall`, latest available year and that year's first quarter.
    /// Without availability the fallback year and `Q1` are used.
    #[must_use]
    pub fn capture(scope: &Scope, availability: &AvailabilityMap, fallback_year: i32) -> Self {
        let year = availability.latest_year().unwrap_or(fallback_year);
        let quarter = availability.first_quarter(year).unwrap_or(Quarter::Q1);
        Self {
            scope: scope.clone(),
            selection: PeriodSelection {
                quarter,
                ..PeriodSelection::overall(year)
            },
        }
    }

    #[inline]
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[inline]
    #[must_use]
    pub fn selection(&self) -> PeriodSelection {
        self.selection
    }
}

/// True if mode, year or quarter differ from the snapshot
#[inline]
#[must_use]
pub fn is_dirty(current: &PeriodSelection, snapshot: &DefaultsSnapshot) -> bool {
    current.mode != snapshot.selection.mode
        || current.year != snapshot.selection.year
        || current.quarter != snapshot.selection.quarter
}

/// Selection to apply back onto the live selection
#[inline]
#[must_use]
pub fn reset(snapshot: &DefaultsSnapshot) -> PeriodSelection {
    snapshot.selection
}

/// Holds at most one snapshot, bound to the scope it was captured for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultsSnapshotTracker {
    snapshot: Option<DefaultsSnapshot>,
    fallback_year: i32,
}

impl DefaultsSnapshotTracker {
    #[inline]
    #[must_use]
    pub fn new(fallback_year: i32) -> Self {
        Self {
            snapshot: None,
            fallback_year,
        }
    }

    /// Current snapshot, if captured
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Option<&DefaultsSnapshot> {
        self.snapshot.as_ref()
    }

    /// Capture unconditionally, replacing any previous snapshot
    pub fn capture(&mut self, scope: &Scope, availability: &AvailabilityMap) -> &DefaultsSnapshot {
        self.snapshot
            .insert(DefaultsSnapshot::capture(scope, availability, self.fallback_year))
    }

    /// Capture only if no snapshot exists for `scope`
    ///
    /// A snapshot for another scope is discarded first. Returns the fresh
    /// snapshot when one was captured, `None` when the existing one was kept.
    pub fn observe(
        &mut self,
        scope: &Scope,
        availability: &AvailabilityMap,
    ) -> Option<&DefaultsSnapshot> {
        if self.snapshot.as_ref().is_some_and(|s| s.scope() == scope) {
            return None;
        }
        self.invalidate();
        Some(self.capture(scope, availability))
    }

    /// Drop the snapshot (scope identity changed)
    #[inline]
    pub fn invalidate(&mut self) {
        self.snapshot = None;
    }

    /// Dirty state of `current`; never dirty before a snapshot exists
    #[must_use]
    pub fn is_dirty(&self, current: &PeriodSelection) -> bool {
        self.snapshot.as_ref().is_some_and(|s| is_dirty(current, s))
    }

    /// Snapshot selection to restore, if captured
    #[must_use]
    pub fn reset(&self) -> Option<PeriodSelection> {
        self.snapshot.as_ref().map(reset)
    }
}
