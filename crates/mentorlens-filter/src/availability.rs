//! Period availability
//!
//! Builds the set of years and quarters that actually contain rows, so period
//! controls only ever offer choices that can return data.

use crate::quarter::Quarter;
use crate::timestamp::Timestamped;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Years and per-year quarters that hold at least one row
///
/// The year list is the key set of the quarter map, so a year can never be
/// listed without at least one quarter.
///
/// Serialized as `{"years": [..], "quartersByYear": {"2024": ["Q1", ..]}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "AvailabilityWire", from = "AvailabilityWire")]
pub struct AvailabilityMap {
    quarters_by_year: BTreeMap<i32, BTreeSet<Quarter>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityWire {
    #[serde(default)]
    years: Vec<i32>,
    #[serde(default)]
    quarters_by_year: BTreeMap<i32, BTreeSet<Quarter>>,
}

impl From<AvailabilityMap> for AvailabilityWire {
    fn from(map: AvailabilityMap) -> Self {
        Self {
            years: map.years(),
            quarters_by_year: map.quarters_by_year,
        }
    }
}

// years are re-derived from the quarter map; empty years are dropped
impl From<AvailabilityWire> for AvailabilityMap {
    fn from(wire: AvailabilityWire) -> Self {
        let mut quarters_by_year = wire.quarters_by_year;
        quarters_by_year.retain(|_, quarters| !quarters.is_empty());
        Self { quarters_by_year }
    }
}

impl AvailabilityMap {
    /// Availability with no periods
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Availability of a row batch (rows without a usable timestamp are skipped)
    #[must_use]
    pub fn from_rows<'a, R, I>(rows: I) -> Self
    where
        R: Timestamped + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        AvailabilityIndex::build(rows).into_map()
    }

    /// Availability of a set of dates
    #[must_use]
    pub fn from_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let mut map = Self::empty();
        for date in dates {
            map.record(date.year(), Quarter::of(date));
        }
        map
    }

    fn record(&mut self, year: i32, quarter: Quarter) {
        self.quarters_by_year.entry(year).or_default().insert(quarter);
    }

    /// Sorted distinct years
    #[must_use]
    pub fn years(&self) -> Vec<i32> {
        self.quarters_by_year.keys().copied().collect()
    }

    /// Quarters with data in `year`, in calendar order
    #[must_use]
    pub fn quarters(&self, year: i32) -> Vec<Quarter> {
        self.quarters_by_year
            .get(&year)
            .map(|qs| qs.iter().copied().collect())
            .unwrap_or_default()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quarters_by_year.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn contains_year(&self, year: i32) -> bool {
        self.quarters_by_year.contains_key(&year)
    }

    /// Whether `quarter` of `year` holds data
    #[inline]
    #[must_use]
    pub fn contains(&self, year: i32, quarter: Quarter) -> bool {
        self.quarters_by_year
            .get(&year)
            .is_some_and(|qs| qs.contains(&quarter))
    }

    #[inline]
    #[must_use]
    pub fn latest_year(&self) -> Option<i32> {
        self.quarters_by_year.keys().next_back().copied()
    }

    /// Earliest quarter with data in `year`
    #[inline]
    #[must_use]
    pub fn first_quarter(&self, year: i32) -> Option<Quarter> {
        self.quarters_by_year
            .get(&year)
            .and_then(|qs| qs.iter().next().copied())
    }

    /// Available quarter of `year` closest to `wanted`, earlier on ties
    #[must_use]
    pub fn nearest_quarter(&self, year: i32, wanted: Quarter) -> Option<Quarter> {
        self.quarters_by_year
            .get(&year)?
            .iter()
            .copied()
            .min_by_key(|q| (q.distance(wanted), q.number()))
    }

    /// Every `(year, quarter)` pair, ascending
    pub fn periods(&self) -> impl Iterator<Item = (i32, Quarter)> + '_ {
        self.quarters_by_year
            .iter()
            .flat_map(|(year, qs)| qs.iter().map(move |q| (*year, *q)))
    }

    /// Number of `(year, quarter)` pairs
    #[must_use]
    pub fn period_count(&self) -> usize {
        self.quarters_by_year.values().map(BTreeSet::len).sum()
    }
}

impl FromIterator<(i32, Quarter)> for AvailabilityMap {
    fn from_iter<T: IntoIterator<Item = (i32, Quarter)>>(iter: T) -> Self {
        let mut map = Self::empty();
        for (year, quarter) in iter {
            map.record(year, quarter);
        }
        map
    }
}

/// Result of indexing one unfiltered row batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityIndex {
    map: AvailabilityMap,
    indexed_rows: usize,
    skipped_rows: usize,
}

impl AvailabilityIndex {
    /// Index a row batch
    ///
    /// Pure: the same batch always yields the same map.
    #[must_use]
    pub fn build<'a, R, I>(rows: I) -> Self
    where
        R: Timestamped + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let mut index = Self::default();
        for row in rows {
            match row.timestamp() {
                Some(date) => {
                    index.map.record(date.year(), Quarter::of(date));
                    index.indexed_rows += 1;
                }
                None => index.skipped_rows += 1,
            }
        }
        index
    }

    #[inline]
    #[must_use]
    pub fn map(&self) -> &AvailabilityMap {
        &self.map
    }

    #[inline]
    #[must_use]
    pub fn into_map(self) -> AvailabilityMap {
        self.map
    }

    /// Rows that contributed a period
    #[inline]
    #[must_use]
    pub fn indexed_rows(&self) -> usize {
        self.indexed_rows
    }

    /// Rows left out for lack of a usable timestamp
    #[inline]
    #[must_use]
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }
}
