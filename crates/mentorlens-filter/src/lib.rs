//! MentorLens filter model
//!
//! Pure, synchronous building blocks shared by every analytics widget:
//!
//! - [`Scope`]: whose data a widget may see
//! - [`AvailabilityIndex`] / [`AvailabilityMap`]: which years and quarters hold data
//! - [`PeriodSelector`]: the overall / quarterly / yearly selection state machine
//! - [`RangeCompiler`]: selection to half-open [`EffectiveRange`]
//! - [`DefaultsSnapshotTracker`]: scope defaults and dirty tracking
//!
//! # Example
//!
//! ```rust,ignore
//! use mentorlens_filter::{AvailabilityMap, PeriodMode, PeriodSelector, RangeCompiler};
//!
//! let availability = AvailabilityMap::from_rows(&rows);
//! let mut selector = PeriodSelector::new(2025);
//! selector.set_mode(PeriodMode::Quarterly, &availability)?;
//!
//! let range = RangeCompiler::new().compile(&selector.selection(), &availability)?;
//! println!("{} -> {:?}", range.label, range.query_pairs());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod availability;
mod defaults;
mod quarter;
mod range;
mod scope;
mod selection;
mod timestamp;

pub use availability::{AvailabilityIndex, AvailabilityMap};
pub use defaults::{is_dirty, reset, DefaultsSnapshot, DefaultsSnapshotTracker};
pub use quarter::{Quarter, QuarterParseError};
pub use range::{compile_period, CustomWindow, EffectiveRange, RangeCompiler, RangeError};
pub use scope::{EntityId, ProgramId, Scope};
pub use selection::{
    repair_selection, Period, PeriodMode, PeriodModeParseError, PeriodSelection, PeriodSelector,
    SelectionError,
};
pub use timestamp::{parse_calendar_date, Timestamped};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the filter model
    pub use crate::{
        AvailabilityMap, DefaultsSnapshotTracker, EffectiveRange, PeriodMode, PeriodSelection,
        PeriodSelector, Quarter, RangeCompiler, Scope, Timestamped,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
