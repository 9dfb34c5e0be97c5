//! MentorLens Core - shared analytics widget engine
//!
//! The asynchronous half of the engine every dashboard widget runs on:
//! - Resolves whose data a widget may see before any query is issued
//! - Loads availability and keeps the period selection valid against it
//! - Sequences epoch-guarded fetches so stale responses never surface
//! - Polls notification feeds with capped back-off, paused while hidden
//!
//! # Example
//!
//! ```rust,ignore
//! use mentorlens_core::{FetchOrchestrator, Identity, ScopeResolver, WidgetSpec};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = ScopeResolver::new(directory);
//! let spec = WidgetSpec::new("sessions", "/api/sessions");
//! let widget = FetchOrchestrator::new(spec, source, resolver.subscribe());
//!
//! resolver.resolve(&Identity::coordinator("u-17")).await;
//! widget.refresh().await;
//! println!("{} rows", widget.state().rows.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod preference;
pub mod registry;
pub mod scope;
pub mod source;
pub mod types;

pub use cancel::{CancellationToken, Epoch, EpochClock, Ticket};
pub use config::{
    BackendConfig, EngineConfig, PollerConfig, RouteConfig, ENV_BASE_URL, ENV_TOKEN,
};
pub use error::{ConfigError, EngineError, FetchError};
pub use orchestrator::{FetchOrchestrator, FetchOutcome, WidgetState};
pub use poller::{AdaptivePoller, Backoff, PollEvent, PollHandle, PollState};
pub use preference::Preference;
pub use registry::PollerRegistry;
pub use scope::{resolve_scope, ScopeResolver, ScopeState};
pub use source::{
    adapt_rows, JsonRow, JsonRowAdapter, NotificationSource, ProgramDirectory, RowAdapter,
    RowSource, SerdeRowAdapter,
};
pub use types::{
    CoordinatorId, FeedId, Identity, SubscriptionId, ViewParseError, Visibility, WidgetSpec,
    WidgetView,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with MentorLens Core
    pub use crate::{
        EngineConfig, EngineError, FetchError, FetchOrchestrator, FetchOutcome, Identity, PollEvent,
        PollerRegistry, RowSource, ScopeResolver, Visibility, WidgetSpec, WidgetState,
    };
    pub use mentorlens_filter::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use mentorlens_filter::{EffectiveRange, PeriodMode, ProgramId, Scope};
    use std::sync::Arc;

    struct ProgramRows;

    #[async_trait]
    impl RowSource<NaiveDate> for ProgramRows {
        async fn fetch_rows(
            &self,
            scope: &Scope,
            range: Option<&EffectiveRange>,
        ) -> Result<Vec<NaiveDate>, FetchError> {
            let rows = match scope {
                Scope::Program { program_id: Some(id) } if id.as_str() == "p-1" => vec![
                    NaiveDate::from_ymd_opt(2024, 11, 2).unwrap(),
                    NaiveDate::from_ymd_opt(2025, 4, 9).unwrap(),
                ],
                _ => Vec::new(),
            };
            Ok(match range {
                Some(range) => range.filter_rows(rows),
                None => rows,
            })
        }
    }

    struct OneProgram;

    #[async_trait]
    impl ProgramDirectory for OneProgram {
        async fn program_for(
            &self,
            _coordinator: &CoordinatorId,
        ) -> Result<Option<ProgramId>, FetchError> {
            Ok(Some(ProgramId::new("p-1")))
        }
    }

    #[tokio::test]
    async fn coordinator_widget_full_flow() {
        let resolver = ScopeResolver::new(Arc::new(OneProgram));
        let rows: Arc<dyn RowSource<NaiveDate>> = Arc::new(ProgramRows);
        let spec = WidgetSpec::new("sessions", "/api/sessions");
        let widget = FetchOrchestrator::new(spec, rows, resolver.subscribe());

        resolver.resolve(&Identity::coordinator("u-17")).await;
        assert_eq!(widget.refresh().await, FetchOutcome::Applied);
        assert_eq!(widget.state().rows.len(), 2);
        assert_eq!(widget.availability().years(), vec![2024, 2025]);

        widget.set_mode(PeriodMode::Yearly).await.unwrap();
        let state = widget.state();
        assert_eq!(state.rows, vec![NaiveDate::from_ymd_opt(2025, 4, 9).unwrap()]);
        assert_eq!(state.range.unwrap().label, "Year 2025");
        assert_eq!(state.scope, Some(Scope::program("p-1")));
    }
}
