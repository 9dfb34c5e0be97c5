//! Fetch orchestration
//!
//! One [`FetchOrchestrator`] drives one widget. Each cycle:
//!
//! 1. waits for the scope to settle
//! 2. loads availability with an unfiltered, epoch-guarded fetch
//! 3. repairs the selection against it (and seeds scope defaults)
//! 4. compiles the effective range and runs the filtered, epoch-guarded fetch
//! 5. publishes rows or an inline error
//!
//! Every cycle carries a [`Ticket`]. Only the most recently issued ticket may
//! touch published state, so overlapping cycles resolving out of order never
//! interleave.

use crate::cancel::{CancellationToken, EpochClock, Ticket};
use crate::error::EngineError;
use crate::preference::Preference;
use crate::scope::ScopeState;
use crate::source::RowSource;
use crate::types::{WidgetSpec, WidgetView};
use chrono::Datelike;
use mentorlens_filter::{
    AvailabilityIndex, AvailabilityMap, CustomWindow, DefaultsSnapshot, DefaultsSnapshotTracker,
    EffectiveRange, PeriodMode, PeriodSelection, PeriodSelector, Quarter, RangeCompiler, Scope,
    Timestamped,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Visible state of a widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetState<R> {
    pub rows: Vec<R>,
    pub loading: bool,
    /// Short inline message of the last failed fetch
    pub error: Option<String>,
    /// Range the rows were fetched with
    pub range: Option<EffectiveRange>,
    /// Scope the rows belong to
    pub scope: Option<Scope>,
}

impl<R> Default for WidgetState<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            loading: false,
            error: None,
            range: None,
            scope: None,
        }
    }
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchOutcome {
    /// Result reached published state
    Applied,
    /// A newer cycle superseded this one; its result was dropped silently
    Discarded,
    /// The widget was torn down
    Cancelled,
}

type CycleKey = (Scope, PeriodSelection);

struct EngineState {
    scope: Option<Scope>,
    availability: AvailabilityMap,
    availability_loaded: bool,
    selector: PeriodSelector,
    defaults: DefaultsSnapshotTracker,
    compiler: RangeCompiler,
    fallback_year: i32,
    key: Option<CycleKey>,
}

impl EngineState {
    fn new(fallback_year: i32) -> Self {
        Self {
            scope: None,
            availability: AvailabilityMap::empty(),
            availability_loaded: false,
            selector: PeriodSelector::new(fallback_year),
            defaults: DefaultsSnapshotTracker::new(fallback_year),
            compiler: RangeCompiler::new(),
            fallback_year,
            key: None,
        }
    }

    /// Forget everything tied to the previous scope
    fn enter_scope(&mut self, scope: Scope) {
        self.scope = Some(scope);
        self.availability = AvailabilityMap::empty();
        self.availability_loaded = false;
        self.selector = PeriodSelector::new(self.fallback_year);
        if self.compiler.is_locked() {
            self.selector.lock();
        }
        self.defaults.invalidate();
        self.key = None;
    }
}

struct Shared<R> {
    spec: WidgetSpec,
    source: Arc<dyn RowSource<R>>,
    scope_rx: watch::Receiver<ScopeState>,
    state: Mutex<EngineState>,
    clock: Arc<EpochClock>,
    token: CancellationToken,
    published: watch::Sender<WidgetState<R>>,
    view: Mutex<Arc<Preference<WidgetView>>>,
}

/// Race-safe fetch engine for one widget
pub struct FetchOrchestrator<R> {
    shared: Arc<Shared<R>>,
}

impl<R> Clone for FetchOrchestrator<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R> std::fmt::Debug for FetchOrchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("widget", &self.shared.spec.name)
            .field("epoch", &self.shared.clock.latest())
            .field("cancelled", &self.shared.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<R> FetchOrchestrator<R>
where
    R: Timestamped + Clone + Send + Sync + 'static,
{
    /// Create an orchestrator fed by `source`, following `scope_rx`
    pub fn new(
        spec: WidgetSpec,
        source: Arc<dyn RowSource<R>>,
        scope_rx: watch::Receiver<ScopeState>,
    ) -> Self {
        let (published, _) = watch::channel(WidgetState::default());
        let fallback_year = chrono::Utc::now().year();
        Self {
            shared: Arc::new(Shared {
                spec,
                source,
                scope_rx,
                state: Mutex::new(EngineState::new(fallback_year)),
                clock: Arc::new(EpochClock::new()),
                token: CancellationToken::new(),
                published,
                view: Mutex::new(Arc::new(Preference::default())),
            }),
        }
    }

    /// Year used before any availability is known
    #[must_use]
    pub fn with_fallback_year(self, year: i32) -> Self {
        {
            let mut state = self.shared.state.lock();
            state.fallback_year = year;
            state.defaults = DefaultsSnapshotTracker::new(year);
            if !state.selector.is_touched() {
                state.selector.seed(PeriodSelection::overall(year));
            }
        }
        self
    }

    /// Pin a caller window; period controls become read-only
    #[must_use]
    pub fn with_locked_window(self, window: CustomWindow) -> Self {
        {
            let mut state = self.shared.state.lock();
            state.compiler = RangeCompiler::locked(window);
            state.selector.lock();
        }
        self
    }

    /// Use an injected view preference
    #[must_use]
    pub fn with_view_preference(self, view: Preference<WidgetView>) -> Self {
        *self.shared.view.lock() = Arc::new(view);
        self
    }

    #[must_use]
    pub fn spec(&self) -> &WidgetSpec {
        &self.shared.spec
    }

    /// Observe published state
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WidgetState<R>> {
        self.shared.published.subscribe()
    }

    /// Copy of the published state
    #[must_use]
    pub fn state(&self) -> WidgetState<R> {
        self.shared.published.borrow().clone()
    }

    #[must_use]
    pub fn selection(&self) -> PeriodSelection {
        self.shared.state.lock().selector.selection()
    }

    /// Availability of the current scope
    #[must_use]
    pub fn availability(&self) -> AvailabilityMap {
        self.shared.state.lock().availability.clone()
    }

    /// Defaults captured for the current scope
    #[must_use]
    pub fn defaults(&self) -> Option<DefaultsSnapshot> {
        self.shared.state.lock().defaults.snapshot().cloned()
    }

    /// Whether the selection differs from the scope defaults
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        let state = self.shared.state.lock();
        state.defaults.is_dirty(&state.selector.selection())
    }

    /// Whether period controls are read-only
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.shared.state.lock().selector.is_locked()
    }

    #[must_use]
    pub fn view(&self) -> WidgetView {
        self.preference().get()
    }

    /// Switch the view, persisting it through the injected preference
    ///
    /// The persistence callback runs without any widget lock held, so it may
    /// read the widget back.
    pub fn set_view(&self, view: WidgetView) -> bool {
        self.preference().set(view)
    }

    fn preference(&self) -> Arc<Preference<WidgetView>> {
        Arc::clone(&self.shared.view.lock())
    }

    /// Reload availability and data
    pub async fn refresh(&self) -> FetchOutcome {
        self.run_cycle(true).await
    }

    /// Change the period mode and refetch
    pub async fn set_mode(&self, mode: PeriodMode) -> Result<FetchOutcome, EngineError> {
        self.transition(|selector, availability| selector.set_mode(mode, availability))?;
        Ok(self.run_cycle(false).await)
    }

    /// Change the year and refetch
    pub async fn set_year(&self, year: i32) -> Result<FetchOutcome, EngineError> {
        self.transition(|selector, availability| selector.set_year(year, availability))?;
        Ok(self.run_cycle(false).await)
    }

    /// Change the quarter and refetch
    pub async fn set_quarter(&self, quarter: Quarter) -> Result<FetchOutcome, EngineError> {
        self.transition(|selector, availability| selector.set_quarter(quarter, availability))?;
        Ok(self.run_cycle(false).await)
    }

    /// Restore the scope defaults and refetch
    ///
    /// Does nothing before defaults were captured.
    pub async fn clear_filters(&self) -> Result<FetchOutcome, EngineError> {
        let restored = {
            let mut state = self.shared.state.lock();
            match state.defaults.reset() {
                Some(selection) => {
                    state.selector.apply(selection)?;
                    true
                }
                None => false,
            }
        };
        if !restored {
            return Ok(FetchOutcome::Applied);
        }
        Ok(self.run_cycle(false).await)
    }

    /// Stop the widget; pending results are dropped silently
    pub fn teardown(&self) {
        tracing::info!(widget = %self.shared.spec.name, "widget torn down");
        self.shared.token.cancel();
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// Run a cycle now and again whenever the scope settles to a new value
    pub fn spawn_scope_follower(&self) -> JoinHandle<()> {
        let this = self.clone();
        let mut rx = self.shared.scope_rx.clone();
        tokio::spawn(async move {
            let mut seen: Option<Scope> = None;
            loop {
                let settled = rx.borrow_and_update().scope().cloned();
                if let Some(scope) = settled {
                    if seen.as_ref() != Some(&scope) {
                        seen = Some(scope);
                        let cycle = this.clone();
                        tokio::spawn(async move { cycle.refresh().await });
                    }
                }

                let changed = tokio::select! {
                    () = this.shared.token.cancelled() => break,
                    changed = rx.changed() => changed,
                };
                if changed.is_err() {
                    break;
                }
            }
            tracing::debug!(widget = %this.shared.spec.name, "scope follower stopped");
        })
    }

    fn transition<F>(&self, apply: F) -> Result<PeriodSelection, EngineError>
    where
        F: FnOnce(
            &mut PeriodSelector,
            &AvailabilityMap,
        ) -> Result<PeriodSelection, mentorlens_filter::SelectionError>,
    {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let selection = apply(&mut state.selector, &state.availability)?;
        tracing::debug!(
            widget = %self.shared.spec.name,
            mode = %selection.mode,
            year = selection.year,
            quarter = %selection.quarter,
            "selection changed"
        );
        Ok(selection)
    }

    async fn run_cycle(&self, reload_availability: bool) -> FetchOutcome {
        let shared = &self.shared;
        if shared.token.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        let ticket = Ticket::issue(&shared.clock, &shared.token);
        let widget = shared.spec.name.as_str();
        tracing::debug!(widget, epoch = %ticket.epoch(), "cycle started");
        if reload_availability {
            // stays pending until some cycle loads availability, even if this one is overtaken
            shared.state.lock().availability_loaded = false;
        }
        shared.published.send_modify(|s| s.loading = true);

        let Some(scope) = self.settled_scope(&ticket).await else {
            return FetchOutcome::Cancelled;
        };
        if !ticket.is_relevant() {
            return self.discard(&ticket);
        }

        let fetch_availability = {
            let mut state = shared.state.lock();
            if state.scope.as_ref() != Some(&scope) {
                tracing::info!(widget, scope = %scope, "scope changed; resetting selection");
                state.enter_scope(scope.clone());
            }
            if scope.yields_empty() {
                state.availability = AvailabilityMap::empty();
                state.availability_loaded = true;
            }
            !state.availability_loaded
        };

        if fetch_availability {
            let result = shared.source.fetch_rows(&scope, None).await;
            if !ticket.is_relevant() {
                return self.discard(&ticket);
            }
            let loaded = match result {
                Ok(rows) => {
                    let index = AvailabilityIndex::build(&rows);
                    tracing::debug!(
                        widget,
                        indexed = index.indexed_rows(),
                        skipped = index.skipped_rows(),
                        periods = index.map().period_count(),
                        "availability built"
                    );
                    Some(index.into_map())
                }
                Err(e) => {
                    let err = EngineError::AvailabilityFetch(e);
                    tracing::warn!(widget, error = %err, "treating availability as empty");
                    None
                }
            };
            // a failed load is retried by the next cycle
            let mut state = shared.state.lock();
            state.availability_loaded = loaded.is_some();
            state.availability = loaded.unwrap_or_default();
        }

        let (compiled, key) = {
            let mut guard = shared.state.lock();
            let state = &mut *guard;

            // defaults are only captured from availability that actually loaded
            let captured = if state.availability_loaded {
                state
                    .defaults
                    .observe(&scope, &state.availability)
                    .map(DefaultsSnapshot::selection)
            } else {
                None
            };
            if let Some(defaults) = captured {
                if state.selector.seed(defaults) {
                    tracing::debug!(
                        widget,
                        mode = %defaults.mode,
                        year = defaults.year,
                        "selection seeded from defaults"
                    );
                }
            }
            if state.selector.repair(&state.availability) {
                let repaired = state.selector.selection();
                tracing::debug!(
                    widget,
                    year = repaired.year,
                    quarter = %repaired.quarter,
                    "selection repaired"
                );
            }

            let selection = state.selector.selection();
            let key = (scope.clone(), selection);
            state.key = Some(key.clone());
            (state.compiler.compile(&selection, &state.availability), key)
        };

        let range = match compiled {
            Ok(range) => range,
            Err(e) => {
                let err = EngineError::Range(e);
                tracing::warn!(widget, error = %err, "range compilation failed");
                return self.publish(&ticket, &key, None, Err(err));
            }
        };

        if scope.yields_empty() {
            tracing::debug!(widget, "empty program scope; skipping fetch");
            return self.publish(&ticket, &key, Some(range), Ok(Vec::new()));
        }

        let result = shared.source.fetch_rows(&scope, Some(&range)).await;
        match result {
            Ok(rows) => {
                tracing::debug!(
                    widget,
                    epoch = %ticket.epoch(),
                    rows = rows.len(),
                    range = %range,
                    "rows fetched"
                );
                self.publish(&ticket, &key, Some(range), Ok(rows))
            }
            Err(e) => {
                let err = EngineError::FilteredFetch(e);
                if ticket.is_relevant() {
                    tracing::warn!(widget, error = %err, "filtered fetch failed");
                }
                self.publish(&ticket, &key, Some(range), Err(err))
            }
        }
    }

    async fn settled_scope(&self, ticket: &Ticket) -> Option<Scope> {
        let mut rx = self.shared.scope_rx.clone();
        loop {
            let current = rx.borrow_and_update().scope().cloned();
            if current.is_some() {
                return current;
            }
            let changed = tokio::select! {
                () = ticket.token().cancelled() => return None,
                changed = rx.changed() => changed,
            };
            if changed.is_err() {
                tracing::warn!(
                    widget = %self.shared.spec.name,
                    "scope source closed before resolving"
                );
                return None;
            }
        }
    }

    fn key_matches(&self, key: &CycleKey) -> bool {
        self.shared.state.lock().key.as_ref() == Some(key)
    }

    fn discard(&self, ticket: &Ticket) -> FetchOutcome {
        if ticket.is_cancelled() {
            tracing::debug!(
                widget = %self.shared.spec.name,
                epoch = %ticket.epoch(),
                "widget gone; dropping result"
            );
            FetchOutcome::Cancelled
        } else {
            tracing::debug!(
                widget = %self.shared.spec.name,
                epoch = %ticket.epoch(),
                "stale result discarded"
            );
            FetchOutcome::Discarded
        }
    }

    /// Publish a cycle result if its ticket and key are still current
    ///
    /// The check runs under the channel's write lock, so a result can never
    /// land on top of a newer cycle's.
    fn publish(
        &self,
        ticket: &Ticket,
        key: &CycleKey,
        range: Option<EffectiveRange>,
        result: Result<Vec<R>, EngineError>,
    ) -> FetchOutcome {
        let (rows, error) = match result {
            Ok(rows) => (rows, None),
            Err(err) => (Vec::new(), Some(err.inline_message())),
        };
        let next = WidgetState {
            rows,
            loading: false,
            error,
            range,
            scope: Some(key.0.clone()),
        };
        let applied = self.shared.published.send_if_modified(|current| {
            if !ticket.is_relevant() || !self.key_matches(key) {
                return false;
            }
            *current = next;
            true
        });
        if applied {
            FetchOutcome::Applied
        } else {
            self.discard(ticket)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct DateSource {
        dates: Vec<NaiveDate>,
        fail_filtered: bool,
        calls: Mutex<Vec<Option<EffectiveRange>>>,
    }

    impl DateSource {
        fn new(dates: Vec<NaiveDate>) -> Self {
            Self {
                dates,
                fail_filtered: false,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RowSource<NaiveDate> for DateSource {
        async fn fetch_rows(
            &self,
            _scope: &Scope,
            range: Option<&EffectiveRange>,
        ) -> Result<Vec<NaiveDate>, FetchError> {
            self.calls.lock().push(range.cloned());
            match range {
                Some(_) if self.fail_filtered => Err(FetchError::from_status(500, "boom", None)),
                Some(range) => Ok(range.filter_rows(self.dates.iter().copied())),
                None => Ok(self.dates.clone()),
            }
        }
    }

    fn resolved(scope: Scope) -> watch::Receiver<ScopeState> {
        watch::channel(ScopeState::Resolved(scope)).1
    }

    fn orchestrator(source: DateSource) -> (FetchOrchestrator<NaiveDate>, Arc<DateSource>) {
        let source = Arc::new(source);
        let dyn_source: Arc<dyn RowSource<NaiveDate>> = source.clone();
        let spec = WidgetSpec::new("test", "/rows");
        let orch = FetchOrchestrator::new(spec, dyn_source, resolved(Scope::Unrestricted))
            .with_fallback_year(2020);
        (orch, source)
    }

    #[tokio::test]
    async fn first_cycle_seeds_defaults_and_fetches_overall() {
        let (orch, source) = orchestrator(DateSource::new(vec![d(2024, 5, 1), d(2025, 2, 1)]));

        assert_eq!(orch.refresh().await, FetchOutcome::Applied);

        let state = orch.state();
        assert_eq!(state.rows.len(), 2);
        assert!(!state.loading);
        assert_eq!(state.range, Some(EffectiveRange::overall()));
        assert_eq!(orch.selection(), PeriodSelection::overall(2025));
        assert!(!orch.is_dirty());
        assert_eq!(source.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn selection_change_reuses_availability() {
        let (orch, source) = orchestrator(DateSource::new(vec![d(2024, 5, 1), d(2025, 2, 1)]));
        orch.refresh().await;

        orch.set_mode(PeriodMode::Quarterly).await.unwrap();
        let state = orch.state();
        assert_eq!(state.rows, vec![d(2025, 2, 1)]);
        assert_eq!(state.range.unwrap().label, "2025 Q1");
        assert!(orch.is_dirty());

        // availability + filtered, then one filtered fetch
        assert_eq!(source.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn clear_filters_restores_defaults() {
        let (orch, _) = orchestrator(DateSource::new(vec![d(2024, 5, 1), d(2025, 2, 1)]));
        orch.refresh().await;
        orch.set_mode(PeriodMode::Yearly).await.unwrap();
        orch.set_year(2024).await.unwrap();
        assert!(orch.is_dirty());

        orch.clear_filters().await.unwrap();
        assert!(!orch.is_dirty());
        assert_eq!(orch.state().rows.len(), 2);
    }

    #[tokio::test]
    async fn unavailable_year_is_refused() {
        let (orch, _) = orchestrator(DateSource::new(vec![d(2025, 2, 1)]));
        orch.refresh().await;
        orch.set_mode(PeriodMode::Yearly).await.unwrap();

        let err = orch.set_year(1999).await.unwrap_err();
        assert!(err.is_user_visible());
        assert_eq!(orch.selection().year, 2025);
    }

    #[tokio::test]
    async fn filtered_failure_is_inline_error() {
        let mut source = DateSource::new(vec![d(2025, 2, 1)]);
        source.fail_filtered = true;
        let (orch, _) = orchestrator(source);

        assert_eq!(orch.refresh().await, FetchOutcome::Applied);
        let state = orch.state();
        assert!(state.rows.is_empty());
        assert_eq!(state.error.as_deref(), Some("Failed to load data (HTTP 500)"));
    }

    #[tokio::test]
    async fn locked_window_bypasses_selection() {
        let (orch, source) = orchestrator(DateSource::new(vec![d(2025, 2, 1), d(2025, 8, 1)]));
        let window = CustomWindow::new(Some(d(2025, 1, 1)), Some(d(2025, 3, 1)));
        let orch = orch.with_locked_window(window);
        orch.refresh().await;

        assert!(orch.is_locked());
        assert!(orch.set_mode(PeriodMode::Yearly).await.is_err());
        let state = orch.state();
        assert_eq!(state.rows, vec![d(2025, 2, 1)]);
        assert_eq!(state.range.unwrap().label, "Custom");
        assert_eq!(source.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn empty_program_scope_skips_fetching() {
        let source = Arc::new(DateSource::new(vec![d(2025, 2, 1)]));
        let dyn_source: Arc<dyn RowSource<NaiveDate>> = source.clone();
        let spec = WidgetSpec::new("test", "/rows");
        let orch = FetchOrchestrator::new(spec, dyn_source, resolved(Scope::no_program()));

        assert_eq!(orch.refresh().await, FetchOutcome::Applied);
        let state = orch.state();
        assert!(state.rows.is_empty());
        assert_eq!(state.error, None);
        assert!(source.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn torn_down_widget_does_nothing() {
        let (orch, source) = orchestrator(DateSource::new(vec![d(2025, 2, 1)]));
        orch.teardown();
        assert_eq!(orch.refresh().await, FetchOutcome::Cancelled);
        assert!(source.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn view_preference_persists_changes() {
        let saved = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&saved);
        let (orch, _) = orchestrator(DateSource::new(Vec::new()));
        let preference = Preference::new(WidgetView::Table, move |v: &WidgetView| {
            *sink.lock() = Some(*v);
        });
        let orch = orch.with_view_preference(preference);

        assert_eq!(orch.view(), WidgetView::Table);
        assert!(orch.set_view(WidgetView::Chart));
        assert_eq!(*saved.lock(), Some(WidgetView::Chart));
    }

    #[tokio::test]
    async fn superseded_ticket_cannot_publish() {
        let (orch, _) = orchestrator(DateSource::new(vec![d(2025, 2, 1)]));
        orch.refresh().await;
        let key = orch.shared.state.lock().key.clone().unwrap();
        let before = orch.state();

        let stale = Ticket::issue(&orch.shared.clock, &orch.shared.token);
        let current = Ticket::issue(&orch.shared.clock, &orch.shared.token);
        let outcome = orch.publish(&stale, &key, None, Ok(vec![d(1999, 1, 1)]));
        assert_eq!(outcome, FetchOutcome::Discarded);
        assert_eq!(orch.state(), before);

        let outcome = orch.publish(&current, &key, None, Ok(vec![d(1999, 1, 1)]));
        assert_eq!(outcome, FetchOutcome::Applied);
        assert_eq!(orch.state().rows, vec![d(1999, 1, 1)]);
    }

    #[tokio::test]
    async fn view_callback_may_read_the_widget() {
        let slot: Arc<Mutex<Option<FetchOrchestrator<NaiveDate>>>> = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (reader, sink) = (Arc::clone(&slot), Arc::clone(&seen));

        let (orch, _) = orchestrator(DateSource::new(vec![d(2025, 2, 1)]));
        let preference = Preference::new(WidgetView::Chart, move |_: &WidgetView| {
            if let Some(widget) = reader.lock().as_ref() {
                sink.lock().push((widget.view(), widget.selection().mode, widget.is_dirty()));
            }
        });
        let orch = orch.with_view_preference(preference);
        *slot.lock() = Some(orch.clone());
        orch.refresh().await;

        assert!(orch.set_view(WidgetView::Table));
        assert_eq!(*seen.lock(), vec![(WidgetView::Table, PeriodMode::Overall, false)]);
        slot.lock().take();
    }
}
