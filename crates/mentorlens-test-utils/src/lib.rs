//! Testing utilities for the MentorLens workspace
//!
//! Scripted in-memory collaborators and row fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::NaiveDate;
use mentorlens_core::{
    CoordinatorId, FeedId, FetchError, NotificationSource, ProgramDirectory, RowSource, ScopeState,
};
use mentorlens_filter::{EffectiveRange, ProgramId, Scope, Timestamped};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{oneshot, watch, Notify};
use tokio::time::Instant;

/// Row fixture with an optional date and a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRow {
    pub date: Option<NaiveDate>,
    pub value: i64,
}

impl Timestamped for MetricRow {
    fn timestamp(&self) -> Option<NaiveDate> {
        self.date
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn metric(y: i32, m: u32, d: u32, value: i64) -> MetricRow {
    MetricRow {
        date: Some(date(y, m, d)),
        value,
    }
}

pub fn undated(value: i64) -> MetricRow {
    MetricRow { date: None, value }
}

/// Scope channel already settled on `scope`
pub fn settled_scope(scope: Scope) -> (watch::Sender<ScopeState>, watch::Receiver<ScopeState>) {
    watch::channel(ScopeState::Resolved(scope))
}

/// One recorded `fetch_rows` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCall {
    pub scope: Scope,
    pub range: Option<EffectiveRange>,
}

impl RowCall {
    pub fn is_filtered(&self) -> bool {
        self.range.is_some()
    }
}

#[derive(Default)]
struct Script {
    availability_errors: VecDeque<FetchError>,
    filtered_errors: VecDeque<FetchError>,
    availability_gates: VecDeque<oneshot::Receiver<()>>,
    filtered_gates: VecDeque<oneshot::Receiver<()>>,
}

/// Row source serving fixed rows per scope
///
/// Filtered calls return the scope's rows inside the requested range.
/// Calls can be held back with gates and failed with scripted errors.
pub struct ScriptedRowSource<R> {
    rows: Mutex<HashMap<Scope, Vec<R>>>,
    calls: Mutex<Vec<RowCall>>,
    script: Mutex<Script>,
    started: Notify,
}

impl<R: Clone> ScriptedRowSource<R> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(Script::default()),
            started: Notify::new(),
        }
    }

    /// Source serving `rows` for `scope`
    pub fn with_rows(scope: Scope, rows: Vec<R>) -> Self {
        let source = Self::new();
        source.set_rows(scope, rows);
        source
    }

    pub fn set_rows(&self, scope: Scope, rows: Vec<R>) {
        self.rows.lock().insert(scope, rows);
    }

    /// Hold the next ungated filtered call until the returned sender fires
    pub fn gate_filtered(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().filtered_gates.push_back(rx);
        tx
    }

    /// Hold the next ungated availability call until the returned sender fires
    pub fn gate_availability(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().availability_gates.push_back(rx);
        tx
    }

    pub fn fail_next_filtered(&self, err: FetchError) {
        self.script.lock().filtered_errors.push_back(err);
    }

    pub fn fail_next_availability(&self, err: FetchError) {
        self.script.lock().availability_errors.push_back(err);
    }

    pub fn calls(&self) -> Vec<RowCall> {
        self.calls.lock().clone()
    }

    pub fn filtered_calls(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.is_filtered()).count()
    }

    pub fn availability_calls(&self) -> usize {
        self.calls.lock().iter().filter(|c| !c.is_filtered()).count()
    }

    /// Wait until at least `n` calls have started
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let notified = self.started.notified();
            if self.calls.lock().len() >= n {
                return;
            }
            notified.await;
        }
    }
}

impl<R: Clone> Default for ScriptedRowSource<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R> RowSource<R> for ScriptedRowSource<R>
where
    R: Timestamped + Clone + Send + Sync,
{
    async fn fetch_rows(
        &self,
        scope: &Scope,
        range: Option<&EffectiveRange>,
    ) -> Result<Vec<R>, FetchError> {
        self.calls.lock().push(RowCall {
            scope: scope.clone(),
            range: range.cloned(),
        });
        self.started.notify_waiters();

        let (gate, error) = {
            let mut script = self.script.lock();
            if range.is_some() {
                (script.filtered_gates.pop_front(), script.filtered_errors.pop_front())
            } else {
                (script.availability_gates.pop_front(), script.availability_errors.pop_front())
            }
        };
        if let Some(gate) = gate {
            // a dropped sender releases the gate too
            let _ = gate.await;
        }
        if let Some(err) = error {
            return Err(err);
        }

        let rows = self.rows.lock().get(scope).cloned().unwrap_or_default();
        Ok(match range {
            Some(range) => range.filter_rows(rows),
            None => rows,
        })
    }
}

/// Program directory with fixed answers per coordinator
#[derive(Default)]
pub struct ScriptedDirectory {
    answers: Mutex<HashMap<CoordinatorId, Result<Option<ProgramId>, FetchError>>>,
    lookups: Mutex<usize>,
}

impl ScriptedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(self, coordinator: &str, program: &str) -> Self {
        self.answers
            .lock()
            .insert(CoordinatorId::new(coordinator), Ok(Some(ProgramId::new(program))));
        self
    }

    pub fn with_failure(self, coordinator: &str, err: FetchError) -> Self {
        self.answers.lock().insert(CoordinatorId::new(coordinator), Err(err));
        self
    }

    pub fn lookups(&self) -> usize {
        *self.lookups.lock()
    }
}

#[async_trait]
impl ProgramDirectory for ScriptedDirectory {
    async fn program_for(
        &self,
        coordinator: &CoordinatorId,
    ) -> Result<Option<ProgramId>, FetchError> {
        *self.lookups.lock() += 1;
        self.answers.lock().get(coordinator).cloned().unwrap_or(Ok(None))
    }
}

/// Notification source replaying a queue of responses
///
/// Once the queue is exhausted every poll returns no items.
pub struct ScriptedNotifications<N> {
    responses: Mutex<VecDeque<Result<Vec<N>, FetchError>>>,
    polls: Mutex<Vec<(FeedId, Instant)>>,
}

impl<N> ScriptedNotifications<N> {
    pub fn new(responses: Vec<Result<Vec<N>, FetchError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            polls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, response: Result<Vec<N>, FetchError>) {
        self.responses.lock().push_back(response);
    }

    pub fn poll_count(&self) -> usize {
        self.polls.lock().len()
    }

    /// Instants of every poll of `feed`
    pub fn poll_times(&self, feed: &FeedId) -> Vec<Instant> {
        self.polls
            .lock()
            .iter()
            .filter(|(f, _)| f == feed)
            .map(|(_, at)| *at)
            .collect()
    }
}

pub fn rate_limited() -> FetchError {
    FetchError::RateLimited { retry_after: None }
}

#[async_trait]
impl<N: Send> NotificationSource<N> for ScriptedNotifications<N> {
    async fn fetch_notifications(&self, feed: &FeedId) -> Result<Vec<N>, FetchError> {
        self.polls.lock().push((feed.clone(), Instant::now()));
        self.responses.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}
