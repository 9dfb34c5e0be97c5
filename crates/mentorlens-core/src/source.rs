//! Collaborator interfaces
//!
//! The engine talks to the backend only through these traits. Each widget
//! plugs in a row source for its endpoint and a [`RowAdapter`] for its row
//! shape; everything else is shared.

use crate::error::FetchError;
use crate::types::{CoordinatorId, FeedId};
use async_trait::async_trait;
use chrono::NaiveDate;
use mentorlens_filter::{parse_calendar_date, EffectiveRange, ProgramId, Scope, Timestamped};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::marker::PhantomData;

/// Source of timestamped rows for one widget endpoint
#[async_trait]
pub trait RowSource<R>: Send + Sync {
    /// Fetch rows in `scope`, restricted to `range` when given
    ///
    /// `None` is the unfiltered pull used to build availability.
    async fn fetch_rows(
        &self,
        scope: &Scope,
        range: Option<&EffectiveRange>,
    ) -> Result<Vec<R>, FetchError>;
}

/// Lookup of a coordinator's program
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgramDirectory: Send + Sync {
    /// First program of the coordinator; `Ok(None)` when they have none
    async fn program_for(
        &self,
        coordinator: &CoordinatorId,
    ) -> Result<Option<ProgramId>, FetchError>;
}

/// Source of notification items for a feed
#[async_trait]
pub trait NotificationSource<N>: Send + Sync {
    async fn fetch_notifications(&self, feed: &FeedId) -> Result<Vec<N>, FetchError>;
}

/// Converts one backend JSON object into a widget row
pub trait RowAdapter: Send + Sync {
    type Row: Send;

    /// Convert a row; `Err` carries a short reason and the row is dropped
    fn adapt(&self, value: Value) -> Result<Self::Row, String>;
}

/// Untyped row keyed by a timestamp field
///
/// The parsed date travels with the row, so a serialized row keeps its
/// period after a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRow {
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<NaiveDate>,
}

impl JsonRow {
    /// Wrap an object, reading its date from `timestamp_field`
    #[must_use]
    pub fn new(fields: Map<String, Value>, timestamp_field: &str) -> Self {
        let date = fields
            .get(timestamp_field)
            .and_then(Value::as_str)
            .and_then(parse_calendar_date);
        Self { fields, date }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl Timestamped for JsonRow {
    fn timestamp(&self) -> Option<NaiveDate> {
        self.date
    }
}

/// Adapter producing [`JsonRow`]s
#[derive(Debug, Clone)]
pub struct JsonRowAdapter {
    timestamp_field: String,
}

impl JsonRowAdapter {
    #[must_use]
    pub fn new(timestamp_field: impl Into<String>) -> Self {
        Self {
            timestamp_field: timestamp_field.into(),
        }
    }

    #[must_use]
    pub fn timestamp_field(&self) -> &str {
        &self.timestamp_field
    }
}

impl RowAdapter for JsonRowAdapter {
    type Row = JsonRow;

    fn adapt(&self, value: Value) -> Result<JsonRow, String> {
        match value {
            Value::Object(fields) => Ok(JsonRow::new(fields, &self.timestamp_field)),
            other => Err(format!("expected object row, got {other}")),
        }
    }
}

/// Adapter deserializing rows into a typed struct
#[derive(Debug)]
pub struct SerdeRowAdapter<T> {
    _row: PhantomData<fn() -> T>,
}

impl<T> SerdeRowAdapter<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { _row: PhantomData }
    }
}

impl<T> Default for SerdeRowAdapter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SerdeRowAdapter<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Send> RowAdapter for SerdeRowAdapter<T> {
    type Row = T;

    fn adapt(&self, value: Value) -> Result<T, String> {
        serde_json::from_value(value).map_err(|e| e.to_string())
    }
}

/// Adapt a JSON array response, dropping rows the adapter rejects
///
/// Returns the rows and how many were dropped. A body that is not an array
/// is a decode error.
pub fn adapt_rows<A: RowAdapter + ?Sized>(
    adapter: &A,
    body: Value,
) -> Result<(Vec<A::Row>, usize), FetchError> {
    let Value::Array(items) = body else {
        return Err(FetchError::Decode("expected a JSON array of rows".to_string()));
    };

    let mut rows = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for item in items {
        match adapter.adapt(item) {
            Ok(row) => rows.push(row),
            Err(reason) => {
                tracing::debug!(%reason, "dropping row");
                dropped += 1;
            }
        }
    }
    Ok((rows, dropped))
}
