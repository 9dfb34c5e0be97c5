//! Widget row endpoints

use crate::client::BackendClient;
use async_trait::async_trait;
use mentorlens_core::{adapt_rows, FetchError, JsonRowAdapter, RowAdapter, RowSource, WidgetSpec};
use mentorlens_filter::{EffectiveRange, Scope};
use std::sync::Arc;

/// Row source for one widget endpoint
///
/// The unfiltered call carries only the scope parameters; the filtered call
/// adds `from` (inclusive) and `to` (exclusive) ISO dates.
#[derive(Debug, Clone)]
pub struct HttpRowSource<A> {
    client: Arc<BackendClient>,
    endpoint: String,
    adapter: A,
}

impl<A: RowAdapter> HttpRowSource<A> {
    #[must_use]
    pub fn new(client: Arc<BackendClient>, endpoint: impl Into<String>, adapter: A) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            adapter,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl HttpRowSource<JsonRowAdapter> {
    /// Untyped source for a configured widget
    #[must_use]
    pub fn for_widget(client: Arc<BackendClient>, spec: &WidgetSpec) -> Self {
        Self::new(client, spec.endpoint.clone(), JsonRowAdapter::new(spec.timestamp_field.clone()))
    }
}

/// Query parameters for `scope` and `range`
#[must_use]
pub fn row_query(scope: &Scope, range: Option<&EffectiveRange>) -> Vec<(&'static str, String)> {
    let mut query = scope.query_pairs();
    if let Some(range) = range {
        query.extend(range.query_pairs());
    }
    query
}

#[async_trait]
impl<A> RowSource<A::Row> for HttpRowSource<A>
where
    A: RowAdapter,
{
    async fn fetch_rows(
        &self,
        scope: &Scope,
        range: Option<&EffectiveRange>,
    ) -> Result<Vec<A::Row>, FetchError> {
        let query = row_query(scope, range);
        let body = self.client.get_json(&self.endpoint, &query).await?;
        let (rows, dropped) = adapt_rows(&self.adapter, body)?;
        if dropped > 0 {
            tracing::warn!(endpoint = %self.endpoint, dropped, "rows rejected by adapter");
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mentorlens_filter::{compile_period, PeriodSelection, Quarter};

    #[test]
    fn unfiltered_query_has_only_scope() {
        assert_eq!(
            row_query(&Scope::program("p-3"), None),
            vec![("program_id", "p-3".to_string())]
        );
        assert!(row_query(&Scope::Unrestricted, None).is_empty());
    }

    #[test]
    fn filtered_query_adds_half_open_bounds() {
        let range = compile_period(&PeriodSelection::quarterly(2025, Quarter::Q3)).unwrap();
        assert_eq!(range.from_inclusive, NaiveDate::from_ymd_opt(2025, 7, 1));
        assert_eq!(
            row_query(&Scope::entity("m-9"), Some(&range)),
            vec![
                ("entity_id", "m-9".to_string()),
                ("from", "2025-07-01".to_string()),
                ("to", "2025-10-01".to_string()),
            ]
        );
    }
}
