//! Notification feed endpoint

use crate::client::BackendClient;
use async_trait::async_trait;
use mentorlens_core::{adapt_rows, FeedId, FetchError, NotificationSource, RowAdapter};
use std::sync::Arc;

/// Notification source polling one route, selecting the feed by query
#[derive(Debug, Clone)]
pub struct HttpNotificationSource<A> {
    client: Arc<BackendClient>,
    route: String,
    adapter: A,
}

impl<A: RowAdapter> HttpNotificationSource<A> {
    #[must_use]
    pub fn new(client: Arc<BackendClient>, route: impl Into<String>, adapter: A) -> Self {
        Self {
            client,
            route: route.into(),
            adapter,
        }
    }
}

#[async_trait]
impl<A> NotificationSource<A::Row> for HttpNotificationSource<A>
where
    A: RowAdapter,
{
    async fn fetch_notifications(&self, feed: &FeedId) -> Result<Vec<A::Row>, FetchError> {
        let query = [("feed", feed.as_str().to_string())];
        let body = self.client.get_json(&self.route, &query).await?;
        let (items, dropped) = adapt_rows(&self.adapter, body)?;
        if dropped > 0 {
            tracing::debug!(feed = %feed, dropped, "notifications rejected by adapter");
        }
        Ok(items)
    }
}
