//! Poller registry
//!
//! Keeps exactly one live poller per feed. Subscribing again to a feed tears
//! the previous poller down before the new one is installed, and the new
//! subscription's ticket stales anything the old one still had in flight.

use crate::cancel::{CancellationToken, EpochClock, Ticket};
use crate::config::PollerConfig;
use crate::poller::{AdaptivePoller, PollEvent, PollHandle, PollState};
use crate::source::NotificationSource;
use crate::types::{FeedId, SubscriptionId, Visibility};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Registry of poll subscriptions keyed by feed
pub struct PollerRegistry<N> {
    source: Arc<dyn NotificationSource<N>>,
    config: PollerConfig,
    visibility: watch::Receiver<Visibility>,
    handles: DashMap<FeedId, PollHandle>,
    clocks: DashMap<FeedId, Arc<EpochClock>>,
}

impl<N> std::fmt::Debug for PollerRegistry<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerRegistry")
            .field("config", &self.config)
            .field("active", &self.handles.len())
            .finish_non_exhaustive()
    }
}

impl<N: Send + 'static> PollerRegistry<N> {
    /// Create a registry; every poller follows `visibility`
    #[must_use]
    pub fn new(
        source: Arc<dyn NotificationSource<N>>,
        config: PollerConfig,
        visibility: watch::Receiver<Visibility>,
    ) -> Self {
        Self {
            source,
            config,
            visibility,
            handles: DashMap::new(),
            clocks: DashMap::new(),
        }
    }

    /// Start polling `feed`, replacing any existing subscription to it
    pub fn subscribe(&self, feed: FeedId, sink: mpsc::Sender<PollEvent<N>>) -> SubscriptionId {
        if let Some((_, previous)) = self.handles.remove(&feed) {
            tracing::info!(
                feed = %feed,
                subscription = %previous.subscription(),
                "replacing poll subscription"
            );
            previous.stop();
        }

        let clock = self
            .clocks
            .entry(feed.clone())
            .or_insert_with(|| Arc::new(EpochClock::new()))
            .value()
            .clone();
        let ticket = Ticket::issue(&clock, &CancellationToken::new());

        let poller = AdaptivePoller::new(feed.clone(), Arc::clone(&self.source), self.config);
        let handle = poller.spawn(self.visibility.clone(), sink, ticket);
        let id = handle.subscription();
        tracing::info!(feed = %feed, subscription = %id, "poll subscription installed");

        if let Some(raced) = self.handles.insert(feed, handle) {
            raced.stop();
        }
        id
    }

    /// End the subscription `id` on `feed`
    ///
    /// Returns `false` when `feed` is now held by a different subscription.
    pub fn unsubscribe(&self, feed: &FeedId, id: SubscriptionId) -> bool {
        match self.handles.remove_if(feed, |_, handle| handle.subscription() == id) {
            Some((_, handle)) => {
                handle.stop();
                self.forget_clock(feed);
                tracing::info!(feed = %feed, subscription = %id, "poll subscription removed");
                true
            }
            None => false,
        }
    }

    /// Feeds with a live subscription, sorted
    #[must_use]
    pub fn active_feeds(&self) -> Vec<FeedId> {
        let mut feeds: Vec<FeedId> =
            self.handles.iter().map(|entry| entry.key().clone()).collect();
        feeds.sort();
        feeds
    }

    #[must_use]
    pub fn is_active(&self, feed: &FeedId) -> bool {
        self.handles.contains_key(feed)
    }

    /// Current subscription of `feed`
    #[must_use]
    pub fn subscription(&self, feed: &FeedId) -> Option<SubscriptionId> {
        self.handles.get(feed).map(|handle| handle.subscription())
    }

    /// Poller state of `feed`
    #[must_use]
    pub fn state(&self, feed: &FeedId) -> Option<PollState> {
        self.handles.get(feed).map(|handle| handle.state())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every subscription
    pub fn shutdown_all(&self) {
        let feeds = self.active_feeds();
        for feed in feeds {
            if let Some((_, handle)) = self.handles.remove(&feed) {
                handle.stop();
            }
            self.forget_clock(&feed);
        }
        tracing::info!("all poll subscriptions stopped");
    }

    /// Drop the epoch clock of a feed nobody polls any more
    fn forget_clock(&self, feed: &FeedId) {
        self.clocks.remove_if(feed, |_, _| !self.handles.contains_key(feed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSource {
        calls: Mutex<Vec<FeedId>>,
    }

    #[async_trait]
    impl NotificationSource<String> for CountingSource {
        async fn fetch_notifications(&self, feed: &FeedId) -> Result<Vec<String>, FetchError> {
            self.calls.lock().push(feed.clone());
            Ok(vec![format!("hello from {feed}")])
        }
    }

    fn registry() -> (PollerRegistry<String>, Arc<CountingSource>, watch::Sender<Visibility>) {
        let source = Arc::new(CountingSource::default());
        let (vis_tx, vis_rx) = watch::channel(Visibility::Visible);
        let dyn_source: Arc<dyn NotificationSource<String>> = source.clone();
        let registry = PollerRegistry::new(
            dyn_source,
            PollerConfig::from_durations(Duration::from_millis(100), Duration::from_secs(1)),
            vis_rx,
        );
        (registry, source, vis_tx)
    }

    #[tokio::test(start_paused = true)]
    async fn resubscribe_replaces_previous() {
        let (registry, _source, _vis) = registry();
        let feed = FeedId::new("inbox");

        let (old_tx, mut old_rx) = mpsc::channel(16);
        let first = registry.subscribe(feed.clone(), old_tx);
        assert!(old_rx.recv().await.is_some());

        let (new_tx, mut new_rx) = mpsc::channel(16);
        let second = registry.subscribe(feed.clone(), new_tx);
        assert_ne!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.subscription(&feed), Some(second));

        // the old poller is gone: its sink drains and closes
        while old_rx.recv().await.is_some() {}
        assert!(new_rx.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_unsubscribe_keeps_newer_subscription() {
        let (registry, _source, _vis) = registry();
        let feed = FeedId::new("inbox");
        let (tx, _rx) = mpsc::channel(16);
        let first = registry.subscribe(feed.clone(), tx.clone());
        let second = registry.subscribe(feed.clone(), tx);

        assert!(!registry.unsubscribe(&feed, first));
        assert!(registry.is_active(&feed));
        assert!(registry.unsubscribe(&feed, second));
        assert!(registry.is_empty());
        assert!(registry.clocks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clocks_follow_subscriptions() {
        let (registry, _source, _vis) = registry();
        let (tx, _rx) = mpsc::channel(16);
        for n in 0..50 {
            let feed = FeedId::new(format!("session-{n}"));
            let id = registry.subscribe(feed.clone(), tx.clone());
            assert!(registry.unsubscribe(&feed, id));
        }
        assert!(registry.clocks.is_empty());

        registry.subscribe(FeedId::new("a"), tx.clone());
        registry.subscribe(FeedId::new("b"), tx);
        assert_eq!(registry.clocks.len(), 2);
        registry.shutdown_all();
        assert!(registry.clocks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn feeds_poll_independently() {
        let (registry, source, _vis) = registry();
        let (tx, mut rx) = mpsc::channel(16);
        registry.subscribe(FeedId::new("b"), tx.clone());
        registry.subscribe(FeedId::new("a"), tx);

        rx.recv().await;
        rx.recv().await;
        assert_eq!(registry.active_feeds(), vec![FeedId::new("a"), FeedId::new("b")]);

        let mut polled = source.calls.lock().clone();
        polled.sort();
        assert_eq!(polled, vec![FeedId::new("a"), FeedId::new("b")]);

        registry.shutdown_all();
        assert!(registry.is_empty());
    }
}
