//! Adaptive notification polling
//!
//! A poller fetches one feed on a timer. Rate limiting doubles the interval
//! up to a ceiling and any success resets it. While the hosting page is
//! hidden no timer is alive; becoming visible fires an immediate fetch and
//! restarts at the base interval.
//!
//! The next timer is only armed after the previous fetch settled, so a feed
//! never has more than one request outstanding.

use crate::cancel::{CancellationToken, Ticket};
use crate::config::PollerConfig;
use crate::source::NotificationSource;
use crate::types::{FeedId, SubscriptionId, Visibility};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Multiplicative, capped back-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    /// Back-off starting at `base`; a ceiling below `base` is raised to it
    #[must_use]
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self {
            base,
            ceiling: ceiling.max(base),
            current: base,
        }
    }

    #[must_use]
    pub fn from_config(config: &PollerConfig) -> Self {
        Self::new(config.base_interval(), config.ceiling())
    }

    #[inline]
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    #[inline]
    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    #[inline]
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Double the interval, capped; returns the new interval
    pub fn on_rate_limited(&mut self) -> Duration {
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        self.current
    }

    /// Back to the base interval
    #[inline]
    pub fn on_success(&mut self) {
        self.reset();
    }

    #[inline]
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Interval after `signals` consecutive rate limits
    ///
    /// `min(base * 2^signals, ceiling)`
    #[must_use]
    pub fn after(base: Duration, ceiling: Duration, signals: u32) -> Duration {
        let ceiling = ceiling.max(base);
        let factor = 2u32.checked_pow(signals).unwrap_or(u32::MAX);
        base.saturating_mul(factor).min(ceiling)
    }
}

/// What a poll delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent<N> {
    /// Fresh feed items
    Items(Vec<N>),
    /// A failed fetch; polling continues at the current interval
    Error(String),
    /// Server asked to slow down; the next fetch is `next_interval` away
    RateLimited { next_interval: Duration },
}

/// Observable poller state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    pub interval: Duration,
    pub visible: bool,
    pub fetches: u64,
    pub last_error: Option<String>,
}

/// Poller for one feed
pub struct AdaptivePoller<N> {
    feed: FeedId,
    source: Arc<dyn NotificationSource<N>>,
    config: PollerConfig,
}

impl<N> std::fmt::Debug for AdaptivePoller<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptivePoller")
            .field("feed", &self.feed)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<N: Send + 'static> AdaptivePoller<N> {
    #[must_use]
    pub fn new(
        feed: FeedId,
        source: Arc<dyn NotificationSource<N>>,
        config: PollerConfig,
    ) -> Self {
        Self { feed, source, config }
    }

    /// Start polling, delivering events to `sink`
    ///
    /// The loop ends when the ticket is cancelled or superseded, when `sink`
    /// closes, or when the visibility sender is dropped.
    pub fn spawn(
        self,
        visibility: watch::Receiver<Visibility>,
        sink: mpsc::Sender<PollEvent<N>>,
        ticket: Ticket,
    ) -> PollHandle {
        let state = Arc::new(Mutex::new(PollState {
            interval: self.config.base_interval(),
            visible: visibility.borrow().is_visible(),
            fetches: 0,
            last_error: None,
        }));
        let token = ticket.token().clone();
        let feed = self.feed.clone();
        let task = tokio::spawn(self.run(visibility, sink, ticket, Arc::clone(&state)));

        PollHandle {
            feed,
            subscription: SubscriptionId::new(),
            token,
            task,
            state,
        }
    }

    async fn run(
        self,
        mut visibility: watch::Receiver<Visibility>,
        sink: mpsc::Sender<PollEvent<N>>,
        ticket: Ticket,
        state: Arc<Mutex<PollState>>,
    ) {
        let token = ticket.token().clone();
        let mut backoff = Backoff::from_config(&self.config);
        tracing::info!(feed = %self.feed, interval = ?backoff.current(), "poller started");

        loop {
            let visible = visibility.borrow_and_update().is_visible();
            if !visible {
                state.lock().visible = false;
                tracing::debug!(feed = %self.feed, "page hidden; poller paused");
                let resumed = tokio::select! {
                    () = token.cancelled() => false,
                    open = wait_until(&mut visibility, Visibility::Visible) => open,
                };
                if !resumed {
                    break;
                }
                backoff.reset();
                {
                    let mut s = state.lock();
                    s.visible = true;
                    s.interval = backoff.current();
                }
                tracing::debug!(feed = %self.feed, "page visible; poller resumed");
            }

            let result = self.source.fetch_notifications(&self.feed).await;
            if !ticket.is_relevant() {
                tracing::debug!(feed = %self.feed, epoch = %ticket.epoch(), "poll result dropped");
                break;
            }

            let event = match result {
                Ok(items) => {
                    backoff.on_success();
                    PollEvent::Items(items)
                }
                Err(e) if e.is_rate_limited() => {
                    let next_interval = backoff.on_rate_limited();
                    tracing::warn!(
                        feed = %self.feed,
                        interval = ?next_interval,
                        "rate limited; backing off"
                    );
                    PollEvent::RateLimited { next_interval }
                }
                Err(e) => {
                    tracing::warn!(feed = %self.feed, error = %e, "poll failed");
                    PollEvent::Error(e.to_string())
                }
            };

            {
                let mut s = state.lock();
                s.fetches += 1;
                s.interval = backoff.current();
                s.last_error = match &event {
                    PollEvent::Error(message) => Some(message.clone()),
                    _ => None,
                };
            }

            let delivered = tokio::select! {
                () = token.cancelled() => false,
                sent = sink.send(event) => match sent {
                    Ok(()) => true,
                    Err(_) => {
                        tracing::debug!(feed = %self.feed, "event sink closed");
                        false
                    }
                },
            };
            if !delivered {
                break;
            }

            let interval = backoff.current();
            let keep_going = tokio::select! {
                () = token.cancelled() => false,
                () = tokio::time::sleep(interval) => true,
                open = wait_until(&mut visibility, Visibility::Hidden) => open,
            };
            if !keep_going {
                break;
            }
        }

        tracing::info!(feed = %self.feed, "poller stopped");
    }
}

/// Wait until `rx` shows `target`; `false` when the sender is gone
async fn wait_until(rx: &mut watch::Receiver<Visibility>, target: Visibility) -> bool {
    loop {
        if *rx.borrow_and_update() == target {
            return true;
        }
        if rx.changed().await.is_err() {
            return false;
        }
    }
}

/// A running poll subscription
#[derive(Debug)]
pub struct PollHandle {
    feed: FeedId,
    subscription: SubscriptionId,
    token: CancellationToken,
    task: JoinHandle<()>,
    state: Arc<Mutex<PollState>>,
}

impl PollHandle {
    #[must_use]
    pub fn feed(&self) -> &FeedId {
        &self.feed
    }

    #[must_use]
    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    #[must_use]
    pub fn state(&self) -> PollState {
        self.state.lock().clone()
    }

    /// Tear down the timer and drop any in-flight fetch
    pub fn stop(&self) {
        self.token.cancel();
        self.task.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::EpochClock;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    struct Scripted {
        responses: Mutex<VecDeque<Result<Vec<u32>, FetchError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Vec<u32>, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock();
            calls.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    #[async_trait]
    impl NotificationSource<u32> for Scripted {
        async fn fetch_notifications(&self, _feed: &FeedId) -> Result<Vec<u32>, FetchError> {
            self.calls.lock().push(Instant::now());
            self.responses.lock().pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    fn limited() -> Result<Vec<u32>, FetchError> {
        Err(FetchError::RateLimited { retry_after: None })
    }

    fn start(
        source: &Arc<Scripted>,
        visibility: watch::Receiver<Visibility>,
    ) -> (PollHandle, mpsc::Receiver<PollEvent<u32>>) {
        let (tx, rx) = mpsc::channel(64);
        let clock = Arc::new(EpochClock::new());
        let ticket = Ticket::issue(&clock, &CancellationToken::new());
        let source: Arc<dyn NotificationSource<u32>> = source.clone();
        let poller = AdaptivePoller::new(
            FeedId::new("inbox"),
            source,
            PollerConfig::from_durations(Duration::from_millis(100), Duration::from_millis(350)),
        );
        (poller.spawn(visibility, tx, ticket), rx)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut b = Backoff::new(Duration::from_secs(5), Duration::from_secs(60));
        assert_eq!(b.on_rate_limited(), Duration::from_secs(10));
        assert_eq!(b.on_rate_limited(), Duration::from_secs(20));
        assert_eq!(b.on_rate_limited(), Duration::from_secs(40));
        assert_eq!(b.on_rate_limited(), Duration::from_secs(60));
        assert_eq!(b.on_rate_limited(), Duration::from_secs(60));
        b.on_success();
        assert_eq!(b.current(), Duration::from_secs(5));
    }

    #[test]
    fn closed_form_matches() {
        let base = Duration::from_secs(5);
        let ceiling = Duration::from_secs(60);
        assert_eq!(Backoff::after(base, ceiling, 0), base);
        assert_eq!(Backoff::after(base, ceiling, 3), Duration::from_secs(40));
        assert_eq!(Backoff::after(base, ceiling, 40), ceiling);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_stretch_interval_until_success() {
        let source =
            Scripted::new(vec![limited(), limited(), limited(), Ok(vec![1]), Ok(vec![2])]);
        let (_vis_tx, vis_rx) = watch::channel(Visibility::Visible);
        let (handle, mut events) = start(&source, vis_rx);

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(events.recv().await.unwrap());
        }
        handle.stop();

        assert_eq!(
            seen,
            vec![
                PollEvent::RateLimited { next_interval: Duration::from_millis(200) },
                PollEvent::RateLimited { next_interval: Duration::from_millis(350) },
                PollEvent::RateLimited { next_interval: Duration::from_millis(350) },
                PollEvent::Items(vec![1]),
                PollEvent::Items(vec![2]),
            ]
        );
        assert_eq!(
            source.gaps(),
            vec![
                Duration::from_millis(200),
                Duration::from_millis(350),
                Duration::from_millis(350),
                Duration::from_millis(100),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn errors_do_not_stop_polling() {
        let source = Scripted::new(vec![
            Err(FetchError::from_status(500, "boom", None)),
            Ok(vec![7]),
        ]);
        let (_vis_tx, vis_rx) = watch::channel(Visibility::Visible);
        let (handle, mut events) = start(&source, vis_rx);

        assert!(matches!(events.recv().await, Some(PollEvent::Error(_))));
        assert!(handle.state().last_error.is_some());
        assert_eq!(events.recv().await, Some(PollEvent::Items(vec![7])));
        assert_eq!(source.gaps(), vec![Duration::from_millis(100)]);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_page_has_no_timer() {
        let source = Scripted::new(vec![limited()]);
        let (vis_tx, vis_rx) = watch::channel(Visibility::Visible);
        let (handle, mut events) = start(&source, vis_rx);

        assert!(matches!(events.recv().await, Some(PollEvent::RateLimited { .. })));
        vis_tx.send_replace(Visibility::Hidden);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.calls.lock().len(), 1);
        assert!(!handle.state().visible);

        let hidden_at = Instant::now();
        vis_tx.send_replace(Visibility::Visible);
        assert_eq!(events.recv().await, Some(PollEvent::Items(Vec::new())));
        assert_eq!(source.calls.lock()[1], hidden_at);
        assert_eq!(handle.state().interval, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_ticket_stops_loop() {
        let source = Scripted::new(Vec::new());
        let (_vis_tx, vis_rx) = watch::channel(Visibility::Visible);
        let (tx, mut rx) = mpsc::channel(8);
        let clock = Arc::new(EpochClock::new());
        let ticket = Ticket::issue(&clock, &CancellationToken::new());
        let dyn_source: Arc<dyn NotificationSource<u32>> = source.clone();
        let handle = AdaptivePoller::new(FeedId::new("f"), dyn_source, PollerConfig::default())
            .spawn(vis_rx, tx, ticket);

        let _newer = clock.advance();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(rx.recv().await, None);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_releases_a_blocked_send() {
        let source = Scripted::new(Vec::new());
        let (_vis_tx, vis_rx) = watch::channel(Visibility::Visible);
        let (tx, _rx) = mpsc::channel(1);
        let clock = Arc::new(EpochClock::new());
        let token = CancellationToken::new();
        let ticket = Ticket::issue(&clock, &token);
        let dyn_source: Arc<dyn NotificationSource<u32>> = source.clone();
        let config =
            PollerConfig::from_durations(Duration::from_millis(100), Duration::from_millis(350));
        let handle =
            AdaptivePoller::new(FeedId::new("inbox"), dyn_source, config).spawn(vis_rx, tx, ticket);

        // the first event fills the sink; the second send waits on it
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(handle.state().fetches, 2);
        assert!(!handle.is_finished());

        token.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(handle.is_finished());
        assert_eq!(source.calls.lock().len(), 2);
    }
}
