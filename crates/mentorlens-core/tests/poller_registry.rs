//! Poller timing: back-off bounds, visibility coupling and one timer per feed

use mentorlens_core::{
    Backoff, FeedId, NotificationSource, PollEvent, PollerConfig, PollerRegistry, Visibility,
};
use mentorlens_test_utils::{rate_limited, ScriptedNotifications};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const BASE: Duration = Duration::from_millis(100);
const CEILING: Duration = Duration::from_millis(1_000);

fn registry(
    source: &Arc<ScriptedNotifications<String>>,
) -> (PollerRegistry<String>, watch::Sender<Visibility>) {
    let (vis_tx, vis_rx) = watch::channel(Visibility::Visible);
    let dyn_source: Arc<dyn NotificationSource<String>> = source.clone();
    let config = PollerConfig::from_durations(BASE, CEILING);
    (PollerRegistry::new(dyn_source, config, vis_rx), vis_tx)
}

#[tokio::test(start_paused = true)]
async fn one_timer_per_feed_after_resubscribe() {
    let source = Arc::new(ScriptedNotifications::new(Vec::new()));
    let (registry, _vis) = registry(&source);
    let feed = FeedId::new("mentor-inbox");

    let (tx, mut first_rx) = mpsc::channel(64);
    registry.subscribe(feed.clone(), tx);
    assert!(first_rx.recv().await.is_some());

    let (tx, _second_rx) = mpsc::channel(64);
    registry.subscribe(feed.clone(), tx);
    tokio::time::sleep(Duration::from_millis(1_050)).await;

    let times = source.poll_times(&feed);
    assert!(times.len() >= 10, "expected steady polling, got {}", times.len());
    // first two polls are the old and new subscriptions starting together
    let gaps: Vec<Duration> = times[1..].windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps.iter().all(|gap| *gap == BASE), "overlapping timers: {gaps:?}");
    assert_eq!(registry.active_feeds(), vec![feed]);
}

#[tokio::test(start_paused = true)]
async fn back_off_is_multiplicative_and_capped() {
    let source = Arc::new(ScriptedNotifications::new(vec![
        Err(rate_limited()),
        Err(rate_limited()),
        Err(rate_limited()),
        Err(rate_limited()),
        Err(rate_limited()),
        Ok(vec!["back".to_string()]),
    ]));
    let (registry, _vis) = registry(&source);
    let feed = FeedId::new("alerts");
    let (tx, mut rx) = mpsc::channel(64);
    registry.subscribe(feed.clone(), tx);

    let mut intervals = Vec::new();
    loop {
        match rx.recv().await.unwrap() {
            PollEvent::RateLimited { next_interval } => intervals.push(next_interval),
            PollEvent::Items(items) => {
                assert_eq!(items, vec!["back".to_string()]);
                break;
            }
            PollEvent::Error(message) => panic!("unexpected error: {message}"),
        }
    }

    let ms = Duration::from_millis;
    assert_eq!(intervals, vec![ms(200), ms(400), ms(800), ms(1_000), ms(1_000)]);
    assert_eq!(registry.state(&feed).unwrap().interval, BASE);
}

#[tokio::test(start_paused = true)]
async fn hidden_page_pauses_and_visible_fires_immediately() {
    let source =
        Arc::new(ScriptedNotifications::new(vec![Err(rate_limited()), Err(rate_limited())]));
    let (registry, vis) = registry(&source);
    let feed = FeedId::new("alerts");
    let (tx, mut rx) = mpsc::channel(64);
    registry.subscribe(feed.clone(), tx);

    rx.recv().await;
    rx.recv().await;
    assert_eq!(registry.state(&feed).unwrap().interval, Duration::from_millis(400));

    vis.send_replace(Visibility::Hidden);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(source.poll_count(), 2);
    assert!(!registry.state(&feed).unwrap().visible);

    let shown_at = tokio::time::Instant::now();
    vis.send_replace(Visibility::Visible);
    assert_eq!(rx.recv().await, Some(PollEvent::Items(Vec::new())));
    assert_eq!(source.poll_times(&feed)[2], shown_at);

    // resumed at the base interval, not the backed-off one
    rx.recv().await;
    assert_eq!(source.poll_times(&feed)[3] - shown_at, BASE);
}

#[tokio::test(start_paused = true)]
async fn closing_the_sink_ends_polling() {
    let source = Arc::new(ScriptedNotifications::new(Vec::new()));
    let (registry, _vis) = registry(&source);
    let (tx, rx) = mpsc::channel(1);
    registry.subscribe(FeedId::new("alerts"), tx);
    drop(rx);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(source.poll_count() <= 1);
}

#[tokio::test(start_paused = true)]
async fn pushed_items_arrive_on_the_next_poll() {
    let source = Arc::new(ScriptedNotifications::new(Vec::new()));
    let (registry, _vis) = registry(&source);
    let feed = FeedId::new("mentor-inbox");
    let (tx, mut rx) = mpsc::channel(64);
    let id = registry.subscribe(feed.clone(), tx);
    assert_eq!(rx.recv().await, Some(PollEvent::Items(Vec::new())));

    let booked = vec!["session booked".to_string(), "session moved".to_string()];
    source.push(Ok(booked.clone()));
    assert_eq!(rx.recv().await, Some(PollEvent::Items(booked)));
    assert_eq!(source.poll_count(), 2);
    let times = source.poll_times(&feed);
    assert_eq!(times[1] - times[0], BASE);

    assert!(registry.unsubscribe(&feed, id));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.poll_count(), 2);
}

proptest! {
    #[test]
    fn backoff_after_n_signals_is_min_of_doubling_and_ceiling(
        base_ms in 1u64..10_000,
        ceiling_factor in 1u64..64,
        signals in 0u32..24,
    ) {
        let base = Duration::from_millis(base_ms);
        let ceiling = Duration::from_millis(base_ms * ceiling_factor);
        let mut backoff = Backoff::new(base, ceiling);
        for _ in 0..signals {
            backoff.on_rate_limited();
        }

        let expected_ms =
            (u128::from(base_ms) << signals).min(u128::from(base_ms * ceiling_factor));
        prop_assert_eq!(backoff.current().as_millis(), expected_ms);
        prop_assert_eq!(backoff.current(), Backoff::after(base, ceiling, signals));

        backoff.on_success();
        prop_assert_eq!(backoff.current(), base);
    }

    #[test]
    fn backoff_never_exceeds_ceiling(
        base_ms in 1u64..5_000,
        ceiling_ms in 1u64..120_000,
        signals in 0u32..64,
    ) {
        let mut backoff =
            Backoff::new(Duration::from_millis(base_ms), Duration::from_millis(ceiling_ms));
        for _ in 0..signals {
            let next = backoff.on_rate_limited();
            prop_assert!(next <= backoff.ceiling());
            prop_assert!(next >= backoff.base());
        }
    }
}
