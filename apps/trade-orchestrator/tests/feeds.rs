//! Feed Manager Integration Tests
//!
//! Shared tick streams over the paper backend: fan-out, reference counting,
//! resubscription and deduplication across reopened streams.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use common::{EURUSD, container, drain, paper, settle, tick};
use trade_orchestrator::application::ports::BackendError;
use trade_orchestrator::application::services::FeedEvent;
use trade_orchestrator::infrastructure::paper::BackendOperation;
use trade_orchestrator::{EngineEvent, ExecutionError, Symbol};

fn eurusd() -> [Symbol; 1] {
    [Symbol::new(EURUSD)]
}

fn buffered(sub: &mut trade_orchestrator::application::services::FeedSubscription) -> Vec<FeedEvent> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}

#[tokio::test(start_paused = true)]
async fn consumers_of_one_symbol_set_share_a_stream() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);
    let feeds = container.feeds();

    let mut first = feeds.subscribe(eurusd()).unwrap();
    let mut second = feeds.subscribe(eurusd()).unwrap();
    settle().await;

    assert_eq!(feeds.active_streams(), 1);
    assert_eq!(feeds.consumer_count(&eurusd().into_iter().collect()), 2);
    assert_eq!(paper.call_count(BackendOperation::SubscribeTicks), 1);

    paper.push_tick(tick(dec!(1.10010), 1));
    settle().await;
    let expected = vec![
        FeedEvent::Tick(tick(dec!(1.10000), 0)),
        FeedEvent::Tick(tick(dec!(1.10010), 1)),
    ];
    assert_eq!(buffered(&mut first), expected);
    assert_eq!(buffered(&mut second), expected);

    drop(first);
    settle().await;
    assert_eq!(paper.open_streams(), 1);

    drop(second);
    settle().await;
    assert_eq!(feeds.active_streams(), 0);
    assert_eq!(paper.open_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn reopened_stream_does_not_repeat_delivered_ticks() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);
    let mut sub = container.feeds().subscribe(eurusd()).unwrap();
    settle().await;

    paper.push_tick(tick(dec!(1.10010), 1));
    settle().await;

    // The stream drops; after the cooldown it is reopened and the backend
    // replays tick 1, which was already delivered.
    paper.disconnect_feeds();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(paper.call_count(BackendOperation::SubscribeTicks), 2);

    paper.push_tick(tick(dec!(1.10010), 1));
    paper.push_tick(tick(dec!(1.10020), 2));
    settle().await;

    assert_eq!(
        buffered(&mut sub),
        vec![
            FeedEvent::Tick(tick(dec!(1.10000), 0)),
            FeedEvent::Tick(tick(dec!(1.10010), 1)),
            FeedEvent::Resubscribed,
            FeedEvent::Tick(tick(dec!(1.10020), 2)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn backend_reconnect_reopens_the_stream() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);
    let mut events = container.events().subscribe();
    let mut sub = container.feeds().subscribe(eurusd()).unwrap();
    settle().await;

    paper.expire_session();
    let quote = container
        .guard()
        .get_quote(
            &Symbol::new(EURUSD),
            Instant::now() + Duration::from_secs(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(quote, tick(dec!(1.10000), 0));
    settle().await;

    assert_eq!(paper.call_count(BackendOperation::Reconnect), 1);
    assert_eq!(paper.call_count(BackendOperation::SubscribeTicks), 2);
    assert_eq!(
        buffered(&mut sub),
        vec![FeedEvent::Tick(tick(dec!(1.10000), 0)), FeedEvent::Resubscribed]
    );
    let resubscribed = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, EngineEvent::FeedResubscribed { .. }))
        .count();
    // The first open is not a resubscription.
    assert_eq!(resubscribed, 1);
}

#[tokio::test(start_paused = true)]
async fn first_open_publishes_no_resubscription() {
    let paper = paper();
    paper.set_quote(tick(dec!(1.10000), 0));
    let container = container(&paper);
    let mut events = container.events().subscribe();
    let mut sub = container.feeds().subscribe(eurusd()).unwrap();
    settle().await;

    assert_eq!(buffered(&mut sub), vec![FeedEvent::Tick(tick(dec!(1.10000), 0))]);
    assert!(
        !drain(&mut events)
            .iter()
            .any(|event| matches!(event, EngineEvent::FeedResubscribed { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn refused_subscription_is_reported_to_consumers() {
    let paper = paper();
    paper.fail_next(
        BackendOperation::SubscribeTicks,
        BackendError::rejected(4106, "unknown symbol"),
    );
    let container = container(&paper);
    let mut events = container.events().subscribe();
    let mut sub = container.feeds().subscribe(eurusd()).unwrap();

    let event = sub.recv().await.unwrap();
    assert!(matches!(
        event,
        FeedEvent::Unavailable(ExecutionError::TradeRejected { code: 4106, .. })
    ));
    assert!(
        drain(&mut events)
            .iter()
            .any(|event| matches!(event, EngineEvent::FeedUnavailable { .. }))
    );

    // The next attempt after the cooldown succeeds.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(paper.call_count(BackendOperation::SubscribeTicks), 2);
    assert_eq!(paper.open_streams(), 1);
}
