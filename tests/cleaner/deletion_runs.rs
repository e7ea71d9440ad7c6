use chrono::{TimeDelta, Utc};

use cleanbot::cleaner::{CancelHandle, Selection, TestSelector, delete_messages};
use cleanbot::error::EngineError;
use cleanbot::transport::ChannelId;

use super::platform_harness::{MemoryPlatform, fast_engine};

const CHANNEL: ChannelId = ChannelId(900);

#[tokio::test]
async fn all_selector_deletes_old_and_fresh_messages() {
    let platform = MemoryPlatform::new();
    let now = Utc::now();
    platform.seed(CHANNEL, [now - TimeDelta::days(10), now]);

    let cancel = CancelHandle::detached(CHANNEL);
    let selection = TestSelector::All.selection(Utc::now());
    let report = delete_messages(platform.as_ref(), CHANNEL, &selection, &cancel, &fast_engine())
        .await
        .unwrap();

    assert_eq!(report.deleted, 2);
    assert_eq!(platform.remaining(CHANNEL), 0);
}

#[tokio::test]
async fn retention_window_deletes_only_expired_messages() {
    let platform = MemoryPlatform::new();
    let now = Utc::now();
    platform.seed(CHANNEL, [now - TimeDelta::hours(30), now - TimeDelta::hours(10)]);

    let cancel = CancelHandle::detached(CHANNEL);
    let report = delete_messages(
        platform.as_ref(),
        CHANNEL,
        &Selection::retention(now, 24),
        &cancel,
        &fast_engine(),
    )
    .await
    .unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(platform.remaining(CHANNEL), 1);
}

#[tokio::test]
async fn last_window_keeps_older_messages() {
    let platform = MemoryPlatform::new();
    let now = Utc::now();
    platform.seed(
        CHANNEL,
        [
            now - TimeDelta::hours(3),
            now - TimeDelta::minutes(50),
            now - TimeDelta::minutes(5),
        ],
    );

    let selector = TestSelector::parse("last1h").unwrap();
    let cancel = CancelHandle::detached(CHANNEL);
    let report = delete_messages(
        platform.as_ref(),
        CHANNEL,
        &selector.selection(Utc::now()),
        &cancel,
        &fast_engine(),
    )
    .await
    .unwrap();

    assert_eq!(report.deleted, 2);
    assert_eq!(platform.remaining(CHANNEL), 1);
}

#[tokio::test]
async fn two_hundred_fifty_messages_span_three_pages() {
    let platform = MemoryPlatform::new();
    let base = Utc::now() - TimeDelta::days(4);
    platform.seed(CHANNEL, (0..250).map(|i| base - TimeDelta::seconds(i)));

    let cancel = CancelHandle::detached(CHANNEL);
    let report = delete_messages(
        platform.as_ref(),
        CHANNEL,
        &Selection::retention(Utc::now(), 24),
        &cancel,
        &fast_engine(),
    )
    .await
    .unwrap();

    assert_eq!(report.pages, 3);
    assert_eq!(report.deleted, 250);
    assert_eq!(platform.deleted(), 250);
}

#[tokio::test]
async fn cancel_mid_scan_stops_before_any_delete() {
    let platform = MemoryPlatform::new();
    let base = Utc::now() - TimeDelta::days(4);
    platform.seed(CHANNEL, (0..250).map(|i| base - TimeDelta::seconds(i)));

    let cancel = CancelHandle::detached(CHANNEL);
    platform.cancel_on_fetch(2, cancel.clone());
    let report = delete_messages(
        platform.as_ref(),
        CHANNEL,
        &Selection::retention(Utc::now(), 24),
        &cancel,
        &fast_engine(),
    )
    .await
    .unwrap();

    assert!(report.cancelled);
    assert_eq!(platform.fetches(), 2);
    assert!(report.deleted <= report.candidates);
    assert_eq!(report.deleted, platform.deleted());
    assert_eq!(platform.remaining(CHANNEL), 250 - report.deleted);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let platform = MemoryPlatform::new();
    platform.seed(CHANNEL, [Utc::now() - TimeDelta::days(2)]);
    platform.fail_next_fetches(2);

    let cancel = CancelHandle::detached(CHANNEL);
    let report = delete_messages(
        platform.as_ref(),
        CHANNEL,
        &Selection::retention(Utc::now(), 24),
        &cancel,
        &fast_engine(),
    )
    .await
    .unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(platform.fetches(), 4);
}

#[tokio::test]
async fn persistent_server_errors_fail_the_run() {
    let platform = MemoryPlatform::new();
    platform.seed(CHANNEL, [Utc::now() - TimeDelta::days(2)]);
    platform.fail_next_fetches(100);

    let cancel = CancelHandle::detached(CHANNEL);
    let err = delete_messages(
        platform.as_ref(),
        CHANNEL,
        &Selection::retention(Utc::now(), 24),
        &cancel,
        &fast_engine(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, EngineError::ScanRetriesExhausted { attempts: 4, .. }));
    assert_eq!(platform.remaining(CHANNEL), 1);
}
