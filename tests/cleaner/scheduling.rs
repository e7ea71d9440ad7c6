use std::time::Duration;

use chrono::{TimeDelta, Utc};

use cleanbot::cleaner::JobState;
use cleanbot::transport::ChannelId;

use super::platform_harness::{eventually, paced_engine, stack, stack_with_engine};

#[tokio::test]
async fn sweep_for_unknown_channel_leaves_platform_untouched() {
    let stack = stack(Duration::from_secs(3600), None);
    stack
        .platform
        .seed(ChannelId(1), [Utc::now() - TimeDelta::days(3)]);

    let report = stack.cleaner().sweep(ChannelId(1)).await.unwrap();
    assert!(report.is_none());
    assert_eq!(stack.platform.fetches(), 0);
    assert_eq!(stack.platform.remaining(ChannelId(1)), 1);
}

#[tokio::test]
async fn armed_job_sweeps_immediately_and_stays_armed() {
    let stack = stack(Duration::from_secs(3600), None);
    let now = Utc::now();
    stack
        .platform
        .seed(ChannelId(2), [now - TimeDelta::hours(30), now - TimeDelta::hours(1)]);
    stack.store().enable(ChannelId(2));

    assert!(stack.scheduler.arm(ChannelId(2)));
    assert!(eventually(|| stack.platform.remaining(ChannelId(2)) == 1).await);
    assert!(eventually(|| stack.scheduler.state(ChannelId(2)) == JobState::Armed).await);
}

#[tokio::test]
async fn short_interval_fires_repeatedly() {
    let stack = stack(Duration::from_millis(20), None);
    stack.store().enable(ChannelId(3));
    stack.scheduler.arm(ChannelId(3));

    assert!(eventually(|| stack.platform.fetches() >= 3).await);
    stack.scheduler.disarm(ChannelId(3));
}

#[tokio::test]
async fn double_arm_keeps_one_job() {
    let stack = stack(Duration::from_secs(3600), Some(Duration::from_secs(3600)));
    stack.store().enable(ChannelId(4));

    assert!(stack.scheduler.arm(ChannelId(4)));
    assert!(!stack.scheduler.arm(ChannelId(4)));
    assert_eq!(stack.scheduler.armed_channels(), vec![ChannelId(4)]);
    assert_eq!(stack.store().channels().len(), 1);
}

#[tokio::test]
async fn disarm_then_rearm_starts_fresh_job() {
    let stack = stack(Duration::from_secs(3600), Some(Duration::from_secs(3600)));
    stack.store().enable(ChannelId(5));
    stack.scheduler.arm(ChannelId(5));

    assert!(stack.scheduler.disarm(ChannelId(5)));
    assert_eq!(stack.scheduler.state(ChannelId(5)), JobState::Stopped);

    stack.cleaner().registry().clear(ChannelId(5));
    assert!(stack.scheduler.arm(ChannelId(5)));
    assert_eq!(stack.scheduler.state(ChannelId(5)), JobState::Armed);
}

#[tokio::test]
async fn disarm_stops_sweep_in_flight() {
    let stack = stack_with_engine(
        Duration::from_secs(3600),
        None,
        paced_engine(Duration::from_millis(20)),
    );
    let old = Utc::now() - TimeDelta::days(5);
    stack.platform.seed(ChannelId(6), (0..50).map(|i| old - TimeDelta::seconds(i)));
    stack.store().enable(ChannelId(6));
    stack.scheduler.arm(ChannelId(6));

    assert!(eventually(|| stack.platform.deleted() >= 3).await);
    assert_eq!(stack.scheduler.state(ChannelId(6)), JobState::Running);
    assert!(stack.scheduler.disarm(ChannelId(6)));
    let at_disarm = stack.platform.deleted();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(stack.platform.deleted(), at_disarm);
    assert!(at_disarm < 50);
    assert_eq!(stack.platform.remaining(ChannelId(6)), 50 - at_disarm);
    assert_eq!(stack.scheduler.state(ChannelId(6)), JobState::Stopped);
}
