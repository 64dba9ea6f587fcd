/*!
 * Integration tests for single-item regenerate and translate
 */

use yacap::providers::mock::MockProvider;
use yacap::queue::{QueueEvent, RetryPolicy};
use yacap::store::ItemStatus;

use crate::common::{QueueHarness, profile, wait_until};

#[tokio::test(start_paused = true)]
async fn test_regenerate_shouldRestartFromAttemptZero() {
    let h = QueueHarness::new(MockProvider::working(), profile(3, 0));
    let ids = h.add_items(1);
    h.store.apply(&QueueEvent::StatusChanged {
        id: ids[0],
        status: ItemStatus::Error,
        message: Some("gave up".to_string()),
        attempt: 4,
    });

    let job = h.store.get(ids[0]).unwrap().job();
    assert!(h.queue.regenerate(job).await);

    let item = h.store.get(ids[0]).unwrap();
    assert_eq!(item.status, ItemStatus::Success);
    assert_eq!(item.attempt_count, 0);
    assert!(item.error_message.is_none());
    assert!(h.recorder.events_for(ids[0]).iter().any(|event| matches!(
        event,
        QueueEvent::StatusChanged { status: ItemStatus::Loading, attempt: 0, message: None, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_regenerate_duringBulkRun_shouldLeaveRunLimitsAlone() {
    let h = QueueHarness::new(MockProvider::working().gated(), profile(2, 0));
    let ids = h.add_items(3);
    let jobs = h.store.pending_jobs();

    let queue = h.queue.clone();
    let bulk_jobs = jobs[..2].to_vec();
    let bulk = tokio::spawn(async move { queue.run(bulk_jobs).await });
    let provider = h.provider.clone();
    wait_until(|| provider.in_flight() == 2).await;
    let limits = h.queue.run_state();

    let queue = h.queue.clone();
    let single = jobs[2].clone();
    let regenerate = tokio::spawn(async move { queue.regenerate(single).await });
    let provider = h.provider.clone();
    wait_until(|| provider.in_flight() == 3).await;
    assert_eq!(h.queue.run_state(), limits);

    h.provider.release(3);
    bulk.await.unwrap();
    assert!(regenerate.await.unwrap());

    assert!(ids.iter().all(|id| h.status(*id) == ItemStatus::Success));
}

#[tokio::test(start_paused = true)]
async fn test_regenerate_ofInFlightItem_shouldBeRefused() {
    let h = QueueHarness::new(MockProvider::working().gated(), profile(1, 0));
    let ids = h.add_items(1);

    let queue = h.queue.clone();
    let jobs = h.store.pending_jobs();
    let bulk = tokio::spawn(async move { queue.run(jobs).await });
    let provider = h.provider.clone();
    wait_until(|| provider.in_flight() == 1).await;

    let job = h.store.get(ids[0]).unwrap().job();
    assert!(!h.queue.regenerate(job).await);
    assert_eq!(h.provider.calls(), 1);

    h.provider.release(1);
    bulk.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_regenerate_rateLimited_shouldNotThrottleBulkRuns() {
    let policy = RetryPolicy { max_retries: 1, ..RetryPolicy::default() };
    let h = QueueHarness::with_policy(MockProvider::rate_limited(), profile(3, 1_000), policy);
    let ids = h.add_items(2);

    let job = h.store.get(ids[0]).unwrap().job();
    assert!(h.queue.regenerate(job).await);
    assert_eq!(h.provider.calls(), 2);
    assert_eq!(h.status(ids[0]), ItemStatus::Error);
    assert!(h.recorder.throttle_events().is_empty());
    assert_eq!(h.queue.run_state(), None);

    let job = h.store.get(ids[1]).unwrap().job();
    h.queue.run(vec![job]).await;
    let started = h.recorder.events().into_iter().find(|event| matches!(event, QueueEvent::RunStarted { .. }));
    assert!(matches!(started, Some(QueueEvent::RunStarted { concurrency_limit: 3, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_shouldStopRegenerateRetries() {
    let h = QueueHarness::new(MockProvider::transient(usize::MAX), profile(1, 0));
    let ids = h.add_items(1);

    let queue = h.queue.clone();
    let job = h.store.get(ids[0]).unwrap().job();
    let regenerate = tokio::spawn(async move { queue.regenerate(job).await });
    let provider = h.provider.clone();
    wait_until(|| provider.calls() == 1).await;

    h.queue.cancel();
    assert!(regenerate.await.unwrap());
    assert_eq!(h.provider.calls(), 1);
    assert_eq!(h.status(ids[0]), ItemStatus::Loading);
    assert_eq!(h.store.reset_interrupted(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_translate_shouldReplaceEnglishCaption() {
    let h = QueueHarness::new(MockProvider::working(), profile(1, 0));
    let ids = h.add_items(1);
    h.store.apply(&QueueEvent::Captioned { id: ids[0], en: "old".into(), zh: "一只猫".into() });

    assert!(h.queue.translate(ids[0], " 一只猫 ").await);

    let item = h.store.get(ids[0]).unwrap();
    assert_eq!(item.caption_en, "[EN] 一只猫");
    assert_eq!(item.caption_zh, "一只猫");
    assert_eq!(item.status, ItemStatus::Success);
    assert_eq!(h.provider.calls(), 1);
    assert_eq!(
        h.recorder.statuses_for(ids[0]),
        vec![ItemStatus::Translating, ItemStatus::Success]
    );
}

#[tokio::test(start_paused = true)]
async fn test_translate_failure_shouldNotRetry() {
    for provider in [MockProvider::failing(), MockProvider::rate_limited()] {
        let h = QueueHarness::new(provider, profile(1, 0));
        let ids = h.add_items(1);

        assert!(h.queue.translate(ids[0], "一只猫").await);

        assert_eq!(h.provider.calls(), 1);
        let item = h.store.get(ids[0]).unwrap();
        assert_eq!(item.status, ItemStatus::Error);
        assert!(item.error_message.is_some());
        assert!(h.recorder.throttle_events().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn test_translate_withEmptyText_shouldDoNothing() {
    let h = QueueHarness::new(MockProvider::working(), profile(1, 0));
    let ids = h.add_items(1);

    assert!(!h.queue.translate(ids[0], "   ").await);
    assert_eq!(h.provider.calls(), 0);
    assert!(h.recorder.events().is_empty());
}
