mod common;

use tokio::time::{sleep, Duration};

use common::fixtures;
use common::harness::{setup_full, setup_online};
use common::mocks::{MockConnectivityProbe, MockContractorApi, FAIL_ALWAYS};
use setsubi_sync::domain::conflict::ConflictStrategy;
use setsubi_sync::infrastructure::realtime::ChannelState;
use setsubi_sync::shared::error::{AppError, ErrorClass};

macro_rules! wait_until {
    ($what:expr, $cond:expr) => {{
        let mut satisfied = false;
        for _ in 0..200 {
            if $cond {
                satisfied = true;
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(satisfied, "timed out waiting for {}", $what);
    }};
}

#[tokio::test]
async fn test_first_load_fetches_and_caches() {
    let harness = setup_online().await;
    harness.service.load(true, false).await.unwrap();

    let snapshot = harness.service.snapshot().await;
    assert_eq!(snapshot.records.len(), 3);
    assert!(!snapshot.served_from_cache);
    assert!(!snapshot.is_offline);
    assert!(snapshot.error.is_none());
    assert!(snapshot.last_loaded_at.is_some());
    assert_eq!(snapshot.cache.count, 3);
    assert!(snapshot.cache.is_valid);
    assert_eq!(snapshot.summary.as_ref().unwrap().total, 3);
    assert_eq!(harness.api.list_calls(), 1);
    assert_eq!(harness.api.aggregate_calls(), 1);
    // 一覧と集計の 2 スナップショットが永続化される
    assert_eq!(harness.store.len().await, 2);

    harness.service.shutdown().await;
}

#[tokio::test]
async fn test_fresh_cache_short_circuits_network() {
    let harness = setup_online().await;
    harness.service.load(true, false).await.unwrap();
    harness.service.load(true, false).await.unwrap();

    assert_eq!(harness.api.list_calls(), 1);
    let snapshot = harness.service.snapshot().await;
    assert!(snapshot.served_from_cache);
    assert_eq!(snapshot.records.len(), 3);

    harness.service.shutdown().await;
}

#[tokio::test]
async fn test_force_refresh_bypasses_cache() {
    let harness = setup_online().await;
    harness.service.load(true, false).await.unwrap();
    harness.service.force_refresh().await.unwrap();

    assert_eq!(harness.api.list_calls(), 2);
    assert!(!harness.service.snapshot().await.served_from_cache);

    harness.service.shutdown().await;
}

#[tokio::test]
async fn test_offline_serves_valid_cache() {
    let harness = setup_online().await;
    harness.service.load(true, false).await.unwrap();
    assert_eq!(harness.api.list_calls(), 1);

    harness.probe.go_offline();
    wait_until!("monitor to notice offline", !harness.service.network_status().is_online);

    harness.service.load(true, false).await.unwrap();
    let snapshot = harness.service.snapshot().await;
    assert_eq!(harness.api.list_calls(), 1);
    assert!(snapshot.is_offline);
    assert!(snapshot.served_from_cache);
    assert_eq!(snapshot.records.len(), 3);

    harness.service.shutdown().await;
}

#[tokio::test]
async fn test_offline_with_expired_cache_fails() {
    let mut config = fixtures::test_config();
    config.cache.ttl_secs = 0;
    let harness = setup_full(
        MockContractorApi::with_records(fixtures::seed_records()),
        MockConnectivityProbe::online(),
        config,
        ConflictStrategy::default(),
    )
    .await;

    harness.service.load(true, false).await.unwrap();
    assert_eq!(harness.api.list_calls(), 1);

    harness.probe.go_offline();
    wait_until!("monitor to notice offline", !harness.service.network_status().is_online);

    let result = harness.service.load(true, false).await;
    assert!(matches!(result, Err(AppError::NoCachedData)));
    assert_eq!(harness.api.list_calls(), 1);

    // 直前に取得済みの一覧は画面に残り、エラーだけが積まれる
    let snapshot = harness.service.snapshot().await;
    assert_eq!(snapshot.records.len(), 3);
    assert!(snapshot.error.is_some());

    harness.service.shutdown().await;
}

#[tokio::test]
async fn test_offline_without_cache_surfaces_no_cached_data() {
    let harness = setup_full(
        MockContractorApi::with_records(fixtures::seed_records()),
        MockConnectivityProbe::offline(),
        fixtures::test_config(),
        ConflictStrategy::default(),
    )
    .await;

    let result = harness.service.load(true, false).await;
    assert!(matches!(result, Err(AppError::NoCachedData)));
    assert_eq!(harness.api.list_calls(), 0);

    let snapshot = harness.service.snapshot().await;
    assert!(snapshot.records.is_empty());
    let error = snapshot.error.expect("error should be surfaced");
    assert_eq!(error.class, ErrorClass::Network);

    harness.service.shutdown().await;
}

#[tokio::test]
async fn test_failed_fetch_keeps_cached_rows_on_screen() {
    let harness = setup_online().await;
    harness.service.load(true, false).await.unwrap();

    harness.api.put_record(fixtures::contractor(1, "Renamed Vendor")).await;
    harness.api.set_list_failures(FAIL_ALWAYS);
    let result = harness.service.force_refresh().await;
    assert!(matches!(result, Err(AppError::Network(_))));

    let snapshot = harness.service.snapshot().await;
    // 画面には取得失敗前のキャッシュが残る
    assert_eq!(snapshot.records.len(), 3);
    assert_eq!(snapshot.records[0].name, "Aoba Cleaning");
    assert!(snapshot.served_from_cache);
    assert!(snapshot.error.is_some());
    assert_eq!(snapshot.retry.attempts, 1);
    // 1 回の読み込みにつき即時リトライ 3 回
    assert_eq!(harness.api.list_calls(), 1 + 3);

    harness.service.shutdown().await;
}

#[tokio::test]
async fn test_retry_budget_enforced_then_reset() {
    let harness = setup_online().await;
    harness.api.set_list_failures(FAIL_ALWAYS);

    assert!(harness.service.load(true, false).await.is_err());
    assert!(harness.service.retry().await.is_err());
    assert!(harness.service.retry().await.is_err());
    assert_eq!(harness.service.snapshot().await.retry.attempts, 3);
    assert_eq!(harness.api.list_calls(), 9);

    // 残量ゼロでは API を呼ばずに拒否する
    let blocked = harness.service.retry().await;
    assert!(matches!(blocked, Err(AppError::Internal(_))));
    assert_eq!(harness.api.list_calls(), 9);

    harness.api.set_list_failures(0);
    harness.service.force_refresh().await.unwrap();
    let snapshot = harness.service.snapshot().await;
    assert_eq!(snapshot.retry.attempts, 0);
    assert_eq!(snapshot.records.len(), 3);

    harness.service.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_refreshes_automatically() {
    let harness = setup_online().await;
    harness.service.load(true, false).await.unwrap();
    assert_eq!(harness.api.list_calls(), 1);

    harness.probe.go_offline();
    wait_until!("monitor to notice offline", !harness.service.network_status().is_online);
    assert!(harness.service.snapshot().await.is_offline);

    harness.probe.go_online();
    wait_until!("refresh after reconnect", harness.api.list_calls() == 2);
    wait_until!("offline flag to clear", !harness.service.snapshot().await.is_offline);

    harness.service.shutdown().await;
}

#[tokio::test]
async fn test_stale_cache_triggers_background_refresh() {
    let mut config = fixtures::test_config();
    config.cache.staleness_threshold_secs = 0;
    let harness = setup_full(
        MockContractorApi::with_records(fixtures::seed_records()),
        MockConnectivityProbe::online(),
        config,
        ConflictStrategy::default(),
    )
    .await;

    harness.service.load(true, false).await.unwrap();
    harness.api.put_record(fixtures::contractor(1, "Aoba Renewed")).await;

    // キャッシュヒットで即応答しつつ、裏で取り直す
    harness.service.load(true, false).await.unwrap();
    assert!(harness.service.snapshot().await.served_from_cache);
    wait_until!(
        "background refresh to land",
        harness.service.records().await[0].name == "Aoba Renewed"
    );
    assert_eq!(harness.api.list_calls(), 2);

    harness.service.shutdown().await;
}

#[tokio::test]
async fn test_aggregate_failure_falls_back_to_local_summary() {
    let harness = setup_online().await;
    harness.api.set_aggregate_failures(FAIL_ALWAYS);

    harness.service.load(true, false).await.unwrap();
    let snapshot = harness.service.snapshot().await;
    let summary = snapshot.summary.expect("summary should be derived locally");
    assert_eq!(summary.total, 3);
    assert_eq!(summary.active, 3);
    // 集計はリトライせず一度だけ試す
    assert_eq!(harness.api.aggregate_calls(), 1);

    harness.service.shutdown().await;
}

#[tokio::test]
async fn test_later_load_supersedes_earlier() {
    let harness = setup_online().await;
    harness.api.set_list_delay_ms(150);

    let slow = tokio::spawn({
        let service = harness.service.clone();
        async move { service.load(false, false).await }
    });
    wait_until!("slow fetch to start", harness.api.list_calls() == 1);

    harness.api.set_list_delay_ms(0);
    harness.api.put_record(fixtures::contractor(4, "Mori Gardens")).await;
    harness.service.force_refresh().await.unwrap();
    assert_eq!(harness.service.records().await.len(), 4);

    // 先に走り出した読み込みは後勝ちで破棄される
    slow.await.unwrap().unwrap();
    assert_eq!(harness.service.records().await.len(), 4);

    harness.service.shutdown().await;
}

#[tokio::test]
async fn test_realtime_subscription_wiring_and_shutdown() {
    let harness = setup_online().await;
    harness.transport.wait_for_subscription().await;
    assert_eq!(harness.transport.subscribed_tables(), vec!["contractors"]);
    wait_until!(
        "channel to connect",
        harness.service.channel_state().await == ChannelState::Connected
    );

    harness.service.shutdown().await;
    assert_eq!(harness.transport.disposed_count(), 1);
}
