use std::sync::Arc;

use setsubi_sync::application::services::contractor_sync::ContractorSyncService;
use setsubi_sync::domain::conflict::ConflictStrategy;
use setsubi_sync::infrastructure::storage::MemorySnapshotStore;
use setsubi_sync::shared::config::SyncConfig;

use crate::common::fixtures;
use crate::common::mocks::{MockConnectivityProbe, MockContractorApi, MockRealtimeTransport};

pub struct Harness {
    pub service: ContractorSyncService,
    pub api: Arc<MockContractorApi>,
    pub transport: Arc<MockRealtimeTransport>,
    pub probe: Arc<MockConnectivityProbe>,
    pub store: Arc<MemorySnapshotStore>,
}

pub async fn setup_full(
    api: MockContractorApi,
    probe: MockConnectivityProbe,
    config: SyncConfig,
    strategy: ConflictStrategy,
) -> Harness {
    let api = Arc::new(api);
    let transport = Arc::new(MockRealtimeTransport::new());
    let probe = Arc::new(probe);
    let store = Arc::new(MemorySnapshotStore::new());
    let service = ContractorSyncService::new(
        api.clone(),
        transport.clone(),
        probe.clone(),
        store.clone(),
        config,
        strategy,
    )
    .await;
    Harness {
        service,
        api,
        transport,
        probe,
        store,
    }
}

/// 既定の 3 件入り・オンライン・SmartMerge 構成
pub async fn setup_online() -> Harness {
    setup_full(
        MockContractorApi::with_records(fixtures::seed_records()),
        MockConnectivityProbe::online(),
        fixtures::test_config(),
        ConflictStrategy::default(),
    )
    .await
}
