pub mod views;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::ports::{
    ConnectivityProbe, ContractorApi, RealtimeTransport, SnapshotStore,
};
use crate::domain::conflict::{validate_resolution, ConflictStrategy, DetectedConflict};
use crate::domain::entities::{Contractor, ContractorDraft, ContractorSummary, PendingOperations};
use crate::infrastructure::cache::{CacheStats, ContractorCacheStore};
use crate::infrastructure::network::{NetworkMonitor, NetworkStatus, RetryPolicy, RetryState};
use crate::infrastructure::realtime::{
    ChannelDiagnostics, ChannelMessage, ChannelState, ContractorRealtimeChannel,
};
use crate::shared::config::SyncConfig;
use crate::shared::error::{AppError, ErrorClass};

pub use views::{
    apply_filters, category_counts, expiring_soon, group_by_category, ContractorFilters,
    ExpiringContractor, FilterPatch,
};

/// 画面に出すエラーの要約。detail はログ・バグ報告向け
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncErrorInfo {
    pub class: ErrorClass,
    pub message: String,
    pub detail: String,
}

impl SyncErrorInfo {
    pub fn from_error(error: &AppError) -> Self {
        Self {
            class: error.classify(),
            message: error.user_message().to_string(),
            detail: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct LoadState {
    is_loading: bool,
    error: Option<SyncErrorInfo>,
    is_offline: bool,
    served_from_cache: bool,
    last_loaded_at: Option<DateTime<Utc>>,
}

/// ある時点の同期状態の読み取り専用ビュー
#[derive(Debug, Clone, Serialize)]
pub struct SyncSnapshot {
    pub records: Vec<Contractor>,
    pub filtered: Vec<Contractor>,
    pub summary: Option<ContractorSummary>,
    pub filters: ContractorFilters,
    pub expiring_soon: Vec<ExpiringContractor>,
    pub categories: BTreeMap<String, usize>,
    pub is_loading: bool,
    pub error: Option<SyncErrorInfo>,
    pub is_offline: bool,
    pub served_from_cache: bool,
    pub last_loaded_at: Option<DateTime<Utc>>,
    pub retry: RetryState,
    pub realtime: ChannelDiagnostics,
    pub cache: CacheStats,
    pub pending_operations: usize,
    pub pending_conflict: Option<DetectedConflict>,
}

/// 取得・キャッシュ・楽観的更新・リアルタイム反映をまとめる
/// コーディネーター。UI はここから snapshot を読むだけでよい
pub struct ContractorSyncService {
    api: Arc<dyn ContractorApi>,
    cache: Arc<ContractorCacheStore>,
    monitor: Arc<NetworkMonitor>,
    retry_policy: RetryPolicy,
    channel: Arc<ContractorRealtimeChannel>,
    pending: Arc<PendingOperations>,
    config: SyncConfig,
    records: Arc<RwLock<Vec<Contractor>>>,
    summary: Arc<RwLock<Option<ContractorSummary>>>,
    filters: Arc<RwLock<ContractorFilters>>,
    load_state: Arc<RwLock<LoadState>>,
    retry_state: Arc<RwLock<RetryState>>,
    pending_conflict: Arc<RwLock<Option<DetectedConflict>>>,
    fetch_generation: Arc<AtomicU64>,
    consumer_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    network_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    refresh_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Clone for ContractorSyncService {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            cache: self.cache.clone(),
            monitor: self.monitor.clone(),
            retry_policy: self.retry_policy,
            channel: self.channel.clone(),
            pending: self.pending.clone(),
            config: self.config.clone(),
            records: self.records.clone(),
            summary: self.summary.clone(),
            filters: self.filters.clone(),
            load_state: self.load_state.clone(),
            retry_state: self.retry_state.clone(),
            pending_conflict: self.pending_conflict.clone(),
            fetch_generation: self.fetch_generation.clone(),
            consumer_task: self.consumer_task.clone(),
            network_task: self.network_task.clone(),
            refresh_task: self.refresh_task.clone(),
        }
    }
}

impl ContractorSyncService {
    /// 依存を束ねて起動する。リアルタイム購読と回線監視もここで始まる
    pub async fn new(
        api: Arc<dyn ContractorApi>,
        transport: Arc<dyn RealtimeTransport>,
        probe: Arc<dyn ConnectivityProbe>,
        store: Arc<dyn SnapshotStore>,
        config: SyncConfig,
        strategy: ConflictStrategy,
    ) -> Self {
        let cache = Arc::new(ContractorCacheStore::new(store, &config.cache));
        let monitor = Arc::new(NetworkMonitor::start(probe).await);
        let retry_policy = RetryPolicy::new(&config.retry);
        let pending = Arc::new(PendingOperations::new(config.realtime.pending_ttl()));

        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let channel = Arc::new(ContractorRealtimeChannel::new(
            transport,
            pending.clone(),
            strategy,
            config.realtime.clone(),
            message_tx,
        ));

        let offline = !monitor.current().is_online;
        let service = Self {
            api,
            cache,
            monitor,
            retry_policy,
            channel,
            pending,
            retry_state: Arc::new(RwLock::new(RetryState::new(config.retry.max_attempts.max(1)))),
            config,
            records: Arc::new(RwLock::new(Vec::new())),
            summary: Arc::new(RwLock::new(None)),
            filters: Arc::new(RwLock::new(ContractorFilters::default())),
            load_state: Arc::new(RwLock::new(LoadState {
                is_offline: offline,
                ..LoadState::default()
            })),
            pending_conflict: Arc::new(RwLock::new(None)),
            fetch_generation: Arc::new(AtomicU64::new(0)),
            consumer_task: Arc::new(Mutex::new(None)),
            network_task: Arc::new(Mutex::new(None)),
            refresh_task: Arc::new(Mutex::new(None)),
        };
        service.spawn_message_consumer(message_rx).await;
        service.spawn_network_watcher().await;
        service.channel.connect().await;
        service
    }

    /// 契約一覧を読み込む。`use_cache` が真なら鮮度内のキャッシュを優先する
    pub async fn load(&self, use_cache: bool, is_retry: bool) -> Result<(), AppError> {
        {
            let mut state = self.load_state.write().await;
            state.is_loading = true;
        }
        if is_retry {
            self.retry_state.write().await.is_retrying = true;
        }

        let result = self.load_inner(use_cache).await;

        {
            let mut state = self.load_state.write().await;
            state.is_loading = false;
            state.error = result.as_ref().err().map(SyncErrorInfo::from_error);
        }
        {
            let mut retry = self.retry_state.write().await;
            retry.is_retrying = false;
            match &result {
                Ok(()) => retry.reset(),
                Err(_) => retry.record_failure(),
            }
        }
        result
    }

    /// 失敗した読み込みをやり直す。残回数が尽きていたら拒否する
    pub async fn retry(&self) -> Result<(), AppError> {
        if !self.retry_state.read().await.can_retry() {
            warn!("Retry requested with no attempts remaining");
            return Err(AppError::Internal(
                "Retry limit reached; use force refresh".to_string(),
            ));
        }
        self.load(false, true).await
    }

    /// キャッシュを無視してサーバーから取り直す
    pub async fn force_refresh(&self) -> Result<(), AppError> {
        info!("Force refresh requested");
        self.load(false, false).await
    }

    /// 自動再接続が打ち切られた購読を手動で立て直す
    pub async fn reconnect_realtime(&self) {
        self.channel.reconnect().await;
    }

    async fn load_inner(&self, use_cache: bool) -> Result<(), AppError> {
        if !self.monitor.current().is_online {
            return self.load_offline().await;
        }

        if use_cache {
            if let Some(records) = self.cache.load().await {
                debug!("Serving {} contractors from cache", records.len());
                let summary = match self.cache.load_summary().await {
                    Some(summary) => summary,
                    None => ContractorSummary::derive(&records, Utc::now().date_naive()),
                };
                self.commit(records, Some(summary), true, false).await;
                self.maybe_refresh_in_background().await;
                return Ok(());
            }
        }
        self.fetch_from_network().await
    }

    /// オフライン時は有効なキャッシュだけを出す。出せなければ明示的に失敗
    async fn load_offline(&self) -> Result<(), AppError> {
        match self.cache.load().await {
            Some(records) => {
                info!("Offline: serving {} contractors from cache", records.len());
                let summary = match self.cache.load_summary().await {
                    Some(summary) => summary,
                    None => ContractorSummary::derive(&records, Utc::now().date_naive()),
                };
                self.commit(records, Some(summary), true, true).await;
                Ok(())
            }
            None => {
                warn!("Offline with no usable cache");
                Err(AppError::NoCachedData)
            }
        }
    }

    async fn fetch_from_network(&self) -> Result<(), AppError> {
        let generation = self.fetch_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let api = self.api.clone();
        let fetched = self
            .retry_policy
            .with_retry("contractor fetch", move || {
                let api = api.clone();
                async move { api.list().await }
            })
            .await;

        // 後続の読み込みに追い越された結果は捨てる
        if self.fetch_generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding superseded fetch result (generation {})", generation);
            return Ok(());
        }

        match fetched {
            Ok(records) => {
                let fallback = ContractorSummary::derive(&records, Utc::now().date_naive());
                let api = self.api.clone();
                let summary = self
                    .retry_policy
                    .with_fallback("contractor aggregate", fallback, move || async move {
                        api.aggregate().await
                    })
                    .await;

                self.cache.save(&records).await;
                self.cache.save_summary(&summary).await;
                info!("Loaded {} contractors from network", records.len());
                self.commit(records, Some(summary), false, false).await;
                Ok(())
            }
            Err(e) => {
                // ネットワーク全滅でも鮮度切れキャッシュがあれば画面は保つ
                if let Some(stale) = self.cache.load_stale().await {
                    warn!(
                        "Fetch failed; keeping {} cached contractors on screen: {}",
                        stale.len(),
                        e
                    );
                    let summary = ContractorSummary::derive(&stale, Utc::now().date_naive());
                    self.commit(stale, Some(summary), true, false).await;
                } else {
                    warn!("Fetch failed with no cache fallback: {}", e);
                }
                Err(e)
            }
        }
    }

    async fn commit(
        &self,
        records: Vec<Contractor>,
        summary: Option<ContractorSummary>,
        from_cache: bool,
        offline: bool,
    ) {
        *self.records.write().await = records;
        if let Some(summary) = summary {
            *self.summary.write().await = Some(summary);
        }
        let mut state = self.load_state.write().await;
        state.served_from_cache = from_cache;
        state.is_offline = offline;
        state.last_loaded_at = Some(Utc::now());
    }

    /// キャッシュ提供後、古さが閾値を超えていたら裏でサーバー取得を走らせる
    async fn maybe_refresh_in_background(&self) {
        let stats = self.cache.stats().await;
        let threshold_minutes = (self.config.cache.staleness_threshold_secs / 60) as i64;
        let Some(age) = stats.age_minutes else {
            return;
        };
        if age < threshold_minutes {
            return;
        }

        let mut slot = self.refresh_task.lock().await;
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                debug!("Background refresh already running");
                return;
            }
        }
        debug!("Cache is {} minutes old, refreshing in background", age);
        let service = self.clone();
        *slot = Some(tokio::spawn(async move {
            if let Err(e) = service.fetch_from_network().await {
                warn!("Background refresh failed: {}", e);
            }
        }));
    }

    /// 新規契約を登録する。成功した行だけを一覧とキャッシュに足す
    pub async fn add_local(&self, draft: ContractorDraft) -> Result<Contractor, AppError> {
        draft.validate()?;

        let api = self.api.clone();
        let outbound = draft.clone();
        let created = self
            .retry_policy
            .with_retry("contractor create", move || {
                let api = api.clone();
                let draft = outbound.clone();
                async move { api.create(draft).await }
            })
            .await;

        match created {
            Ok(created) => {
                {
                    let mut records = self.records.write().await;
                    upsert(&mut records, created.clone());
                }
                self.persist_records_to_cache().await;
                self.refresh_local_summary().await;
                info!("Created contractor {} ({})", created.id, created.name);
                Ok(created)
            }
            Err(e) => {
                self.record_mutation_error(&e).await;
                Err(e)
            }
        }
    }

    /// 楽観的更新。先に画面へ反映し、サーバーが拒否したら元の行へ戻す
    pub async fn update_local(&self, record: Contractor) -> Result<Contractor, AppError> {
        record.validate()?;

        let prior = {
            let records = self.records.read().await;
            records.iter().find(|r| r.id == record.id).cloned()
        };
        let Some(prior) = prior else {
            return Err(AppError::NotFound(format!(
                "Contractor {} is not loaded",
                record.id
            )));
        };

        {
            let mut records = self.records.write().await;
            upsert(&mut records, record.clone());
        }
        let op_id = self.pending.register(record.clone()).await;
        debug!("Optimistically applied contractor {} (op {})", record.id, op_id);

        let api = self.api.clone();
        let outbound = record.clone();
        let result = self
            .retry_policy
            .with_retry("contractor update", move || {
                let api = api.clone();
                let record = outbound.clone();
                async move { api.update(record.id, record).await }
            })
            .await;

        match result {
            Ok(confirmed) => {
                self.pending.clear(record.id).await;
                {
                    let mut records = self.records.write().await;
                    upsert(&mut records, confirmed.clone());
                }
                self.cache.invalidate(Some(record.id)).await;
                self.refresh_local_summary().await;
                info!("Update of contractor {} confirmed", record.id);
                Ok(confirmed)
            }
            Err(e) => {
                warn!("Update of contractor {} failed, rolling back: {}", record.id, e);
                self.pending.clear(record.id).await;
                {
                    let mut records = self.records.write().await;
                    upsert(&mut records, prior);
                }
                self.refresh_local_summary().await;
                self.record_mutation_error(&e).await;
                Err(e)
            }
        }
    }

    /// 楽観的削除。失敗したら元の位置へ差し戻す
    pub async fn remove_local(&self, id: i64) -> Result<(), AppError> {
        let removed = {
            let records = self.records.read().await;
            records
                .iter()
                .position(|r| r.id == id)
                .map(|index| (index, records[index].clone()))
        };
        let Some((index, prior)) = removed else {
            return Err(AppError::NotFound(format!("Contractor {id} is not loaded")));
        };

        {
            let mut records = self.records.write().await;
            records.retain(|r| r.id != id);
        }

        let api = self.api.clone();
        let result = self
            .retry_policy
            .with_retry("contractor delete", move || {
                let api = api.clone();
                async move { api.delete(id).await }
            })
            .await;

        match result {
            Ok(()) => {
                self.persist_records_to_cache().await;
                self.refresh_local_summary().await;
                info!("Deleted contractor {}", id);
                Ok(())
            }
            Err(e) => {
                warn!("Delete of contractor {} failed, restoring row: {}", id, e);
                {
                    let mut records = self.records.write().await;
                    let index = index.min(records.len());
                    records.insert(index, prior);
                }
                self.refresh_local_summary().await;
                self.record_mutation_error(&e).await;
                Err(e)
            }
        }
    }

    /// 絞り込み条件を丸ごと差し替えて適用結果を返す
    pub async fn search(&self, filters: ContractorFilters) -> Vec<Contractor> {
        *self.filters.write().await = filters;
        self.filtered_records().await
    }

    /// 条件の一部だけを書き換えて適用結果を返す
    pub async fn update_filters(&self, patch: FilterPatch) -> Vec<Contractor> {
        self.filters.write().await.apply(patch);
        self.filtered_records().await
    }

    pub async fn filtered_records(&self) -> Vec<Contractor> {
        let filters = self.filters.read().await.clone();
        let records = self.records.read().await;
        apply_filters(&records, &filters)
    }

    /// 利用者が組んだマージ案で保留中の競合を確定する
    ///
    /// id と監査列はサーバー版の値に揃える。検証に落ちた場合は
    /// 競合を保留のまま残してエラーを返す
    pub async fn resolve_conflict(&self, resolution: Contractor) -> Result<Contractor, AppError> {
        let conflict = self.pending_conflict.read().await.clone();
        let Some(conflict) = conflict else {
            return Err(AppError::NotFound(
                "No conflict awaiting resolution".to_string(),
            ));
        };

        let mut merged = resolution;
        merged.id = conflict.server.id;
        merged.created_at = conflict.server.created_at;
        merged.updated_at = conflict.server.updated_at;
        validate_resolution(&merged)?;

        {
            let mut records = self.records.write().await;
            upsert(&mut records, merged.clone());
        }
        *self.pending_conflict.write().await = None;
        self.cache.invalidate(Some(merged.id)).await;
        self.refresh_local_summary().await;
        info!("Conflict on contractor {} resolved by user", merged.id);
        Ok(merged)
    }

    /// 保留中の競合を取り下げ、サーバー版で上書きする
    pub async fn cancel_conflict(&self) -> Result<(), AppError> {
        let conflict = self.pending_conflict.write().await.take();
        let Some(conflict) = conflict else {
            return Err(AppError::NotFound(
                "No conflict awaiting resolution".to_string(),
            ));
        };

        {
            let mut records = self.records.write().await;
            upsert(&mut records, conflict.server.clone());
        }
        self.refresh_local_summary().await;
        info!(
            "Conflict on contractor {} cancelled, keeping server version",
            conflict.server.id
        );
        Ok(())
    }

    /// 現在の同期状態を一括で読み出す
    pub async fn snapshot(&self) -> SyncSnapshot {
        let records = self.records.read().await.clone();
        let filters = self.filters.read().await.clone();
        let filtered = apply_filters(&records, &filters);
        let today = Utc::now().date_naive();
        let load_state = self.load_state.read().await.clone();

        SyncSnapshot {
            expiring_soon: expiring_soon(&records, today),
            categories: category_counts(&records),
            filtered,
            records,
            summary: self.summary.read().await.clone(),
            filters,
            is_loading: load_state.is_loading,
            error: load_state.error,
            is_offline: load_state.is_offline,
            served_from_cache: load_state.served_from_cache,
            last_loaded_at: load_state.last_loaded_at,
            retry: *self.retry_state.read().await,
            realtime: self.channel.diagnostics().await,
            cache: self.cache.stats().await,
            pending_operations: self.pending.len().await,
            pending_conflict: self.pending_conflict.read().await.clone(),
        }
    }

    pub async fn records(&self) -> Vec<Contractor> {
        self.records.read().await.clone()
    }

    pub async fn summary(&self) -> Option<ContractorSummary> {
        self.summary.read().await.clone()
    }

    pub async fn pending_conflict(&self) -> Option<DetectedConflict> {
        self.pending_conflict.read().await.clone()
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.monitor.current()
    }

    pub async fn channel_state(&self) -> ChannelState {
        self.channel.state().await
    }

    /// 購読・監視・裏タスクを全部止める
    pub async fn shutdown(&self) {
        self.channel.disconnect().await;
        for slot in [&self.refresh_task, &self.network_task, &self.consumer_task] {
            if let Some(handle) = slot.lock().await.take() {
                handle.abort();
            }
        }
        self.monitor.shutdown().await;
        debug!("Contractor sync service stopped");
    }

    async fn spawn_message_consumer(&self, mut rx: mpsc::UnboundedReceiver<ChannelMessage>) {
        let service = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                service.apply_channel_message(message).await;
            }
        });
        *self.consumer_task.lock().await = Some(handle);
    }

    /// 回線の復帰を見張り、オンラインへ戻った時点で取り直す
    async fn spawn_network_watcher(&self) {
        let service = self.clone();
        let mut updates = self.monitor.subscribe();
        let mut was_online = self.monitor.current().is_online;
        let handle = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let status = *updates.borrow();
                {
                    let mut state = service.load_state.write().await;
                    state.is_offline = !status.is_online;
                }
                if status.is_online && !was_online {
                    info!("Connectivity restored, refreshing contractors");
                    if let Err(e) = service.fetch_from_network().await {
                        warn!("Refresh after reconnect failed: {}", e);
                    }
                }
                was_online = status.is_online;
            }
        });
        *self.network_task.lock().await = Some(handle);
    }

    /// チャンネル確定イベントを到着順に一覧へ畳み込む
    async fn apply_channel_message(&self, message: ChannelMessage) {
        match message {
            ChannelMessage::Inserted(record) => {
                debug!("Realtime insert for contractor {}", record.id);
                let mut records = self.records.write().await;
                upsert(&mut records, record);
                drop(records);
                self.refresh_local_summary().await;
            }
            ChannelMessage::Updated(record) => {
                debug!("Realtime update for contractor {}", record.id);
                let mut records = self.records.write().await;
                upsert(&mut records, record);
                drop(records);
                self.refresh_local_summary().await;
            }
            ChannelMessage::UpdatedWithConflict(resolved) => {
                info!(
                    "Applying auto-resolved conflict for contractor {}",
                    resolved.merged.id
                );
                let mut records = self.records.write().await;
                upsert(&mut records, resolved.merged.clone());
                drop(records);
                self.refresh_local_summary().await;
            }
            ChannelMessage::ConflictAwaitingUser(detected) => {
                *self.pending_conflict.write().await = Some(*detected);
            }
            ChannelMessage::ConflictResolutionRejected { server, reason } => {
                let error = AppError::ConflictValidation(reason);
                self.record_mutation_error(&error).await;
                let mut records = self.records.write().await;
                upsert(&mut records, *server);
                drop(records);
                self.refresh_local_summary().await;
            }
            ChannelMessage::Deleted(id) => {
                debug!("Realtime delete for contractor {}", id);
                {
                    let mut records = self.records.write().await;
                    records.retain(|r| r.id != id);
                }
                // 消えた行の競合は判断待ちにしておく意味がない
                let mut conflict = self.pending_conflict.write().await;
                if conflict.as_ref().is_some_and(|c| c.server.id == id) {
                    *conflict = None;
                }
                drop(conflict);
                self.refresh_local_summary().await;
            }
        }
    }

    async fn refresh_local_summary(&self) {
        let summary = {
            let records = self.records.read().await;
            ContractorSummary::derive(&records, Utc::now().date_naive())
        };
        *self.summary.write().await = Some(summary);
    }

    async fn persist_records_to_cache(&self) {
        let records = self.records.read().await.clone();
        self.cache.save(&records).await;
    }

    async fn record_mutation_error(&self, error: &AppError) {
        self.load_state.write().await.error = Some(SyncErrorInfo::from_error(error));
    }
}

/// id が一致する行はその場で置き換え、無ければ末尾に足す
fn upsert(records: &mut Vec<Contractor>, record: Contractor) {
    match records.iter_mut().find(|existing| existing.id == record.id) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}
