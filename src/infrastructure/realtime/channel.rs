use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::application::ports::realtime::{
    ChangeKind, RealtimeSubscription, RealtimeTransport, RowChange,
};
use crate::domain::conflict::{
    detect_conflicts, resolve, ConflictStrategy, DetectedConflict, Resolution, ResolvedConflict,
};
use crate::domain::entities::{Contractor, PendingOperations};
use crate::shared::config::RealtimeConfig;
use crate::shared::error::AppError;
use crate::shared::metrics::{ChannelCounterSnapshot, ChannelCounters};

pub const CONTRACTORS_TABLE: &str = "contractors";

/// 購読の接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
        }
    }
}

/// id ごとに観測した最後の行イベント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecentRowEvent {
    pub kind: ChangeKind,
    pub observed_at: DateTime<Utc>,
}

/// チャンネルからコーディネーターへ流す確定済みイベント
#[derive(Debug, Clone)]
pub enum ChannelMessage {
    Inserted(Contractor),
    /// 競合なし。サーバー版をそのまま適用してよい
    Updated(Contractor),
    /// 自動戦略で解決済み
    UpdatedWithConflict(Box<ResolvedConflict>),
    /// interactive 戦略。利用者の判断待ち
    ConflictAwaitingUser(Box<DetectedConflict>),
    /// マージ結果が検証に落ちた。サーバー版を維持する
    ConflictResolutionRejected {
        server: Box<Contractor>,
        reason: String,
    },
    Deleted(i64),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelDiagnostics {
    pub state: ChannelState,
    pub consecutive_failures: u32,
    pub auto_reconnect_exhausted: bool,
    pub tracked_ids: usize,
    pub events: ChannelCounterSnapshot,
}

/// 行イベントを検証・照合して型付きメッセージへ変換する
#[derive(Clone)]
struct EventDispatcher {
    pending: Arc<PendingOperations>,
    strategy: ConflictStrategy,
    counters: Arc<ChannelCounters>,
    latest_events: Arc<RwLock<HashMap<i64, RecentRowEvent>>>,
    message_tx: mpsc::UnboundedSender<ChannelMessage>,
}

impl EventDispatcher {
    async fn dispatch(&self, change: RowChange) {
        match change.kind {
            ChangeKind::Insert => match Self::parse_row(change.new_row.as_ref()) {
                Ok(record) => {
                    self.accept(record.id, ChangeKind::Insert, change.observed_at).await;
                    self.emit(ChannelMessage::Inserted(record));
                }
                Err(e) => self.reject(ChangeKind::Insert, &e),
            },
            ChangeKind::Update => match Self::parse_row(change.new_row.as_ref()) {
                Ok(record) => {
                    self.accept(record.id, ChangeKind::Update, change.observed_at).await;
                    self.handle_update(record).await;
                }
                Err(e) => self.reject(ChangeKind::Update, &e),
            },
            ChangeKind::Delete => match Self::row_id(change.old_row.as_ref()) {
                Some(id) => {
                    self.accept(id, ChangeKind::Delete, change.observed_at).await;
                    // 消えた行の楽観的更新は照合しようがない
                    self.pending.clear(id).await;
                    self.emit(ChannelMessage::Deleted(id));
                }
                None => self.reject(
                    ChangeKind::Delete,
                    &AppError::Validation("Delete event without row id".to_string()),
                ),
            },
        }
    }

    /// pending 登録と突き合わせ、必要なら競合解決まで済ませる
    async fn handle_update(&self, server: Contractor) {
        let Some(operation) = self.pending.take(server.id).await else {
            self.emit(ChannelMessage::Updated(server));
            return;
        };

        let client = operation.local_record;
        let report = detect_conflicts(&server, &client);
        if !report.has_conflict() {
            debug!(
                "Pending update {} already reflected in server row {}",
                operation.op_id, server.id
            );
            self.emit(ChannelMessage::Updated(server));
            return;
        }

        let conflicting = report.conflicting_fields().len();
        match resolve(&server, &client, report, &self.strategy, Utc::now().date_naive()) {
            Ok(Resolution::Merged(resolved)) => {
                info!(
                    "Auto-resolved conflict on contractor {} ({} fields, {})",
                    server.id,
                    conflicting,
                    self.strategy.as_str()
                );
                self.emit(ChannelMessage::UpdatedWithConflict(Box::new(resolved)));
            }
            Ok(Resolution::Deferred(detected)) => {
                warn!(
                    "Conflict on contractor {} needs a user decision ({} fields)",
                    detected.server.id, conflicting
                );
                self.emit(ChannelMessage::ConflictAwaitingUser(Box::new(detected)));
            }
            Err(e) => {
                warn!(
                    "Dropping invalid conflict resolution for contractor {}: {}",
                    server.id, e
                );
                self.emit(ChannelMessage::ConflictResolutionRejected {
                    server: Box::new(server),
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn accept(&self, id: i64, kind: ChangeKind, observed_at: DateTime<Utc>) {
        self.counters.record_accepted();
        self.latest_events
            .write()
            .await
            .insert(id, RecentRowEvent { kind, observed_at });
    }

    fn reject(&self, kind: ChangeKind, error: &AppError) {
        self.counters.record_rejected();
        warn!("Skipping malformed realtime {} event: {}", kind.as_str(), error);
    }

    fn emit(&self, message: ChannelMessage) {
        if self.message_tx.send(message).is_err() {
            debug!("Realtime consumer dropped; event discarded");
        }
    }

    fn parse_row(row: Option<&Value>) -> Result<Contractor, AppError> {
        let Some(row) = row else {
            return Err(AppError::Validation("Row payload missing".to_string()));
        };
        Contractor::from_row_value(row)
    }

    fn row_id(row: Option<&Value>) -> Option<i64> {
        row.and_then(|row| row.get("id")).and_then(Value::as_i64)
    }
}

/// 接続ループが共有する可変部分
#[derive(Clone)]
struct ChannelRuntime {
    transport: Arc<dyn RealtimeTransport>,
    dispatcher: EventDispatcher,
    state: Arc<RwLock<ChannelState>>,
    consecutive_failures: Arc<AtomicU32>,
    exhausted: Arc<AtomicBool>,
    config: RealtimeConfig,
}

impl ChannelRuntime {
    async fn set_state(&self, next: ChannelState) {
        *self.state.write().await = next;
    }

    /// 購読を一本だけ維持する。切断のたびに固定間隔で繋ぎ直し、
    /// 連続失敗が上限に達したら自動再接続を止める
    async fn run(self) {
        loop {
            self.set_state(ChannelState::Connecting).await;
            let subscribed = self
                .transport
                .subscribe(
                    CONTRACTORS_TABLE,
                    &[ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete],
                )
                .await;

            match subscribed {
                Ok(RealtimeSubscription { mut events, disposer }) => {
                    self.set_state(ChannelState::Connected).await;
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    info!("Realtime channel connected to {}", CONTRACTORS_TABLE);

                    while let Some(change) = events.next().await {
                        self.dispatcher.dispatch(change).await;
                    }

                    disposer.dispose();
                    warn!("Realtime stream ended");
                }
                Err(e) => {
                    warn!("Realtime subscribe failed: {}", e);
                }
            }

            self.set_state(ChannelState::Disconnected).await;
            let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            if failures >= self.config.max_reconnect_attempts {
                self.exhausted.store(true, Ordering::SeqCst);
                warn!(
                    "Stopping automatic reconnects after {} consecutive failures",
                    failures
                );
                return;
            }
            debug!(
                "Reconnecting in {}s (failure {}/{})",
                self.config.reconnect_interval_secs, failures, self.config.max_reconnect_attempts
            );
            sleep(self.config.reconnect_interval()).await;
        }
    }
}

/// contractors テーブルのリアルタイム購読チャンネル
///
/// 接続管理は取得経路から独立して動く。イベントは検証済みの
/// [`ChannelMessage`] として渡した送信口へ流れる
pub struct ContractorRealtimeChannel {
    runtime: ChannelRuntime,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl ContractorRealtimeChannel {
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        pending: Arc<PendingOperations>,
        strategy: ConflictStrategy,
        config: RealtimeConfig,
        message_tx: mpsc::UnboundedSender<ChannelMessage>,
    ) -> Self {
        let dispatcher = EventDispatcher {
            pending,
            strategy,
            counters: Arc::new(ChannelCounters::new()),
            latest_events: Arc::new(RwLock::new(HashMap::new())),
            message_tx,
        };
        Self {
            runtime: ChannelRuntime {
                transport,
                dispatcher,
                state: Arc::new(RwLock::new(ChannelState::Disconnected)),
                consecutive_failures: Arc::new(AtomicU32::new(0)),
                exhausted: Arc::new(AtomicBool::new(false)),
                config,
            },
            runner: Mutex::new(None),
        }
    }

    /// 接続ループを起動する。稼働中なら何もしない
    pub async fn connect(&self) {
        let mut runner = self.runner.lock().await;
        if let Some(handle) = runner.as_ref() {
            if !handle.is_finished() {
                debug!("Realtime channel already running");
                return;
            }
        }
        *runner = Some(tokio::spawn(self.runtime.clone().run()));
    }

    /// 手動再接続。失敗カウンタを巻き戻してループを立て直す
    pub async fn reconnect(&self) {
        self.runtime.consecutive_failures.store(0, Ordering::SeqCst);
        self.runtime.exhausted.store(false, Ordering::SeqCst);
        info!("Manual realtime reconnect requested");
        self.connect().await;
    }

    /// 購読と再接続予定を落とす。何度呼んでも安全
    pub async fn disconnect(&self) {
        if let Some(handle) = self.runner.lock().await.take() {
            handle.abort();
            // 破棄が走り切るのを待つ。購読解除フックもここで発火する
            let _ = handle.await;
        }
        self.runtime.set_state(ChannelState::Disconnected).await;
        self.runtime.dispatcher.latest_events.write().await.clear();
        debug!("Realtime channel disconnected");
    }

    pub async fn state(&self) -> ChannelState {
        *self.runtime.state.read().await
    }

    pub async fn latest_event(&self, id: i64) -> Option<RecentRowEvent> {
        self.runtime.dispatcher.latest_events.read().await.get(&id).copied()
    }

    pub async fn diagnostics(&self) -> ChannelDiagnostics {
        ChannelDiagnostics {
            state: self.state().await,
            consecutive_failures: self.runtime.consecutive_failures.load(Ordering::SeqCst),
            auto_reconnect_exhausted: self.runtime.exhausted.load(Ordering::SeqCst),
            tracked_ids: self.runtime.dispatcher.latest_events.read().await.len(),
            events: self.runtime.dispatcher.counters.snapshot(),
        }
    }
}
