use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};

use setsubi_sync::application::ports::{
    ChangeKind, ConnectivityProbe, ConnectivitySignal, ContractorApi, RealtimeDisposer,
    RealtimeSubscription, RealtimeTransport, RowChange,
};
use setsubi_sync::domain::entities::{Contractor, ContractorDraft, ContractorSummary};
use setsubi_sync::shared::error::AppError;

/// 失敗カウンタに使う「回復しない」値
pub const FAIL_ALWAYS: u32 = u32::MAX;

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

async fn maybe_delay(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        sleep(Duration::from_millis(ms)).await;
    }
}

/// インメモリのサーバー代替。呼び出し回数と失敗注入を持つ
pub struct MockContractorApi {
    records: RwLock<Vec<Contractor>>,
    next_id: AtomicI64,
    pub list_calls: AtomicU32,
    pub create_calls: AtomicU32,
    pub update_calls: AtomicU32,
    pub delete_calls: AtomicU32,
    pub aggregate_calls: AtomicU32,
    list_failures: AtomicU32,
    create_failures: AtomicU32,
    update_failures: AtomicU32,
    delete_failures: AtomicU32,
    aggregate_failures: AtomicU32,
    list_delay_ms: AtomicU64,
    update_delay_ms: AtomicU64,
}

impl MockContractorApi {
    pub fn with_records(records: Vec<Contractor>) -> Self {
        Self {
            records: RwLock::new(records),
            next_id: AtomicI64::new(1000),
            list_calls: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
            delete_calls: AtomicU32::new(0),
            aggregate_calls: AtomicU32::new(0),
            list_failures: AtomicU32::new(0),
            create_failures: AtomicU32::new(0),
            update_failures: AtomicU32::new(0),
            delete_failures: AtomicU32::new(0),
            aggregate_failures: AtomicU32::new(0),
            list_delay_ms: AtomicU64::new(0),
            update_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn set_list_failures(&self, count: u32) {
        self.list_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_create_failures(&self, count: u32) {
        self.create_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_update_failures(&self, count: u32) {
        self.update_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_delete_failures(&self, count: u32) {
        self.delete_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_aggregate_failures(&self, count: u32) {
        self.aggregate_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_list_delay_ms(&self, ms: u64) {
        self.list_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn set_update_delay_ms(&self, ms: u64) {
        self.update_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn aggregate_calls(&self) -> u32 {
        self.aggregate_calls.load(Ordering::SeqCst)
    }

    /// サーバー側のデータを直接差し替える
    pub async fn put_record(&self, record: Contractor) {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    pub async fn server_records(&self) -> Vec<Contractor> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl ContractorApi for MockContractorApi {
    async fn list(&self) -> Result<Vec<Contractor>, AppError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        // 呼び出し時点の内容を固定してから遅延させる
        let records = self.records.read().await.clone();
        maybe_delay(&self.list_delay_ms).await;
        if take_failure(&self.list_failures) {
            return Err(AppError::Network("simulated list failure".to_string()));
        }
        Ok(records)
    }

    async fn create(&self, draft: ContractorDraft) -> Result<Contractor, AppError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.create_failures) {
            return Err(AppError::Network("simulated create failure".to_string()));
        }
        let now = Utc::now();
        let created = Contractor {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: draft.name,
            service_description: draft.service_description,
            notes: draft.notes,
            status: draft.status,
            kind: draft.kind,
            start_date: draft.start_date,
            end_date: draft.end_date,
            monthly_amount: draft.monthly_amount,
            yearly_amount: draft.yearly_amount,
            created_at: now,
            updated_at: now,
        };
        self.records.write().await.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, record: Contractor) -> Result<Contractor, AppError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        maybe_delay(&self.update_delay_ms).await;
        if take_failure(&self.update_failures) {
            return Err(AppError::Network("simulated update failure".to_string()));
        }
        let mut records = self.records.write().await;
        let Some(existing) = records.iter_mut().find(|r| r.id == id) else {
            return Err(AppError::NotFound(format!("contractor {id}")));
        };
        let mut confirmed = record;
        confirmed.id = id;
        confirmed.created_at = existing.created_at;
        confirmed.updated_at = Utc::now();
        *existing = confirmed.clone();
        Ok(confirmed)
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.delete_failures) {
            return Err(AppError::Network("simulated delete failure".to_string()));
        }
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(AppError::NotFound(format!("contractor {id}")));
        }
        Ok(())
    }

    async fn aggregate(&self) -> Result<ContractorSummary, AppError> {
        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.aggregate_failures) {
            return Err(AppError::Server("simulated aggregate failure".to_string()));
        }
        let records = self.records.read().await;
        Ok(ContractorSummary::derive(&records, Utc::now().date_naive()))
    }
}

/// 購読口の代替。テストから行イベントを流し込める
pub struct MockRealtimeTransport {
    event_tx: StdMutex<Option<futures::channel::mpsc::UnboundedSender<RowChange>>>,
    subscribed_tables: StdMutex<Vec<String>>,
    subscribe_calls: AtomicU32,
    subscribe_failures: AtomicU32,
    disposed: Arc<AtomicU32>,
}

impl MockRealtimeTransport {
    pub fn new() -> Self {
        Self {
            event_tx: StdMutex::new(None),
            subscribed_tables: StdMutex::new(Vec::new()),
            subscribe_calls: AtomicU32::new(0),
            subscribe_failures: AtomicU32::new(0),
            disposed: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn set_subscribe_failures(&self, count: u32) {
        self.subscribe_failures.store(count, Ordering::SeqCst);
    }

    pub fn subscribe_calls(&self) -> u32 {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn disposed_count(&self) -> u32 {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn subscribed_tables(&self) -> Vec<String> {
        self.subscribed_tables.lock().unwrap().clone()
    }

    pub fn push(&self, change: RowChange) {
        let tx = self.event_tx.lock().unwrap();
        tx.as_ref()
            .expect("no active subscription")
            .unbounded_send(change)
            .expect("subscription stream closed");
    }

    /// サーバー側から切られた状況を作る
    pub fn close_stream(&self) {
        *self.event_tx.lock().unwrap() = None;
    }

    /// 接続ループが購読を張るまで待つ
    pub async fn wait_for_subscription(&self) {
        for _ in 0..200 {
            if self.event_tx.lock().unwrap().is_some() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("transport was never subscribed");
    }
}

impl Default for MockRealtimeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeTransport for MockRealtimeTransport {
    async fn subscribe(
        &self,
        table: &str,
        _kinds: &[ChangeKind],
    ) -> Result<RealtimeSubscription, AppError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.subscribe_failures) {
            return Err(AppError::Network("simulated subscribe failure".to_string()));
        }
        self.subscribed_tables.lock().unwrap().push(table.to_string());

        let (tx, rx) = futures::channel::mpsc::unbounded();
        *self.event_tx.lock().unwrap() = Some(tx);
        let disposed = self.disposed.clone();
        Ok(RealtimeSubscription {
            events: Box::pin(rx),
            disposer: RealtimeDisposer::new(move || {
                disposed.fetch_add(1, Ordering::SeqCst);
            }),
        })
    }
}

/// 回線状態の代替。テストからオン・オフを切り替える
pub struct MockConnectivityProbe {
    current: StdMutex<ConnectivitySignal>,
    feed_tx: futures::channel::mpsc::UnboundedSender<ConnectivitySignal>,
    feed_rx: StdMutex<Option<futures::channel::mpsc::UnboundedReceiver<ConnectivitySignal>>>,
}

impl MockConnectivityProbe {
    pub fn new(initial: ConnectivitySignal) -> Self {
        let (feed_tx, feed_rx) = futures::channel::mpsc::unbounded();
        Self {
            current: StdMutex::new(initial),
            feed_tx,
            feed_rx: StdMutex::new(Some(feed_rx)),
        }
    }

    pub fn online() -> Self {
        Self::new(ConnectivitySignal::online())
    }

    pub fn offline() -> Self {
        Self::new(ConnectivitySignal::offline())
    }

    pub fn go_online(&self) {
        self.emit(ConnectivitySignal::online());
    }

    pub fn go_offline(&self) {
        self.emit(ConnectivitySignal::offline());
    }

    fn emit(&self, signal: ConnectivitySignal) {
        *self.current.lock().unwrap() = signal;
        let _ = self.feed_tx.unbounded_send(signal);
    }
}

#[async_trait]
impl ConnectivityProbe for MockConnectivityProbe {
    async fn current(&self) -> ConnectivitySignal {
        *self.current.lock().unwrap()
    }

    fn signals(&self) -> BoxStream<'static, ConnectivitySignal> {
        let rx = self
            .feed_rx
            .lock()
            .unwrap()
            .take()
            .expect("signals stream already taken");
        Box::pin(rx)
    }
}
