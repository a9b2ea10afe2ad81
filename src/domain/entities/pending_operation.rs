use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entities::Contractor;

/// サーバー確認待ちの楽観的更新。リアルタイムイベントとの照合に使う
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub op_id: Uuid,
    pub contractor_id: i64,
    pub local_record: Contractor,
    pub registered_at: DateTime<Utc>,
}

impl PendingOperation {
    pub fn new(local_record: Contractor) -> Self {
        Self {
            op_id: Uuid::new_v4(),
            contractor_id: local_record.id,
            registered_at: Utc::now(),
            local_record,
        }
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.registered_at >= ttl
    }
}

/// 楽観的更新の台帳。コーディネーターが登録し、チャンネルが照合時に取り出す
///
/// 期限切れの掃除はアクセス時に行う。専用タイマーは持たない
#[derive(Debug)]
pub struct PendingOperations {
    entries: RwLock<HashMap<i64, PendingOperation>>,
    ttl: Duration,
}

impl PendingOperations {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(30)),
        }
    }

    /// 同じ id の古い登録は最新の変更で置き換える
    pub async fn register(&self, local_record: Contractor) -> Uuid {
        let operation = PendingOperation::new(local_record);
        let op_id = operation.op_id;
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, self.ttl);
        entries.insert(operation.contractor_id, operation);
        op_id
    }

    /// 照合のために取り出す。見つかった登録は台帳から消える
    pub async fn take(&self, contractor_id: i64) -> Option<PendingOperation> {
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, self.ttl);
        entries.remove(&contractor_id)
    }

    pub async fn clear(&self, contractor_id: i64) {
        self.entries.write().await.remove(&contractor_id);
    }

    pub async fn clear_all(&self) {
        self.entries.write().await.clear();
    }

    pub async fn contains(&self, contractor_id: i64) -> bool {
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, self.ttl);
        entries.contains_key(&contractor_id)
    }

    pub async fn len(&self) -> usize {
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, self.ttl);
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn purge_expired(entries: &mut HashMap<i64, PendingOperation>, ttl: Duration) {
        let now = Utc::now();
        entries.retain(|_, operation| !operation.is_expired(ttl, now));
    }
}
