use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::ports::SnapshotStore;
use crate::domain::entities::{Contractor, ContractorSummary};
use crate::shared::config::CacheConfig;

const RECORDS_KEY: &str = "contractors:snapshot";
const SUMMARY_KEY: &str = "contractors:summary";

/// スナップショット一件分の封筒。鮮度と版をデータと一緒に持つ
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEnvelope<T> {
    payload: T,
    captured_at: DateTime<Utc>,
    schema_version: String,
}

/// キャッシュの現況。診断スナップショットにそのまま載せる
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub count: usize,
    pub age_minutes: Option<i64>,
    pub is_valid: bool,
    pub approx_size_bytes: usize,
}

/// 業者契約スナップショットの TTL つきキャッシュ
///
/// 読み書きの失敗は警告ログに落としてミス扱いにする。キャッシュ層の
/// 不調で同期レイヤー全体を止めない
pub struct ContractorCacheStore {
    store: Arc<dyn SnapshotStore>,
    ttl: Duration,
    schema_version: String,
}

impl ContractorCacheStore {
    pub fn new(store: Arc<dyn SnapshotStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            ttl: Duration::seconds(config.ttl_secs as i64),
            schema_version: config.schema_version.clone(),
        }
    }

    pub async fn save(&self, records: &[Contractor]) {
        self.write_envelope(RECORDS_KEY, records, Utc::now()).await;
    }

    /// TTL 内のスナップショットのみ返す
    pub async fn load(&self) -> Option<Vec<Contractor>> {
        let envelope = self.read_envelope::<Vec<Contractor>>(RECORDS_KEY).await?;
        if !self.is_fresh(&envelope) {
            debug!("Cached contractor snapshot is past its TTL");
            return None;
        }
        Some(envelope.payload)
    }

    /// TTL を無視して読む。取得失敗時の最後の手段
    pub async fn load_stale(&self) -> Option<Vec<Contractor>> {
        self.read_envelope::<Vec<Contractor>>(RECORDS_KEY)
            .await
            .map(|envelope| envelope.payload)
    }

    pub async fn save_summary(&self, summary: &ContractorSummary) {
        self.write_envelope(SUMMARY_KEY, summary, Utc::now()).await;
    }

    pub async fn load_summary(&self) -> Option<ContractorSummary> {
        let envelope = self.read_envelope::<ContractorSummary>(SUMMARY_KEY).await?;
        if !self.is_fresh(&envelope) {
            return None;
        }
        Some(envelope.payload)
    }

    /// id 指定で一件だけ落とす。全体の鮮度はそのまま
    pub async fn invalidate(&self, id: Option<i64>) {
        match id {
            None => {
                self.remove_quietly(RECORDS_KEY).await;
                self.remove_quietly(SUMMARY_KEY).await;
            }
            Some(id) => {
                let Some(mut envelope) = self.read_envelope::<Vec<Contractor>>(RECORDS_KEY).await
                else {
                    return;
                };
                let before = envelope.payload.len();
                envelope.payload.retain(|record| record.id != id);
                if envelope.payload.len() == before {
                    return;
                }
                self.write_envelope_raw(RECORDS_KEY, &envelope).await;
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let raw_records = self.read_raw(RECORDS_KEY).await;
        let raw_summary = self.read_raw(SUMMARY_KEY).await;
        let approx_size_bytes = raw_records.as_deref().map_or(0, str::len)
            + raw_summary.as_deref().map_or(0, str::len);

        let envelope = raw_records
            .as_deref()
            .and_then(|raw| self.parse_envelope::<Vec<Contractor>>(raw));
        match envelope {
            Some(envelope) => CacheStats {
                count: envelope.payload.len(),
                age_minutes: Some((Utc::now() - envelope.captured_at).num_minutes()),
                is_valid: envelope.schema_version == self.schema_version
                    && self.is_fresh(&envelope),
                approx_size_bytes,
            },
            None => CacheStats {
                count: 0,
                age_minutes: None,
                is_valid: false,
                approx_size_bytes,
            },
        }
    }

    fn is_fresh<T>(&self, envelope: &CacheEnvelope<T>) -> bool {
        Utc::now() - envelope.captured_at < self.ttl
    }

    fn parse_envelope<T: DeserializeOwned>(&self, raw: &str) -> Option<CacheEnvelope<T>> {
        match serde_json::from_str::<CacheEnvelope<T>>(raw) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!("Discarding unreadable cache envelope: {}", e);
                None
            }
        }
    }

    async fn read_raw(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// 封筒を読み、版が合わなければ破棄する
    async fn read_envelope<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEnvelope<T>> {
        let raw = self.read_raw(key).await?;
        let envelope = match self.parse_envelope::<T>(&raw) {
            Some(envelope) => envelope,
            None => {
                self.remove_quietly(key).await;
                return None;
            }
        };
        if envelope.schema_version != self.schema_version {
            warn!(
                "Purging cache entry {} with schema {} (expected {})",
                key, envelope.schema_version, self.schema_version
            );
            self.remove_quietly(key).await;
            return None;
        }
        Some(envelope)
    }

    async fn write_envelope<T: Serialize + ?Sized>(
        &self,
        key: &str,
        payload: &T,
        captured_at: DateTime<Utc>,
    ) {
        let envelope = CacheEnvelope {
            payload,
            captured_at,
            schema_version: self.schema_version.clone(),
        };
        self.write_envelope_raw(key, &envelope).await;
    }

    async fn write_envelope_raw<T: Serialize>(&self, key: &str, envelope: &CacheEnvelope<T>) {
        let raw = match serde_json::to_string(envelope) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.set(key, raw).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    async fn remove_quietly(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            warn!("Cache purge failed for {}: {}", key, e);
        }
    }
}
