use serde::{Deserialize, Serialize};
use std::time::Duration;

/// キャッシュ封筒のスキーマ版。互換性のない形状変更で上げる
pub const SNAPSHOT_SCHEMA_VERSION: &str = "2.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub staleness_threshold_secs: u64,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub reconnect_interval_secs: u64,
    pub max_reconnect_attempts: u32,
    // 楽観的更新とリアルタイムイベントの突き合わせ猶予
    pub pending_ttl_secs: u64,
}

fn default_schema_version() -> String {
    SNAPSHOT_SCHEMA_VERSION.to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 1800,               // 30 minutes
            staleness_threshold_secs: 600, // 10 minutes
            schema_version: default_schema_version(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect_interval_secs: 5,
            max_reconnect_attempts: 5,
            pending_ttl_secs: 30,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }
}

impl RealtimeConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }
}
