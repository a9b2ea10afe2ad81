use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shared::error::AppError;

/// 行変更の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

/// トランスポートから届く生の行変更。ペイロードは未検証
#[derive(Debug, Clone)]
pub struct RowChange {
    pub kind: ChangeKind,
    pub new_row: Option<Value>,
    pub old_row: Option<Value>,
    pub observed_at: DateTime<Utc>,
}

/// 購読解除フック。drop でも確実に解除される
pub struct RealtimeDisposer(Option<Box<dyn FnOnce() + Send>>);

impl RealtimeDisposer {
    pub fn new(dispose: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(dispose)))
    }

    /// 何もしないダミー。テスト用トランスポート向け
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn dispose(mut self) {
        if let Some(dispose) = self.0.take() {
            dispose();
        }
    }
}

impl Drop for RealtimeDisposer {
    fn drop(&mut self) {
        if let Some(dispose) = self.0.take() {
            dispose();
        }
    }
}

impl std::fmt::Debug for RealtimeDisposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RealtimeDisposer")
            .field(&self.0.is_some())
            .finish()
    }
}

/// 購読一件分。イベントストリームと解除フックの組
pub struct RealtimeSubscription {
    pub events: BoxStream<'static, RowChange>,
    pub disposer: RealtimeDisposer,
}

/// 行変更イベントの購読口
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn subscribe(
        &self,
        table: &str,
        kinds: &[ChangeKind],
    ) -> Result<RealtimeSubscription, AppError>;
}
