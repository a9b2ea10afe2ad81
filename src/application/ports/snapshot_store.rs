use async_trait::async_trait;

use crate::shared::error::AppError;

/// 文字列キーのスナップショット永続化。キャッシュ層の下回り
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn set(&self, key: &str, value: String) -> Result<(), AppError>;

    async fn remove(&self, key: &str) -> Result<(), AppError>;
}
