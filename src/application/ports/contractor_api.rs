use async_trait::async_trait;

use crate::domain::entities::{Contractor, ContractorDraft, ContractorSummary};
use crate::shared::error::AppError;

/// 業者契約のリモートデータサービス
#[async_trait]
pub trait ContractorApi: Send + Sync {
    /// 全件取得。同期レイヤーが正本集合を丸ごと持つ
    async fn list(&self) -> Result<Vec<Contractor>, AppError>;

    async fn create(&self, draft: ContractorDraft) -> Result<Contractor, AppError>;

    /// 更新後のレコード全体を返す
    async fn update(&self, id: i64, record: Contractor) -> Result<Contractor, AppError>;

    async fn delete(&self, id: i64) -> Result<(), AppError>;

    /// サーバー側で計算した集計値
    async fn aggregate(&self) -> Result<ContractorSummary, AppError>;
}
