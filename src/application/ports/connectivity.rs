use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// ブラウザの online/offline と帯域ヒントに相当する生シグナル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivitySignal {
    pub is_online: bool,
    pub low_bandwidth: bool,
}

impl ConnectivitySignal {
    pub fn online() -> Self {
        Self {
            is_online: true,
            low_bandwidth: false,
        }
    }

    pub fn offline() -> Self {
        Self {
            is_online: false,
            low_bandwidth: false,
        }
    }
}

/// 接続状態の観測口
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn current(&self) -> ConnectivitySignal;

    /// 状態変化の通知ストリーム
    fn signals(&self) -> BoxStream<'static, ConnectivitySignal>;
}
