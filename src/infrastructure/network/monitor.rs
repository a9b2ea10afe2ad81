use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::ports::{ConnectivityProbe, ConnectivitySignal};

/// 回線品質の三段階評価
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionQuality {
    Good,
    Poor,
    Offline,
}

impl ConnectionQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionQuality::Good => "good",
            ConnectionQuality::Poor => "poor",
            ConnectionQuality::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub is_online: bool,
    pub quality: ConnectionQuality,
}

impl NetworkStatus {
    pub fn from_signal(signal: ConnectivitySignal) -> Self {
        if !signal.is_online {
            return Self {
                is_online: false,
                quality: ConnectionQuality::Offline,
            };
        }
        Self {
            is_online: true,
            quality: if signal.low_bandwidth {
                ConnectionQuality::Poor
            } else {
                ConnectionQuality::Good
            },
        }
    }
}

/// 接続状態の一元監視。watch チャンネルで購読者へ配る
pub struct NetworkMonitor {
    status_tx: watch::Sender<NetworkStatus>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkMonitor {
    /// 起動時にプローブの現在値で初期化し、以後シグナルを追いかける
    pub async fn start(probe: Arc<dyn ConnectivityProbe>) -> Self {
        let initial = NetworkStatus::from_signal(probe.current().await);
        let (status_tx, _) = watch::channel(initial);

        let mut signals = probe.signals();
        let task_tx = status_tx.clone();
        let watcher = tokio::spawn(async move {
            while let Some(signal) = signals.next().await {
                let status = NetworkStatus::from_signal(signal);
                let changed = task_tx.send_if_modified(|current| {
                    if *current == status {
                        return false;
                    }
                    *current = status;
                    true
                });
                if changed {
                    info!(
                        "Network status changed: online={} quality={}",
                        status.is_online,
                        status.quality.as_str()
                    );
                }
            }
        });

        Self {
            status_tx,
            watcher: Mutex::new(Some(watcher)),
        }
    }

    pub fn current(&self) -> NetworkStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status_tx.subscribe()
    }

    pub async fn shutdown(&self) {
        if let Some(watcher) = self.watcher.lock().await.take() {
            watcher.abort();
        }
    }
}
