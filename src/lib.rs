pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::services::contractor_sync::{
    ContractorFilters, ContractorSyncService, FilterPatch, SyncSnapshot,
};
pub use domain::conflict::ConflictStrategy;
pub use shared::config::SyncConfig;
pub use shared::error::AppError;

/// ログ設定の初期化
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "setsubi_sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
