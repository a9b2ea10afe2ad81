pub mod config;
pub mod error;
pub mod metrics;

pub use config::SyncConfig;
pub use error::{AppError, ErrorClass};
