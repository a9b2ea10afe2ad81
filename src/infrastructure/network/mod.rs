pub mod monitor;
pub mod retry;

pub use monitor::{ConnectionQuality, NetworkMonitor, NetworkStatus};
pub use retry::{RetryPolicy, RetryState};
