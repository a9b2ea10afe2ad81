use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::shared::config::RetryConfig;
use crate::shared::error::AppError;

/// UI の「再試行」ボタンに渡す残量情報
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    pub attempts: u32,
    pub max_attempts: u32,
    pub is_retrying: bool,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            is_retrying: false,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn record_failure(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.is_retrying = false;
    }
}

/// 即時リトライ方針。回数上限のみでバックオフは持たない
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 成功するか上限に達するまで即時に再実行し、最後のエラーを返す
    pub async fn with_retry<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        label, attempt, self.max_attempts, e
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| AppError::Internal(format!("{label} failed without running"))))
    }

    /// 一度だけ実行し、失敗時は代替値に切り替える。リトライはしない
    pub async fn with_fallback<T, F, Fut>(&self, label: &str, fallback: T, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        match operation().await {
            Ok(value) => value,
            Err(e) => {
                warn!("{} failed, using fallback value: {}", label, e);
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig { max_attempts })
    }

    #[tokio::test]
    async fn test_with_retry_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), AppError> = policy(3)
            .with_retry("always failing", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::Network("connection reset".to_string())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(AppError::Network(_))));
    }

    #[tokio::test]
    async fn test_with_retry_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .with_retry("flaky", || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 2 {
                        Err(AppError::Server("500".to_string()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_fallback_runs_once() {
        let calls = AtomicU32::new(0);
        let value = policy(3)
            .with_fallback("aggregate", 42, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::Server("503".to_string())) }
            })
            .await;
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_fallback_passes_through_success() {
        let value = policy(1)
            .with_fallback("aggregate", 0, || async { Ok(7) })
            .await;
        assert_eq!(value, 7);
    }

    #[test]
    fn test_retry_state_budget() {
        let mut state = RetryState::new(3);
        assert!(state.can_retry());
        state.record_failure();
        state.record_failure();
        state.record_failure();
        assert!(!state.can_retry());
        state.reset();
        assert!(state.can_retry());
        assert_eq!(state.attempts, 0);
    }
}
