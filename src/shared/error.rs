use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 同期レイヤー共通のエラー型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict resolution rejected: {0}")]
    ConflictValidation(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("No cached data available while offline")]
    NoCachedData,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// エラー分類。UI向けメッセージの選択にのみ使う
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Network,
    Auth,
    Server,
    Validation,
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Network => "network",
            ErrorClass::Auth => "auth",
            ErrorClass::Server => "server",
            ErrorClass::Validation => "validation",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl AppError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            AppError::Network(_) | AppError::NoCachedData => ErrorClass::Network,
            AppError::Auth(_) => ErrorClass::Auth,
            AppError::Server(_) => ErrorClass::Server,
            AppError::Validation(_) | AppError::ConflictValidation(_) => ErrorClass::Validation,
            AppError::Cache(_) | AppError::NotFound(_) | AppError::Internal(_) => {
                ErrorClass::Unknown
            }
        }
    }

    /// 分類に応じた画面表示用メッセージ
    pub fn user_message(&self) -> &'static str {
        match self.classify() {
            ErrorClass::Network => "Connection failed. Check your network and try again.",
            ErrorClass::Auth => "Your session has expired. Sign in again to continue.",
            ErrorClass::Server => "The server is having trouble. Try again in a moment.",
            ErrorClass::Validation => "Some values could not be accepted. Review them and retry.",
            ErrorClass::Unknown => "Something went wrong. Try again.",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Cache(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_maps_offline_cache_miss_to_network() {
        assert_eq!(AppError::NoCachedData.classify(), ErrorClass::Network);
        assert_eq!(
            AppError::Network("timeout".to_string()).classify(),
            ErrorClass::Network
        );
    }

    #[test]
    fn test_classify_treats_conflict_rejection_as_validation() {
        let err = AppError::ConflictValidation("empty name".to_string());
        assert_eq!(err.classify(), ErrorClass::Validation);
        assert!(err.user_message().contains("values"));
    }

    #[test]
    fn test_unknown_class_for_internal_errors() {
        assert_eq!(
            AppError::Internal("bug".to_string()).classify(),
            ErrorClass::Unknown
        );
    }
}
