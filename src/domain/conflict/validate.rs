use crate::domain::entities::Contractor;
use crate::shared::error::AppError;

/// マージ結果が業務ルールを満たすか。違反した解決は一切コミットしない
pub fn validate_resolution(merged: &Contractor) -> Result<(), AppError> {
    merged
        .check_invariants()
        .map_err(AppError::ConflictValidation)
}
