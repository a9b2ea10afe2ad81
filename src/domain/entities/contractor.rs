use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::value_objects::{ContractKind, ContractStatus, ServiceCategory};
use crate::shared::error::AppError;

/// 業者契約レコード。サーバーが正とする形をそのまま持つ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contractor {
    pub id: i64,
    pub name: String,
    pub service_description: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: ContractStatus,
    pub kind: ContractKind,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub monthly_amount: Option<f64>,
    #[serde(default)]
    pub yearly_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新規登録用の入力。id と監査列はサーバーが採番する
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorDraft {
    pub name: String,
    pub service_description: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: ContractStatus,
    pub kind: ContractKind,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub monthly_amount: Option<f64>,
    #[serde(default)]
    pub yearly_amount: Option<f64>,
}

fn check_fields(
    name: &str,
    service_description: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    monthly_amount: Option<f64>,
    yearly_amount: Option<f64>,
) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Contractor name must not be empty".to_string());
    }
    if service_description.trim().is_empty() {
        return Err("Service description must not be empty".to_string());
    }
    if end_date <= start_date {
        return Err(format!(
            "Contract end date {end_date} must be after the start date {start_date}"
        ));
    }
    if let Some(amount) = monthly_amount {
        if amount < 0.0 {
            return Err(format!("Monthly amount must not be negative (got {amount})"));
        }
    }
    if let Some(amount) = yearly_amount {
        if amount < 0.0 {
            return Err(format!("Yearly amount must not be negative (got {amount})"));
        }
    }
    Ok(())
}

impl Contractor {
    /// 不変条件の素チェック。呼び出し側でエラー型に包む
    pub fn check_invariants(&self) -> Result<(), String> {
        check_fields(
            &self.name,
            &self.service_description,
            self.start_date,
            self.end_date,
            self.monthly_amount,
            self.yearly_amount,
        )
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.check_invariants().map_err(AppError::Validation)
    }

    /// 受信した行ペイロードを検証つきでパースする
    pub fn from_row_value(value: &Value) -> Result<Self, AppError> {
        let contractor: Contractor = serde_json::from_value(value.clone())
            .map_err(|e| AppError::Validation(format!("Malformed contractor row: {e}")))?;
        contractor.validate()?;
        Ok(contractor)
    }

    pub fn category(&self) -> ServiceCategory {
        ServiceCategory::infer(&self.service_description)
    }

    pub fn days_until_expiry(&self, today: NaiveDate) -> i64 {
        (self.end_date - today).num_days()
    }

    /// 指定期間と契約期間が重なるか
    pub fn is_active_during(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.start_date <= to && self.end_date >= from
    }
}

impl ContractorDraft {
    pub fn validate(&self) -> Result<(), AppError> {
        check_fields(
            &self.name,
            &self.service_description,
            self.start_date,
            self.end_date,
            self.monthly_amount,
            self.yearly_amount,
        )
        .map_err(AppError::Validation)
    }
}
