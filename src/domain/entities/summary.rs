use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::entities::Contractor;
use crate::domain::value_objects::ContractStatus;

/// 「まもなく満了」と見なす残日数
pub const EXPIRING_SOON_WINDOW_DAYS: i64 = 30;

/// ダッシュボード先頭に出す集計値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorSummary {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub pending: usize,
    pub monthly_total: f64,
    pub yearly_total: f64,
    pub expiring_soon: usize,
}

impl ContractorSummary {
    pub fn derive(records: &[Contractor], today: NaiveDate) -> Self {
        let mut summary = Self {
            total: records.len(),
            active: 0,
            expired: 0,
            pending: 0,
            monthly_total: 0.0,
            yearly_total: 0.0,
            expiring_soon: 0,
        };
        for record in records {
            match record.status {
                ContractStatus::Active => summary.active += 1,
                ContractStatus::Expired => summary.expired += 1,
                ContractStatus::Pending => summary.pending += 1,
            }
            if let Some(amount) = record.monthly_amount {
                summary.monthly_total += amount;
            }
            if let Some(amount) = record.yearly_amount {
                summary.yearly_total += amount;
            }
            let days = record.days_until_expiry(today);
            if (0..=EXPIRING_SOON_WINDOW_DAYS).contains(&days) {
                summary.expiring_soon += 1;
            }
        }
        summary
    }
}
