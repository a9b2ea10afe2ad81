use serde::{Deserialize, Serialize};

/// 契約満了までの残日数に応じた緊急度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryUrgency {
    Critical,
    High,
    Medium,
    Low,
}

impl ExpiryUrgency {
    /// 7日以内: Critical、14日以内: High、21日以内: Medium、それ以外: Low
    pub fn from_days_left(days: i64) -> Self {
        if days <= 7 {
            ExpiryUrgency::Critical
        } else if days <= 14 {
            ExpiryUrgency::High
        } else if days <= 21 {
            ExpiryUrgency::Medium
        } else {
            ExpiryUrgency::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryUrgency::Critical => "critical",
            ExpiryUrgency::High => "high",
            ExpiryUrgency::Medium => "medium",
            ExpiryUrgency::Low => "low",
        }
    }
}
