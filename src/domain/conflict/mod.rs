pub mod detect;
pub mod resolve;
pub mod validate;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::entities::Contractor;

pub use detect::detect_conflicts;
pub use resolve::{
    resolve, ConflictStrategy, FieldOwner, FieldPriorityTable, Resolution, NOTES_MERGE_SEPARATOR,
};
pub use validate::validate_resolution;

/// 競合判定の対象となる業務フィールド。id と監査列は対象外
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictField {
    Name,
    ServiceDescription,
    Notes,
    Status,
    Kind,
    StartDate,
    EndDate,
    MonthlyAmount,
    YearlyAmount,
}

impl ConflictField {
    pub const ALL: [ConflictField; 9] = [
        ConflictField::Name,
        ConflictField::ServiceDescription,
        ConflictField::Notes,
        ConflictField::Status,
        ConflictField::Kind,
        ConflictField::StartDate,
        ConflictField::EndDate,
        ConflictField::MonthlyAmount,
        ConflictField::YearlyAmount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictField::Name => "name",
            ConflictField::ServiceDescription => "service_description",
            ConflictField::Notes => "notes",
            ConflictField::Status => "status",
            ConflictField::Kind => "kind",
            ConflictField::StartDate => "start_date",
            ConflictField::EndDate => "end_date",
            ConflictField::MonthlyAmount => "monthly_amount",
            ConflictField::YearlyAmount => "yearly_amount",
        }
    }
}

/// フィールド単位の比較結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: ConflictField,
    pub server_value: Value,
    pub client_value: Value,
    pub has_conflict: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub fields: Vec<FieldConflict>,
}

impl ConflictReport {
    pub fn has_conflict(&self) -> bool {
        self.fields.iter().any(|field| field.has_conflict)
    }

    pub fn conflicting_fields(&self) -> Vec<ConflictField> {
        self.fields
            .iter()
            .filter(|field| field.has_conflict)
            .map(|field| field.field)
            .collect()
    }
}

/// 未解決の競合。ユーザー判断待ちの間 UI に出す
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedConflict {
    pub server: Contractor,
    pub client: Contractor,
    pub report: ConflictReport,
}

/// 自動戦略で解決済みの競合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConflict {
    pub merged: Contractor,
    pub server: Contractor,
    pub client: Contractor,
    pub report: ConflictReport,
}
