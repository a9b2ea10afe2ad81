use serde_json::{json, Value};

use super::{ConflictField, ConflictReport, FieldConflict};
use crate::domain::entities::Contractor;

fn field_value(record: &Contractor, field: ConflictField) -> Value {
    match field {
        ConflictField::Name => json!(record.name),
        ConflictField::ServiceDescription => json!(record.service_description),
        ConflictField::Notes => json!(record.notes),
        ConflictField::Status => json!(record.status),
        ConflictField::Kind => json!(record.kind),
        ConflictField::StartDate => json!(record.start_date),
        ConflictField::EndDate => json!(record.end_date),
        ConflictField::MonthlyAmount => json!(record.monthly_amount),
        ConflictField::YearlyAmount => json!(record.yearly_amount),
    }
}

/// 全業務フィールドをサーバー版・ローカル版で突き合わせる
pub fn detect_conflicts(server: &Contractor, client: &Contractor) -> ConflictReport {
    let fields = ConflictField::ALL
        .iter()
        .map(|&field| {
            let server_value = field_value(server, field);
            let client_value = field_value(client, field);
            let has_conflict = server_value != client_value;
            FieldConflict {
                field,
                server_value,
                client_value,
                has_conflict,
            }
        })
        .collect();
    ConflictReport { fields }
}
