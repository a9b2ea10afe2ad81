use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::Value;

use setsubi_sync::application::ports::{ChangeKind, RowChange};
use setsubi_sync::domain::entities::{Contractor, ContractorDraft};
use setsubi_sync::domain::value_objects::{ContractKind, ContractStatus};
use setsubi_sync::shared::config::{CacheConfig, RealtimeConfig, RetryConfig, SyncConfig};

pub fn contractor(id: i64, name: &str) -> Contractor {
    Contractor {
        id,
        name: name.to_string(),
        service_description: "HVAC maintenance quarterly".to_string(),
        notes: None,
        status: ContractStatus::Active,
        kind: ContractKind::Contract,
        start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
        monthly_amount: Some(1000.0),
        yearly_amount: None,
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap(),
    }
}

pub fn seed_records() -> Vec<Contractor> {
    vec![
        contractor(1, "Aoba Cleaning"),
        contractor(2, "Kita Security"),
        contractor(3, "Sun Elevators"),
    ]
}

pub fn draft(name: &str) -> ContractorDraft {
    ContractorDraft {
        name: name.to_string(),
        service_description: "Pest control monthly".to_string(),
        notes: None,
        status: ContractStatus::Pending,
        kind: ContractKind::PurchaseOrder,
        start_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2027, 3, 31).unwrap(),
        monthly_amount: Some(200.0),
        yearly_amount: None,
    }
}

/// テストを速く回すための設定。再接続待ちは即時
pub fn test_config() -> SyncConfig {
    SyncConfig {
        cache: CacheConfig {
            ttl_secs: 1800,
            staleness_threshold_secs: 600,
            schema_version: setsubi_sync::shared::config::SNAPSHOT_SCHEMA_VERSION.to_string(),
        },
        retry: RetryConfig { max_attempts: 3 },
        realtime: RealtimeConfig {
            reconnect_interval_secs: 0,
            max_reconnect_attempts: 5,
            pending_ttl_secs: 30,
        },
    }
}

pub fn row(record: &Contractor) -> Value {
    serde_json::to_value(record).unwrap()
}

pub fn insert_event(record: &Contractor) -> RowChange {
    RowChange {
        kind: ChangeKind::Insert,
        new_row: Some(row(record)),
        old_row: None,
        observed_at: Utc::now(),
    }
}

pub fn update_event(record: &Contractor) -> RowChange {
    RowChange {
        kind: ChangeKind::Update,
        new_row: Some(row(record)),
        old_row: None,
        observed_at: Utc::now(),
    }
}

pub fn delete_event(id: i64) -> RowChange {
    RowChange {
        kind: ChangeKind::Delete,
        new_row: None,
        old_row: Some(serde_json::json!({ "id": id })),
        observed_at: Utc::now(),
    }
}
