use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    validate_resolution, ConflictField, ConflictReport, DetectedConflict, ResolvedConflict,
};
use crate::domain::entities::Contractor;
use crate::shared::error::AppError;

/// 双方にメモがある場合の連結区切り
pub const NOTES_MERGE_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOwner {
    Server,
    Client,
    Merge,
}

/// field-priority 戦略のフィールド別の優先側
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPriorityTable {
    owners: HashMap<ConflictField, FieldOwner>,
}

/// 既定表: 状態系はサーバー、記述・日付・金額はローカル、メモは連結
impl Default for FieldPriorityTable {
    fn default() -> Self {
        let mut owners = HashMap::new();
        owners.insert(ConflictField::Name, FieldOwner::Client);
        owners.insert(ConflictField::ServiceDescription, FieldOwner::Client);
        owners.insert(ConflictField::Notes, FieldOwner::Merge);
        owners.insert(ConflictField::Status, FieldOwner::Server);
        owners.insert(ConflictField::Kind, FieldOwner::Server);
        owners.insert(ConflictField::StartDate, FieldOwner::Client);
        owners.insert(ConflictField::EndDate, FieldOwner::Client);
        owners.insert(ConflictField::MonthlyAmount, FieldOwner::Client);
        owners.insert(ConflictField::YearlyAmount, FieldOwner::Client);
        Self { owners }
    }
}

impl FieldPriorityTable {
    pub fn with_owner(mut self, field: ConflictField, owner: FieldOwner) -> Self {
        self.owners.insert(field, owner);
        self
    }

    /// 表にない項目はサーバー優先
    pub fn owner(&self, field: ConflictField) -> FieldOwner {
        self.owners.get(&field).copied().unwrap_or(FieldOwner::Server)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictStrategy {
    ServerWins,
    ClientWins,
    SmartMerge,
    FieldPriority(FieldPriorityTable),
    Interactive,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        ConflictStrategy::SmartMerge
    }
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::ServerWins => "server_wins",
            ConflictStrategy::ClientWins => "client_wins",
            ConflictStrategy::SmartMerge => "smart_merge",
            ConflictStrategy::FieldPriority(_) => "field_priority",
            ConflictStrategy::Interactive => "interactive",
        }
    }
}

/// 解決の結果。interactive のみ利用者判断へ委ねる
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Merged(ResolvedConflict),
    Deferred(DetectedConflict),
}

/// 競合レポートを受けて戦略を適用する。自動系はマージ結果を検証してから返す
pub fn resolve(
    server: &Contractor,
    client: &Contractor,
    report: ConflictReport,
    strategy: &ConflictStrategy,
    today: NaiveDate,
) -> Result<Resolution, AppError> {
    if !report.has_conflict() {
        return Ok(Resolution::Merged(ResolvedConflict {
            merged: server.clone(),
            server: server.clone(),
            client: client.clone(),
            report,
        }));
    }

    let merged = match strategy {
        ConflictStrategy::ServerWins => server.clone(),
        ConflictStrategy::ClientWins => client_wins(server, client),
        ConflictStrategy::SmartMerge => smart_merge(server, client, today),
        ConflictStrategy::FieldPriority(table) => field_priority(server, client, table, today),
        ConflictStrategy::Interactive => {
            return Ok(Resolution::Deferred(DetectedConflict {
                server: server.clone(),
                client: client.clone(),
                report,
            }));
        }
    };

    validate_resolution(&merged)?;
    Ok(Resolution::Merged(ResolvedConflict {
        merged,
        server: server.clone(),
        client: client.clone(),
        report,
    }))
}

/// id と監査列は常にサーバー側を保つ
fn client_wins(server: &Contractor, client: &Contractor) -> Contractor {
    let mut merged = server.clone();
    for field in ConflictField::ALL {
        copy_field(&mut merged, client, field);
    }
    merged
}

fn smart_merge(server: &Contractor, client: &Contractor, today: NaiveDate) -> Contractor {
    let mut merged = server.clone();
    for field in ConflictField::ALL {
        apply_smart_rule(&mut merged, server, client, field, today);
    }
    merged
}

fn field_priority(
    server: &Contractor,
    client: &Contractor,
    table: &FieldPriorityTable,
    today: NaiveDate,
) -> Contractor {
    let mut merged = server.clone();
    for field in ConflictField::ALL {
        match table.owner(field) {
            FieldOwner::Server => {}
            FieldOwner::Client => copy_field(&mut merged, client, field),
            FieldOwner::Merge => apply_smart_rule(&mut merged, server, client, field, today),
        }
    }
    merged
}

fn copy_field(target: &mut Contractor, source: &Contractor, field: ConflictField) {
    match field {
        ConflictField::Name => target.name = source.name.clone(),
        ConflictField::ServiceDescription => {
            target.service_description = source.service_description.clone();
        }
        ConflictField::Notes => target.notes = source.notes.clone(),
        ConflictField::Status => target.status = source.status,
        ConflictField::Kind => target.kind = source.kind,
        ConflictField::StartDate => target.start_date = source.start_date,
        ConflictField::EndDate => target.end_date = source.end_date,
        ConflictField::MonthlyAmount => target.monthly_amount = source.monthly_amount,
        ConflictField::YearlyAmount => target.yearly_amount = source.yearly_amount,
    }
}

/// smart-merge のフィールド別ヒューリスティクス
/// テキストは長い方、メモは連結、日付は今日に近い方、金額はローカル優先
fn apply_smart_rule(
    target: &mut Contractor,
    server: &Contractor,
    client: &Contractor,
    field: ConflictField,
    today: NaiveDate,
) {
    match field {
        ConflictField::Name => {
            target.name = prefer_longer(&server.name, &client.name).to_string();
        }
        ConflictField::ServiceDescription => {
            target.service_description =
                prefer_longer(&server.service_description, &client.service_description)
                    .to_string();
        }
        ConflictField::Notes => {
            target.notes = merge_notes(server.notes.as_deref(), client.notes.as_deref());
        }
        // 状態系はサーバーの判断を正とする
        ConflictField::Status => target.status = server.status,
        ConflictField::Kind => target.kind = server.kind,
        ConflictField::StartDate => {
            target.start_date = closer_to_today(server.start_date, client.start_date, today);
        }
        ConflictField::EndDate => {
            target.end_date = closer_to_today(server.end_date, client.end_date, today);
        }
        ConflictField::MonthlyAmount => {
            target.monthly_amount = client.monthly_amount.or(server.monthly_amount);
        }
        ConflictField::YearlyAmount => {
            target.yearly_amount = client.yearly_amount.or(server.yearly_amount);
        }
    }
}

/// 文字数比較。同数ならサーバー側
fn prefer_longer<'a>(server: &'a str, client: &'a str) -> &'a str {
    if client.chars().count() > server.chars().count() {
        client
    } else {
        server
    }
}

/// 今日との差が小さい方。同差ならサーバー側
fn closer_to_today(server: NaiveDate, client: NaiveDate, today: NaiveDate) -> NaiveDate {
    let server_distance = (server - today).num_days().abs();
    let client_distance = (client - today).num_days().abs();
    if client_distance < server_distance {
        client
    } else {
        server
    }
}

fn merge_notes(server: Option<&str>, client: Option<&str>) -> Option<String> {
    let server = server.map(str::trim).filter(|s| !s.is_empty());
    let client = client.map(str::trim).filter(|s| !s.is_empty());
    match (server, client) {
        (None, None) => None,
        (Some(s), None) => Some(s.to_string()),
        (None, Some(c)) => Some(c.to_string()),
        (Some(s), Some(c)) if s == c => Some(s.to_string()),
        (Some(s), Some(c)) => Some(format!("{s}{NOTES_MERGE_SEPARATOR}{c}")),
    }
}
