use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::entities::{Contractor, EXPIRING_SOON_WINDOW_DAYS};
use crate::domain::value_objects::{ContractKind, ContractStatus, ExpiryUrgency};

/// 一覧画面の絞り込み条件。条件同士は AND で効く
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractorFilters {
    pub status: Option<ContractStatus>,
    pub kind: Option<ContractKind>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub active_from: Option<NaiveDate>,
    pub active_until: Option<NaiveDate>,
}

/// 部分更新。外側 None は据え置き、Some(None) は条件の解除
#[derive(Debug, Clone, Default)]
pub struct FilterPatch {
    pub status: Option<Option<ContractStatus>>,
    pub kind: Option<Option<ContractKind>>,
    pub search: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub active_from: Option<Option<NaiveDate>>,
    pub active_until: Option<Option<NaiveDate>>,
}

impl ContractorFilters {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.kind.is_none()
            && self.search.is_none()
            && self.category.is_none()
            && self.active_from.is_none()
            && self.active_until.is_none()
    }

    pub fn apply(&mut self, patch: FilterPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(search) = patch.search {
            self.search = search;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(active_from) = patch.active_from {
            self.active_from = active_from;
        }
        if let Some(active_until) = patch.active_until {
            self.active_until = active_until;
        }
    }

    pub fn matches(&self, record: &Contractor) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref() {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty() && !matches_search(record, &needle) {
                return false;
            }
        }
        if let Some(category) = self.category.as_deref() {
            let wanted = category.trim().to_lowercase();
            if !wanted.is_empty() && record.category().as_str() != wanted {
                return false;
            }
        }
        if self.active_from.is_some() || self.active_until.is_some() {
            let from = self.active_from.unwrap_or(NaiveDate::MIN);
            let to = self.active_until.unwrap_or(NaiveDate::MAX);
            if !record.is_active_during(from, to) {
                return false;
            }
        }
        true
    }
}

/// 名称・業務内容・メモへの大文字小文字を無視した部分一致
fn matches_search(record: &Contractor, needle: &str) -> bool {
    record.name.to_lowercase().contains(needle)
        || record.service_description.to_lowercase().contains(needle)
        || record
            .notes
            .as_deref()
            .is_some_and(|notes| notes.to_lowercase().contains(needle))
}

pub fn apply_filters(records: &[Contractor], filters: &ContractorFilters) -> Vec<Contractor> {
    records
        .iter()
        .filter(|record| filters.matches(record))
        .cloned()
        .collect()
}

/// 満了間近リストの一行分
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiringContractor {
    pub record: Contractor,
    pub days_left: i64,
    pub urgency: ExpiryUrgency,
}

/// 30日以内に満了する契約を残日数の昇順で返す
pub fn expiring_soon(records: &[Contractor], today: NaiveDate) -> Vec<ExpiringContractor> {
    let mut expiring: Vec<ExpiringContractor> = records
        .iter()
        .filter_map(|record| {
            let days_left = record.days_until_expiry(today);
            if !(0..=EXPIRING_SOON_WINDOW_DAYS).contains(&days_left) {
                return None;
            }
            Some(ExpiringContractor {
                record: record.clone(),
                days_left,
                urgency: ExpiryUrgency::from_days_left(days_left),
            })
        })
        .collect();
    expiring.sort_by_key(|entry| (entry.days_left, entry.record.id));
    expiring
}

pub fn group_by_category(records: &[Contractor]) -> BTreeMap<String, Vec<Contractor>> {
    let mut groups: BTreeMap<String, Vec<Contractor>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.category().into_inner())
            .or_default()
            .push(record.clone());
    }
    groups
}

pub fn category_counts(records: &[Contractor]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.category().into_inner()).or_default() += 1;
    }
    counts
}
