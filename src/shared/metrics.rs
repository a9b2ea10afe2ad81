use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const UNSET_TS: u64 = 0;

/// リアルタイムイベントの受理・棄却カウンタ
#[derive(Debug)]
pub struct ChannelCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    last_accepted_ms: AtomicU64,
    last_rejected_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChannelCounterSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub last_accepted_ms: Option<u64>,
    pub last_rejected_ms: Option<u64>,
}

impl ChannelCounters {
    pub const fn new() -> Self {
        Self {
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            last_accepted_ms: AtomicU64::new(UNSET_TS),
            last_rejected_ms: AtomicU64::new(UNSET_TS),
        }
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.last_accepted_ms
            .store(current_unix_ms(), Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.last_rejected_ms
            .store(current_unix_ms(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ChannelCounterSnapshot {
        ChannelCounterSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            last_accepted_ms: timestamp_to_option(self.last_accepted_ms.load(Ordering::Relaxed)),
            last_rejected_ms: timestamp_to_option(self.last_rejected_ms.load(Ordering::Relaxed)),
        }
    }

    pub fn reset(&self) {
        self.accepted.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
        self.last_accepted_ms.store(UNSET_TS, Ordering::Relaxed);
        self.last_rejected_ms.store(UNSET_TS, Ordering::Relaxed);
    }
}

impl Default for ChannelCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
pub fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(UNSET_TS)
}

#[inline]
pub fn timestamp_to_option(value: u64) -> Option<u64> {
    if value == UNSET_TS { None } else { Some(value) }
}
