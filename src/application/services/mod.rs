pub mod contractor_sync;

pub use contractor_sync::{
    ContractorFilters, ContractorSyncService, ExpiringContractor, FilterPatch, SyncErrorInfo,
    SyncSnapshot,
};
