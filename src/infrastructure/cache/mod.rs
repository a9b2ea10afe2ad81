pub mod contractor_cache;

pub use contractor_cache::{CacheStats, ContractorCacheStore};
