pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemorySnapshotStore;
pub use sqlite_store::SqliteSnapshotStore;
