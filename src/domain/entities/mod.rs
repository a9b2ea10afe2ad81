pub mod contractor;
pub mod pending_operation;
pub mod summary;

pub use contractor::{Contractor, ContractorDraft};
pub use pending_operation::{PendingOperation, PendingOperations};
pub use summary::{ContractorSummary, EXPIRING_SOON_WINDOW_DAYS};
