pub mod conflict;
pub mod entities;
pub mod value_objects;

pub use conflict::{
    ConflictField, ConflictReport, ConflictStrategy, DetectedConflict, FieldConflict,
    FieldOwner, FieldPriorityTable, ResolvedConflict,
};
pub use entities::{Contractor, ContractorDraft, ContractorSummary, PendingOperation};
pub use value_objects::{ContractKind, ContractStatus, ExpiryUrgency, ServiceCategory};
