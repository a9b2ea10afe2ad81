pub mod contract_kind;
pub mod contract_status;
pub mod expiry_urgency;
pub mod service_category;

pub use contract_kind::ContractKind;
pub use contract_status::ContractStatus;
pub use expiry_urgency::ExpiryUrgency;
pub use service_category::ServiceCategory;
