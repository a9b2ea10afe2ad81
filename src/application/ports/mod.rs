pub mod connectivity;
pub mod contractor_api;
pub mod realtime;
pub mod snapshot_store;

pub use connectivity::{ConnectivityProbe, ConnectivitySignal};
pub use contractor_api::ContractorApi;
pub use realtime::{
    ChangeKind, RealtimeDisposer, RealtimeSubscription, RealtimeTransport, RowChange,
};
pub use snapshot_store::SnapshotStore;
