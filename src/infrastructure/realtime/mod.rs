pub mod channel;

pub use channel::{
    ChannelDiagnostics, ChannelMessage, ChannelState, ContractorRealtimeChannel, RecentRowEvent,
    CONTRACTORS_TABLE,
};
