pub mod cache;
pub mod network;
pub mod realtime;
pub mod storage;
