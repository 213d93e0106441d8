//! Shipped transport backends

pub mod kv;
pub mod topic;

pub use kv::MemoryKeyValue;
pub use topic::{MemoryTopic, DEFAULT_GROUP_CAPACITY};
