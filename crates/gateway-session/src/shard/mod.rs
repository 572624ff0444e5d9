//! Shard supervision

mod manager;

pub use manager::{ShardEvent, ShardManager};
