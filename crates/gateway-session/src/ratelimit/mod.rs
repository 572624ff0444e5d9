//! Rate limiters gating authentication and outbound commands

mod bucket;
mod command;
mod error;

pub use bucket::{BucketPermit, ConcurrencyBucketLimiter, DEFAULT_IDENTIFY_COOL_DOWN};
pub use command::{
    CommandPermit, CommandRateLimiter, DEFAULT_COMMANDS_PER_WINDOW, DEFAULT_COMMAND_WINDOW,
};
pub use error::RateLimitError;
