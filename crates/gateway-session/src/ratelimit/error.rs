/// Rate limiter errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// The deadline passed before a permit could be granted
    ///
    /// No permit is granted later on behalf of a timed-out caller.
    #[error("Deadline exceeded while waiting for a permit")]
    Timeout,
}
