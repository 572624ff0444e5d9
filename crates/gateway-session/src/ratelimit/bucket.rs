//! Identify concurrency buckets
//!
//! Shards are grouped into `shard_id % max_concurrency` buckets. One shard per
//! bucket may authenticate at a time, and a bucket stays closed for a
//! cool-down after every release.

use super::RateLimitError;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{sleep_until, timeout_at, Instant};

/// Minimum gap between two authentications sharing a bucket
pub const DEFAULT_IDENTIFY_COOL_DOWN: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Bucket {
    key: u32,
    reset_at: Option<Instant>,
}

/// Limiter shared by every shard connection of one application
#[derive(Debug)]
pub struct ConcurrencyBucketLimiter {
    buckets: DashMap<u32, Arc<Mutex<Bucket>>>,
    max_concurrency: u32,
    cool_down: Duration,
}

impl ConcurrencyBucketLimiter {
    /// Limiter with `max_concurrency` buckets and a cool-down after each release
    ///
    /// A zero `max_concurrency` is treated as one.
    #[must_use]
    pub fn new(max_concurrency: u32, cool_down: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            max_concurrency: max_concurrency.max(1),
            cool_down,
        }
    }

    /// Bucket key for a shard
    #[must_use]
    pub fn bucket_key(&self, shard_id: u32) -> u32 {
        shard_id % self.max_concurrency
    }

    #[must_use]
    pub fn max_concurrency(&self) -> u32 {
        self.max_concurrency
    }

    #[must_use]
    pub fn cool_down(&self) -> Duration {
        self.cool_down
    }

    /// Wait until `shard_id` may authenticate, giving up at `deadline`
    ///
    /// Waiters on one bucket are served in arrival order. If the bucket's
    /// cool-down ends after `deadline`, this fails right away. A timed-out
    /// caller is never granted the slot afterwards.
    pub async fn wait_bucket(
        &self,
        shard_id: u32,
        deadline: Instant,
    ) -> Result<BucketPermit, RateLimitError> {
        let key = self.bucket_key(shard_id);
        let bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(Bucket { key, reset_at: None })))
            .value()
            .clone();

        let guard = timeout_at(deadline, bucket.lock_owned())
            .await
            .map_err(|_| RateLimitError::Timeout)?;

        if let Some(reset_at) = guard.reset_at {
            if reset_at > Instant::now() {
                if reset_at > deadline {
                    return Err(RateLimitError::Timeout);
                }
                tracing::debug!(
                    shard_id,
                    bucket = key,
                    "Identify bucket cooling down"
                );
                sleep_until(reset_at).await;
            }
        }

        tracing::trace!(shard_id, bucket = key, "Identify bucket acquired");
        Ok(BucketPermit {
            bucket: Some(guard),
            cool_down: self.cool_down,
        })
    }
}

impl Default for ConcurrencyBucketLimiter {
    fn default() -> Self {
        Self::new(1, DEFAULT_IDENTIFY_COOL_DOWN)
    }
}

/// Exclusive right to authenticate within one bucket
///
/// Releasing (or dropping) the permit starts the bucket's cool-down.
#[must_use = "dropping a permit releases it immediately"]
#[derive(Debug)]
pub struct BucketPermit {
    bucket: Option<OwnedMutexGuard<Bucket>>,
    cool_down: Duration,
}

impl BucketPermit {
    /// Key of the held bucket
    #[must_use]
    pub fn key(&self) -> Option<u32> {
        self.bucket.as_ref().map(|bucket| bucket.key)
    }

    /// Release the bucket after the authenticate frame was written
    pub fn release(mut self) {
        self.settle();
    }

    fn settle(&mut self) {
        if let Some(mut bucket) = self.bucket.take() {
            bucket.reset_at = Some(Instant::now() + self.cool_down);
        }
    }
}

impl Drop for BucketPermit {
    fn drop(&mut self) {
        self.settle();
    }
}
