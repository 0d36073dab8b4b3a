//! TTL cache around the recommendation pipeline
//!
//! A cache hit returns the exact ranked list of the last fresh computation
//! until the TTL elapses, an invalidating playback event fires, or the user
//! asks for a refresh. A miss recomputes synchronously; that is acceptable
//! because the underlying candidate scan is chunk-bounded.

use crate::error::Result;
use crate::types::RecommendationResult;
use cadenza_core::TrackId;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheKey {
    seed: Option<TrackId>,
    count: usize,
}

struct CacheEntry {
    key: CacheKey,
    result: RecommendationResult,
    computed_at: Instant,
}

/// TTL cache over recommendation results
pub struct RecommendationCache {
    // One entry; the lock is held across the recompute so concurrent
    // requesters share a single computation instead of racing.
    inner: Mutex<Option<CacheEntry>>,
    ttl: Duration,
}

impl RecommendationCache {
    /// Create an empty cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(None),
            ttl,
        }
    }

    /// Return the cached result for this request, or recompute it
    pub async fn get_or_compute<F, Fut>(
        &self,
        seed: Option<TrackId>,
        count: usize,
        compute: F,
    ) -> Result<RecommendationResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RecommendationResult>>,
    {
        let key = CacheKey { seed, count };
        let mut slot = self.inner.lock().await;

        if let Some(entry) = slot.as_ref() {
            if entry.key == key && entry.computed_at.elapsed() < self.ttl {
                tracing::debug!("Recommendation cache hit");
                return Ok(entry.result.clone());
            }
        }

        tracing::debug!("Recommendation cache miss, recomputing");
        let result = compute().await?;
        *slot = Some(CacheEntry {
            key,
            result: result.clone(),
            computed_at: Instant::now(),
        });
        Ok(result)
    }

    /// Drop the cached result; the next request recomputes
    pub async fn invalidate(&self) {
        *self.inner.lock().await = None;
    }
}
