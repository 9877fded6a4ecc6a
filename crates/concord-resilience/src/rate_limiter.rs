use std::time::{Duration, Instant};

use concord_core::error::SyncError;
use dashmap::DashMap;
use tracing::warn;

/// Total time a caller will wait across repeated [`RateLimiter::acquire`]
/// polls before giving up (§4.8: "excess requests wait up to 30s then fail
/// RateLimited (retryable)").
const MAX_ACQUIRE_WAIT: Duration = Duration::from_secs(30);

/// Token-bucket rate limiter keyed by an arbitrary string (tracker name,
/// endpoint, project identifier — §4.8). Each tracker client holds one
/// instance configured from its own `requests_per_second` setting.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded for `{key}` – retry after {retry_after:?}")]
    Exceeded { key: String, retry_after: Duration },
}

impl From<RateLimitError> for SyncError {
    fn from(err: RateLimitError) -> Self {
        SyncError::Transient(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub tokens_per_second: f64,
    pub max_burst: f64,
}

impl RateLimitConfig {
    pub fn per_second(count: u32) -> Self {
        Self {
            tokens_per_second: count as f64,
            max_burst: count as f64,
        }
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.max_burst = burst as f64;
        self
    }
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(max_burst: f64) -> Self {
        Self {
            tokens: max_burst,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, tokens_per_second: f64, max_burst: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * tokens_per_second).min(max_burst);
        self.last_refill = now;
    }

    fn try_consume(&mut self, cost: f64, tokens_per_second: f64, max_burst: f64) -> Result<(), Duration> {
        self.refill(tokens_per_second, max_burst);
        if self.tokens >= cost {
            self.tokens -= cost;
            Ok(())
        } else {
            let deficit = cost - self.tokens;
            let wait = Duration::from_secs_f64(deficit / tokens_per_second);
            Err(wait)
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.config.max_burst));

        match bucket.try_consume(1.0, self.config.tokens_per_second, self.config.max_burst) {
            Ok(()) => Ok(()),
            Err(retry_after) => {
                warn!(key, ?retry_after, "rate limit exceeded");
                Err(RateLimitError::Exceeded {
                    key: key.to_string(),
                    retry_after,
                })
            }
        }
    }

    /// Blocks (async) until a token is available for `key`, then consumes
    /// it. Gives up once the cumulative wait would exceed
    /// [`MAX_ACQUIRE_WAIT`], returning the retryable error rather than
    /// stalling the caller forever.
    pub async fn acquire(&self, key: &str) -> Result<(), RateLimitError> {
        let mut waited = Duration::ZERO;
        loop {
            match self.check(key) {
                Ok(()) => return Ok(()),
                Err(err @ RateLimitError::Exceeded { ref retry_after, .. }) => {
                    if waited + *retry_after > MAX_ACQUIRE_WAIT {
                        return Err(err);
                    }
                    waited += *retry_after;
                    tokio::time::sleep(*retry_after).await;
                }
            }
        }
    }

    pub fn remaining(&self, key: &str) -> f64 {
        match self.buckets.get(key) {
            Some(bucket) => {
                let elapsed = bucket.last_refill.elapsed().as_secs_f64();
                (bucket.tokens + elapsed * self.config.tokens_per_second).min(self.config.max_burst)
            }
            None => self.config.max_burst,
        }
    }
}
