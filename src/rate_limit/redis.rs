use anyhow::Context;
use chrono::{Duration, DurationRound, Utc};
use redis::Commands;

use super::{RateLimitError, RateLimiter};

/// A rate limiter that uses Redis as a backing store.
pub struct RedisRateLimiter {
    client: redis::Client,
}

impl RedisRateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    ///
    /// * `connection_uri` - The connection string used to connect to Redis.
    pub fn new(connection_uri: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: redis::Client::open(connection_uri)?,
        })
    }
}

impl RateLimiter for RedisRateLimiter {
    fn record_operation(&self, key: &str, max_req_per_min: u64) -> Result<(), RateLimitError> {
        // Fixed one-minute windows, as in the basic algorithm from the Redis
        // documentation:
        // https://redis.com/redis-best-practices/basic-rate-limiting/
        let mut conn = self
            .client
            .get_connection()
            .context("Failed to connect to Redis.")?;

        // The minute of the hour is enough for the cache key because the key
        // expires long before the same minute comes around again.
        let now = Utc::now();
        let cache_key = format!("{}:{}", key, now.format("%M"));

        let hits: Option<u64> = conn
            .get(&cache_key)
            .context("Failed to read rate limit counter.")?;
        if hits.unwrap_or_default() >= max_req_per_min {
            // Truncation only fails for timestamps near the limits of the
            // representable range.
            let limit_expiration = (now + Duration::minutes(1))
                .duration_trunc(Duration::minutes(1))
                .context("Failed to compute rate limit expiration.")?;

            return Err(RateLimitError::LimitedUntil(limit_expiration));
        }

        redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(&cache_key)
            .ignore()
            .cmd("EXPIRE")
            .arg(&cache_key)
            .arg(59)
            .ignore()
            .query::<()>(&mut conn)
            .context("Failed to increment rate limit counter.")?;

        Ok(())
    }
}
