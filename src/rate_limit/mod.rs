mod redis;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use self::redis::RedisRateLimiter;

/// A requests-per-minute definition of a rate limiter.
pub trait RateLimiter: Send + Sync {
    /// Record an operation against a resource, failing if the resource's rate
    /// limit has already been reached.
    ///
    /// # Arguments
    ///
    /// * `key` - A unique key for the resource being rate limited. In the
    ///   context of a web request, this should encapsulate the request path and
    ///   method, as well as the actor making the request.
    /// * `max_req_per_min` - The maximum number of operations allowed in a
    ///   given minute.
    ///
    /// # Returns
    ///
    /// An empty [Ok] result if the operation is allowed. A
    /// [`RateLimitError::LimitedUntil`] is returned if the limit has been
    /// exceeded, and [`RateLimitError::Other`] if the rate limiter could not
    /// determine the requestor's state.
    fn record_operation(&self, key: &str, max_req_per_min: u64) -> Result<(), RateLimitError>;
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The rate limit has been exceeded. Requests will be accepted again at the
    /// contained timestamp.
    #[error("rate limited until {0}")]
    LimitedUntil(DateTime<Utc>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
