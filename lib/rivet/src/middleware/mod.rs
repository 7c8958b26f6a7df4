//! Tower middleware layers for the rivet request pipeline.
//!
//! [`ClientBuilder::build`](crate::ClientBuilder::build) stacks these layers
//! around the transport, innermost first:
//!
//! 1. [`AuthLayer`] - applies credentials, fails fast without a network call
//! 2. [`UserAgentLayer`] - sets the `User-Agent` header
//! 3. [`RateLimitRecoveryLayer`] - waits out a 429 and re-issues once
//! 4. [`RetryLayer`] - retries 5xx and transport failures with backoff
//! 5. [`LoggingLayer`] - one log record per logical call
//! 6. caller layers added with `.layer()`, first added = outermost
//!
//! Layers 3 and 4 are replaced by a resilience layer when one is supplied.
//! The built-in alternatives are [`TokenBucketLayer`] and
//! [`CircuitBreakerLayer`].
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `resilience-token-bucket` | [`TokenBucketLayer`] (governor) |
//! | `resilience-circuit-breaker` | [`CircuitBreakerLayer`] |

use std::pin::Pin;

use bytes::Bytes;

use crate::{Response, Result};

mod auth;
#[cfg(feature = "resilience-circuit-breaker")]
mod circuit_breaker;
mod logging;
mod rate_limit;
mod retry;
#[cfg(feature = "resilience-token-bucket")]
mod token_bucket;
mod user_agent;

#[cfg(test)]
pub(crate) mod mock;

pub use auth::{Auth, AuthLayer};
#[cfg(feature = "resilience-circuit-breaker")]
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerLayer, CircuitState,
};
pub use logging::{Logging, LoggingLayer};
pub use rate_limit::{
    DEFAULT_RETRY_AFTER, RateLimitInfo, RateLimitRecovery, RateLimitRecoveryLayer,
    parse_retry_after,
};
pub use retry::{Backoff, Retry, RetryLayer, calculate_backoff, is_retryable_status};
#[cfg(feature = "resilience-token-bucket")]
pub use token_bucket::{TokenBucket, TokenBucketLayer};
pub use user_agent::{UserAgent, UserAgentLayer};

// Re-export tower types for convenience
pub use tower::{Layer, ServiceBuilder};

/// Boxed future returned by every rivet middleware service.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response<Bytes>>> + Send + 'static>>;
