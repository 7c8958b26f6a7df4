//! Client configuration types.

use std::time::Duration;

use crate::middleware::Backoff;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("rivet/", env!("CARGO_PKG_VERSION"));

/// Configuration for the HTTP client.
///
/// There is no implicit overall request timeout: callers bound a call through
/// its [`CallContext`](crate::CallContext). `timeout` is an optional cap on a
/// single network exchange.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-exchange transport timeout. `None` disables it.
    pub timeout: Option<Duration>,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_idle_per_host: usize,
    /// Idle connection timeout.
    pub pool_idle_timeout: Duration,
    /// Value of the `User-Agent` header set on every request.
    pub user_agent: String,
    /// Retries after the first attempt for 5xx and transport failures.
    pub max_retries: u32,
    /// Delay schedule between retries.
    pub backoff: Backoff,
    /// Extra wait added on top of `Retry-After` when a 429 is received.
    pub rate_limit_buffer: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: Duration::from_secs(10),
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_retries: 3,
            backoff: Backoff::default(),
            rate_limit_buffer: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    pool_idle_per_host: Option<usize>,
    pool_idle_timeout: Option<Duration>,
    user_agent: Option<String>,
    max_retries: Option<u32>,
    backoff: Option<Backoff>,
    rate_limit_buffer: Option<Duration>,
}

impl ClientConfigBuilder {
    /// Cap each network exchange at `timeout`.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.pool_idle_per_host = Some(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Set the `User-Agent` header value.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the number of retries after the first attempt.
    #[must_use]
    pub const fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the retry backoff schedule.
    #[must_use]
    pub const fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Set the buffer added to `Retry-After` waits.
    #[must_use]
    pub const fn rate_limit_buffer(mut self, buffer: Duration) -> Self {
        self.rate_limit_buffer = Some(buffer);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            timeout: self.timeout.or(defaults.timeout),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            pool_idle_per_host: self
                .pool_idle_per_host
                .unwrap_or(defaults.pool_idle_per_host),
            pool_idle_timeout: self.pool_idle_timeout.unwrap_or(defaults.pool_idle_timeout),
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            backoff: self.backoff.unwrap_or(defaults.backoff),
            rate_limit_buffer: self.rate_limit_buffer.unwrap_or(defaults.rate_limit_buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        check!(config.timeout.is_none());
        check!(config.connect_timeout == Duration::from_secs(10));
        check!(config.pool_idle_per_host == 32);
        check!(config.max_retries == 3);
        check!(config.rate_limit_buffer == Duration::from_millis(500));
        check!(config.user_agent.starts_with("rivet/"));
    }

    #[test]
    fn builder_overrides() {
        let config = ClientConfig::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_per_host(16)
            .user_agent("jira-sync/2.1")
            .max_retries(0)
            .build();

        check!(config.timeout == Some(Duration::from_secs(60)));
        check!(config.connect_timeout == Duration::from_secs(5));
        check!(config.pool_idle_per_host == 16);
        check!(config.user_agent == "jira-sync/2.1");
        check!(config.max_retries == 0);
    }
}
