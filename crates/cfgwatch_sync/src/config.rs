//! Configuration for the sync engine.

use crate::keypath::{server_prefix, CONFIG_ROOT};
use std::time::Duration;

/// Configuration for a sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server whose subtree is mirrored.
    pub server: String,
    /// Pacing of retries after cluster-transient faults.
    pub retry: RetryConfig,
    /// Ends the session after this long, if set.
    pub timeout: Option<Duration>,
}

impl SyncConfig {
    /// Creates a configuration for `server`.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            retry: RetryConfig::default(),
            timeout: None,
        }
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets a session deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the watched directory (`/config/<server>`).
    pub fn prefix(&self) -> String {
        server_prefix(CONFIG_ROOT, &self.server)
    }

    /// Returns the root setting names are resolved against
    /// (`/config/<server>/`).
    pub fn root(&self) -> String {
        format!("{}/", self.prefix())
    }
}

/// Pacing of consecutive cluster-transient retries.
///
/// Transient faults are retried without limit. The delay grows with each
/// consecutive fault and resets after any delivered event.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a backoff configuration.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Retries immediately, with no delay.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay before retry number `attempt` (1-indexed;
    /// attempt 0 is the original request).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% extra
            let jitter = delay_secs * 0.25 * rand::random::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::immediate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("web1")
            .with_retry(RetryConfig::new(
                Duration::from_millis(50),
                Duration::from_secs(2),
            ))
            .with_timeout(Duration::from_secs(60));

        assert_eq!(config.server, "web1");
        assert_eq!(config.prefix(), "/config/web1");
        assert_eq!(config.root(), "/config/web1/");
        assert_eq!(config.retry.initial_delay, Duration::from_millis(50));
        assert_eq!(config.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn default_retry_is_immediate() {
        let config = RetryConfig::default();
        for attempt in 0..10 {
            assert_eq!(config.delay_for_attempt(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(Duration::from_millis(100), Duration::from_secs(30))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay3 = config.delay_for_attempt(3);
        assert!(delay3 >= Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(Duration::from_secs(1), Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }
}
