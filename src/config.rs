use std::time::Duration;

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum automatic reconnection attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnection attempt
    pub base_delay: Duration,
    /// Ceiling for the exponentially growing reconnection delay
    pub max_delay: Duration,
    /// Timeout for the WebSocket handshake
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 10,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Create a new builder for configuration
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Delay before reconnection attempt number `attempt` (1-indexed).
    ///
    /// Pure exponential backoff, no jitter:
    /// `min(base_delay * 2^(attempt-1), max_delay)`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        debug_assert!(attempt >= 1, "attempts are 1-indexed");
        let doublings = attempt.saturating_sub(1).min(63);
        let base_ms = self.base_delay.as_millis() as u64;
        let raw_ms = base_ms.saturating_mul(1u64 << doublings);
        Duration::from_millis(raw_ms.min(self.max_delay.as_millis() as u64))
    }
}

/// Builder for ClientConfig
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the maximum number of reconnection attempts
    pub fn max_reconnect_attempts(mut self, max: u32) -> Self {
        self.config.max_reconnect_attempts = max;
        self
    }

    /// Set the initial reconnection delay
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Set the maximum reconnection delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Set the handshake timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Build the configuration with validation.
    ///
    /// Returns an error for invalid configurations (e.g., `max_delay`
    /// smaller than `base_delay`).
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        if self.config.base_delay.is_zero() {
            return Err(ConfigError::InvalidBackoff(
                "base_delay must be > 0".to_string(),
            ));
        }

        if self.config.max_delay < self.config.base_delay {
            return Err(ConfigError::InvalidBackoff(
                "max_delay must be >= base_delay".to_string(),
            ));
        }

        if self.config.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connect_timeout must be > 0".to_string(),
            ));
        }

        Ok(self.config)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid backoff configuration
    #[error("Invalid backoff configuration: {0}")]
    InvalidBackoff(String),
    /// Invalid timeout configuration
    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delay_doubles_and_caps() {
        let config = ClientConfig::default();

        assert_eq!(config.reconnect_delay(1), Duration::from_millis(1000));
        assert_eq!(config.reconnect_delay(2), Duration::from_millis(2000));
        assert_eq!(config.reconnect_delay(3), Duration::from_millis(4000));
        assert_eq!(config.reconnect_delay(4), Duration::from_millis(8000));
        assert_eq!(config.reconnect_delay(5), Duration::from_millis(16_000));

        // 1000 * 2^5 = 32000, capped at 30000
        assert_eq!(config.reconnect_delay(6), Duration::from_millis(30_000));
        assert_eq!(config.reconnect_delay(10), Duration::from_millis(30_000));
    }

    #[test]
    fn test_reconnect_delay_does_not_overflow() {
        let config = ClientConfig::default();
        assert_eq!(
            config.reconnect_delay(u32::MAX),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.base_delay, Duration::from_millis(1000));
        assert_eq!(config.max_delay, Duration::from_millis(30_000));
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::builder()
            .max_reconnect_attempts(3)
            .base_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(50))
            .build()
            .expect("valid config");

        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_delay(1), Duration::from_millis(10));
        assert_eq!(config.reconnect_delay(3), Duration::from_millis(40));
        assert_eq!(config.reconnect_delay(4), Duration::from_millis(50));
    }

    #[test]
    fn test_config_builder_rejects_inverted_delays() {
        let result = ClientConfig::builder()
            .base_delay(Duration::from_secs(60))
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_config_builder_rejects_zero_base_delay() {
        let result = ClientConfig::builder().base_delay(Duration::ZERO).build();
        assert!(result.is_err());
    }
}
