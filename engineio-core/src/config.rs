use std::time::Duration;

/// Environment keys read once at engine start.
pub const ENV_PING_INTERVAL: &str = "SIO_ENGINEIO_PING_INTERVAL_MS";
pub const ENV_PING_TIMEOUT: &str = "SIO_ENGINEIO_PING_TIMEOUT_MS";
pub const ENV_MAX_PAYLOAD: &str = "SIO_ENGINEIO_MAX_PAYLOAD_BYTES";

/// Global timing and payload settings for the engine.
///
/// Built once and handed to every component by value; nothing re-reads the
/// environment after startup and there are no per-session overrides.
#[derive(Debug, Clone)]
pub struct EngineIoConfig {
    /// Period between server pings, also advertised in the OPEN packet.
    pub ping_interval: Duration,
    /// Grace period after a ping before the session is considered dead.
    pub ping_timeout: Duration,
    /// Upper bound in bytes for a single polling batch.
    pub max_payload: u64,
}

impl Default for EngineIoConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(25_000),
            ping_timeout: Duration::from_millis(20_000),
            max_payload: 1_000_000,
        }
    }
}

impl EngineIoConfig {
    pub fn builder() -> EngineIoConfigBuilder {
        EngineIoConfigBuilder::new()
    }

    /// Builds a config from the `SIO_ENGINEIO_*` environment, falling back to
    /// the defaults for absent keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(v) = std::env::var(ENV_PING_INTERVAL) {
            config.ping_interval = Duration::from_millis(parse_env(ENV_PING_INTERVAL, &v)?);
        }
        if let Ok(v) = std::env::var(ENV_PING_TIMEOUT) {
            config.ping_timeout = Duration::from_millis(parse_env(ENV_PING_TIMEOUT, &v)?);
        }
        if let Ok(v) = std::env::var(ENV_MAX_PAYLOAD) {
            config.max_payload = parse_env(ENV_MAX_PAYLOAD, &v)?;
        }
        Ok(config)
    }
}

fn parse_env(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Default)]
pub struct EngineIoConfigBuilder {
    config: EngineIoConfig,
}

impl EngineIoConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineIoConfig::default(),
        }
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.config.ping_timeout = timeout;
        self
    }

    pub fn max_payload(mut self, max_payload: u64) -> Self {
        self.config.max_payload = max_payload;
        self
    }

    pub fn build(self) -> EngineIoConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineIoConfig::default();
        assert_eq!(config.ping_interval, Duration::from_millis(25_000));
        assert_eq!(config.ping_timeout, Duration::from_millis(20_000));
        assert_eq!(config.max_payload, 1_000_000);
    }

    #[test]
    fn builder_overrides() {
        let config = EngineIoConfig::builder()
            .ping_interval(Duration::from_millis(300))
            .ping_timeout(Duration::from_millis(200))
            .max_payload(1e6 as u64)
            .build();
        assert_eq!(config.ping_interval, Duration::from_millis(300));
        assert_eq!(config.ping_timeout, Duration::from_millis(200));
        assert_eq!(config.max_payload, 1_000_000);
    }

    #[test]
    fn env_overrides() {
        std::env::set_var(ENV_PING_INTERVAL, "1000");
        std::env::set_var(ENV_PING_TIMEOUT, "500");
        std::env::set_var(ENV_MAX_PAYLOAD, "4096");
        let config = EngineIoConfig::from_env().unwrap();
        assert_eq!(config.ping_interval, Duration::from_millis(1000));
        assert_eq!(config.ping_timeout, Duration::from_millis(500));
        assert_eq!(config.max_payload, 4096);

        std::env::set_var(ENV_MAX_PAYLOAD, "not-a-number");
        assert!(EngineIoConfig::from_env().is_err());

        std::env::remove_var(ENV_PING_INTERVAL);
        std::env::remove_var(ENV_PING_TIMEOUT);
        std::env::remove_var(ENV_MAX_PAYLOAD);
    }
}
