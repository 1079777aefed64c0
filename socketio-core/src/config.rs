use std::time::Duration;

use engineio_core::config::{ConfigError, EngineIoConfig};

/// Socket.IO layer configuration: the engine timings plus the acknowledgement
/// deadline for server-initiated emits.
#[derive(Debug, Clone)]
pub struct SocketIoConfig {
    pub engine: EngineIoConfig,
    pub ack_timeout: Duration,
}

impl Default for SocketIoConfig {
    fn default() -> Self {
        Self {
            engine: EngineIoConfig::default(),
            ack_timeout: Duration::from_secs(5),
        }
    }
}

impl SocketIoConfig {
    /// Engine settings from the `SIO_ENGINEIO_*` environment, read once.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            engine: EngineIoConfig::from_env()?,
            ..Self::default()
        })
    }
}
