use std::time::Duration;

use ian_packets::{PacketConfig, Version};
use ian_transport::DEFAULT_CONNECT_TIMEOUT;

use crate::heartbeat::HeartbeatConfig;

/// Oldest server version a connection accepts.
pub const MIN_VERSION: Version = Version::new(2, 3, 0);

/// Default interval at which the send and event loops wake: 10 milliseconds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for an [`ArtemisNetworkInterface`](crate::ArtemisNetworkInterface).
#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    /// Framing limits. The local origin is always the client.
    pub packet: PacketConfig,
    pub heartbeat: HeartbeatConfig,
    /// Bound on resolving and connecting. Default: 5s.
    pub connect_timeout: Duration,
    /// Default: 10ms.
    pub poll_interval: Duration,
    /// Newest server version accepted. `None` accepts any version from
    /// [`MIN_VERSION`] up.
    pub max_version: Option<Version>,
}

impl InterfaceConfig {
    /// Whether a server announcing `version` may stay connected.
    pub fn supports(&self, version: Version) -> bool {
        version >= MIN_VERSION && self.max_version.is_none_or(|max| version <= max)
    }
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            packet: PacketConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_version: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_range() {
        let mut config = InterfaceConfig::default();
        assert!(config.supports(Version::new(2, 3, 0)));
        assert!(config.supports(Version::new(9, 0, 0)));
        assert!(!config.supports(Version::new(2, 2, 9)));

        config.max_version = Some(Version::new(2, 7, 1));
        assert!(config.supports(Version::new(2, 7, 1)));
        assert!(!config.supports(Version::new(2, 8, 0)));
    }
}
