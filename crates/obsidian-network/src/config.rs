//! Network configuration.

use crate::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Network service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// P2P listen port; outbound dials target the same port on peers.
    pub port: u16,
    /// Bootstrap seed file, one peer address per line. A missing file is a
    /// warning, not an error.
    pub seed_file: PathBuf,
    /// Our own public address, if known. Used to avoid connecting to self.
    pub declared_address: Option<IpAddr>,
    /// Number of connections the dialer tries to maintain. Once reached,
    /// the dialer backs off.
    pub target_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            seed_file: PathBuf::from("peers.txt"),
            declared_address: None,
            target_connections: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.target_connections, 8);
        assert!(config.declared_address.is_none());
    }
}
