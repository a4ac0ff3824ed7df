//! Magpie application settings
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::config_error;
use crate::error::Result;

pub const STANDARD_PORT: u16 = 3000;
pub const DEFAULT_PORT: &str = "3000";
pub const DEFAULT_ADVERTISED_HOSTNAME: &str = "localhost";
pub const DEFAULT_CONNECTION_INTERVAL_SECS: &str = "1";
pub const DEFAULT_EXCHANGE_INTERVAL_SECS: &str = "600";
pub const DEFAULT_SOCKET_TIMEOUT_SECS: &str = "60";
pub const DEFAULT_MAX_WORKERS: &str = "20";

const SECRET_LENGTH: usize = 26;

#[derive(Clone, Debug)]
pub struct Settings {
    // Server listen address
    pub listen_address: String,

    // Listen port, also advertised to peers
    pub port: u16,

    // Shared secret required by SHARE
    pub secret: String,

    // Hostname this server advertises to peers and stamps as origin
    pub advertised_hostname: String,

    // Minimum seconds between admitted connections from one source address
    pub connection_interval_limit_secs: u64,

    // Seconds between gossip rounds
    pub exchange_interval_secs: u64,

    // Bound on every socket read/write/connect
    pub socket_timeout_secs: u64,

    // Concurrently executing connection handlers
    pub max_workers: usize,

    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            port: STANDARD_PORT,
            secret: generate_secret(),
            advertised_hostname: DEFAULT_ADVERTISED_HOSTNAME.to_string(),
            connection_interval_limit_secs: 1,
            exchange_interval_secs: 600,
            socket_timeout_secs: 60,
            max_workers: 20,
            debug: false,
        }
    }
}

impl Settings {
    pub fn connection_interval(&self) -> Duration {
        Duration::from_secs(self.connection_interval_limit_secs)
    }

    pub fn exchange_interval(&self) -> Duration {
        Duration::from_secs(self.exchange_interval_secs)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.listen_address.parse().map_err(|e| {
            config_error!("Invalid listen address {}: {}", self.listen_address, e)
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Random alphanumeric secret used when none is configured
pub fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}
