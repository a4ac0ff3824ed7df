//! CLI for this application
//!
use crate::settings;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Debug, clap::Parser)]
#[clap(name = APP_NAME, version = APP_VERSION)]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = "0.0.0.0",
        env("MAGPIE_LISTEN_ADDRESS"),
        help = "IP Address to listen on"
    )]
    pub listen_address: String,

    // Listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT,
        env("MAGPIE_PORT"),
        help = "Server port, an integer"
    )]
    pub port: u16,

    // Secret for SHARE
    #[clap(
        long,
        env("MAGPIE_SECRET"),
        help = "Secret required to share files; generated when omitted"
    )]
    pub secret: Option<String>,

    // Advertised hostname
    #[clap(
        long = "advertisedhostname",
        default_value = settings::DEFAULT_ADVERTISED_HOSTNAME,
        env("MAGPIE_ADVERTISED_HOSTNAME"),
        help = "Advertised hostname"
    )]
    pub advertised_hostname: String,

    // Per-source admission interval
    #[clap(
        long = "connectionintervallimit",
        default_value = settings::DEFAULT_CONNECTION_INTERVAL_SECS,
        env("MAGPIE_CONNECTION_INTERVAL_LIMIT"),
        help = "Connection interval limit in seconds"
    )]
    pub connection_interval_limit: u64,

    // Gossip period
    #[clap(
        long = "exchangeinterval",
        default_value = settings::DEFAULT_EXCHANGE_INTERVAL_SECS,
        env("MAGPIE_EXCHANGE_INTERVAL"),
        help = "Exchange interval in seconds"
    )]
    pub exchange_interval: u64,

    // Socket I/O timeout
    #[clap(
        long,
        default_value = settings::DEFAULT_SOCKET_TIMEOUT_SECS,
        env("MAGPIE_SOCKET_TIMEOUT"),
        help = "Socket timeout in seconds"
    )]
    pub timeout: u64,

    // Worker pool size
    #[clap(
        long,
        default_value = settings::DEFAULT_MAX_WORKERS,
        env("MAGPIE_MAX_WORKERS"),
        help = "Maximum concurrently handled connections"
    )]
    pub max_workers: usize,

    #[clap(long, help = "Print debug information")]
    pub debug: bool,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            listen_address: self.listen_address,
            port: self.port,
            secret: self.secret.unwrap_or_else(settings::generate_secret),
            advertised_hostname: self.advertised_hostname,
            connection_interval_limit_secs: self.connection_interval_limit,
            exchange_interval_secs: self.exchange_interval,
            socket_timeout_secs: self.timeout,
            max_workers: self.max_workers.max(1),
            debug: self.debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_server_flags() {
        let cli = Cli::try_parse_from([
            "magpie",
            "--port",
            "4000",
            "--secret",
            "s3cr3t",
            "--advertisedhostname",
            "node-a",
            "--connectionintervallimit",
            "2",
            "--exchangeinterval",
            "30",
            "--debug",
        ])
        .unwrap();

        let settings = cli.into_settings();
        assert_eq!(settings.port, 4000);
        assert_eq!(settings.secret, "s3cr3t");
        assert_eq!(settings.advertised_hostname, "node-a");
        assert_eq!(settings.connection_interval_limit_secs, 2);
        assert_eq!(settings.exchange_interval_secs, 30);
        assert_eq!(settings.socket_timeout_secs, 60);
        assert_eq!(settings.max_workers, 20);
        assert!(settings.debug);
    }

    #[test]
    fn test_missing_secret_is_generated() {
        let settings = Cli::try_parse_from(["magpie"]).unwrap().into_settings();
        assert!(!settings.secret.is_empty());
        assert!(!settings.debug);
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["magpie", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
        assert!(err.to_string().contains(APP_VERSION));
        assert_eq!(APP_NAME, "magpie");
    }
}
