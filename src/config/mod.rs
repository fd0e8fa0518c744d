//! Configuration management for Charon.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// TCP port the relay sniffs on the listen devices.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Source port of the carrier flow on the upstream device.
    #[serde(default = "default_up_port")]
    pub up_port: u16,

    /// Remote server address.
    pub server_ip: IpAddr,

    /// Remote server port.
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// System names of the devices to sniff user traffic on.
    #[serde(default)]
    pub listen_devs: Vec<String>,

    /// System name of the upstream egress device.
    pub up_dev: String,

    /// Next-hop gateway identity.
    pub gateway: GatewayConfig,

    /// Flow table housekeeping.
    #[serde(default)]
    pub nat: NatConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The next hop on the upstream path. The relay does not resolve this
/// itself; both fields come from the operator (or an external resolver).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub ip: IpAddr,
    /// Hardware address, `aa:bb:cc:dd:ee:ff`.
    pub mac: String,
}

/// Flow table housekeeping knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatConfig {
    /// Drop a flow binding after this long without traffic.
    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// How often the eviction sweep runs.
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

fn default_listen_port() -> u16 {
    4001
}

fn default_up_port() -> u16 {
    4002
}

fn default_server_port() -> u16 {
    4003
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for NatConfig {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Config {
    /// A configuration with default ports and housekeeping, ready for
    /// listen devices to be filled in.
    pub fn new(server_ip: IpAddr, up_dev: impl Into<String>, gateway: GatewayConfig) -> Self {
        Self {
            listen_port: default_listen_port(),
            up_port: default_up_port(),
            server_ip,
            server_port: default_server_port(),
            listen_devs: Vec::new(),
            up_dev: up_dev.into(),
            gateway,
            nat: NatConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.listen_devs.is_empty() {
            return Err(Error::MissingDevice("listen".into()));
        }
        if self.up_dev.is_empty() {
            return Err(Error::MissingDevice("upstream".into()));
        }
        if self.listen_port == 0 || self.up_port == 0 || self.server_port == 0 {
            return Err(Error::Config("ports must be non-zero".into()));
        }
        self.gateway
            .mac
            .parse::<crate::layers::MacAddr>()
            .map(|_| ())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "text" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// ANSI colors in text output.
    #[serde(default = "default_log_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_log_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_log_color(),
        }
    }
}

/// Initialize the global tracing subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(config.color))
            .try_init()
            .map_err(|e| Error::Config(format!("failed to init logging: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            listen_port: 4001,
            up_port: 4002,
            server_ip: "203.0.113.10".parse().unwrap(),
            server_port: 4003,
            listen_devs: vec!["eth0".into()],
            up_dev: "eth1".into(),
            gateway: GatewayConfig {
                ip: "192.168.1.1".parse().unwrap(),
                mac: "aa:bb:cc:dd:ee:ff".into(),
            },
            nat: NatConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
            server_ip = "203.0.113.10"
            listen_devs = ["eth0"]
            up_dev = "eth1"

            [gateway]
            ip = "192.168.1.1"
            mac = "aa:bb:cc:dd:ee:ff"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.listen_port, default_listen_port());
        assert_eq!(config.server_port, default_server_port());
        assert_eq!(config.nat.idle_timeout, Duration::from_secs(600));
        config.validate().unwrap();
    }

    #[test]
    fn test_duration_fields_accept_humantime() {
        let toml = r#"
            server_ip = "203.0.113.10"
            listen_devs = ["eth0"]
            up_dev = "eth1"

            [gateway]
            ip = "192.168.1.1"
            mac = "aa:bb:cc:dd:ee:ff"

            [nat]
            idle_timeout = "5m"
            sweep_interval = "30s"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.nat.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.nat.sweep_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_empty_devices() {
        let mut config = sample_config();
        config.listen_devs.clear();
        assert!(matches!(
            config.validate().unwrap_err(),
            Error::MissingDevice(_)
        ));
    }

    #[test]
    fn test_validate_rejects_bad_mac() {
        let mut config = sample_config();
        config.gateway.mac = "not-a-mac".into();
        assert!(config.validate().is_err());
    }
}
