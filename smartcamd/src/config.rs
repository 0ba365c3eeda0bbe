use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::{DEFAULT_CACHE_CONTROL, DEFAULT_SERVER_ID, SSDP_MULTICAST_ADDR};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub ssdp: SsdpConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub subscribers: SubscribersConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Fixed device UUID; a fresh v4 UUID is used for each run when unset
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default = "default_friendly_name")]
    pub friendly_name: String,
    #[serde(default)]
    /// Address put into LOCATION; detected from the routing table when unset
    pub advertise_address: Option<Ipv4Addr>,
    #[serde(default)]
    pub presentation_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SsdpConfig {
    #[serde(default = "default_ssdp_bind")]
    pub bind: String,
    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,
    /// Upper bound on how long the receive loop waits before re-checking for shutdown
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_announce_interval")]
    pub announce_interval_secs: u64,
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    pub psk: String,
    #[serde(default = "default_descriptor_path")]
    pub descriptor_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribersConfig {
    #[serde(default = "default_subscribers_path")]
    pub path: PathBuf,
    /// Optional periodic prune; 0 disables it and leaves pruning lazy
    #[serde(default)]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
    /// Extra attempts after the first failed delivery
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_friendly_name() -> String {
    "SmartCamera".to_string()
}

fn default_ssdp_bind() -> String {
    "0.0.0.0:1900".to_string()
}

fn default_multicast_group() -> Ipv4Addr {
    SSDP_MULTICAST_ADDR.parse().unwrap_or(Ipv4Addr::new(239, 255, 255, 250))
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_announce_interval() -> u64 {
    900
}

fn default_server() -> String {
    DEFAULT_SERVER_ID.to_string()
}

fn default_cache_control() -> String {
    DEFAULT_CACHE_CONTROL.to_string()
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_descriptor_path() -> String {
    "/smartcam.xml".to_string()
}

fn default_subscribers_path() -> PathBuf {
    PathBuf::from("/var/lib/smartcam/subscribers.sub")
}

fn default_notify_timeout() -> u64 {
    5
}

fn default_retry_backoff() -> u64 {
    500
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            uuid: None,
            friendly_name: default_friendly_name(),
            advertise_address: None,
            presentation_url: None,
        }
    }
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            bind: default_ssdp_bind(),
            multicast_group: default_multicast_group(),
            poll_interval_ms: default_poll_interval(),
            announce_interval_secs: default_announce_interval(),
            server: default_server(),
            cache_control: default_cache_control(),
        }
    }
}

impl Default for SubscribersConfig {
    fn default() -> Self {
        Self {
            path: default_subscribers_path(),
            sweep_interval_secs: 0,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_notify_timeout(),
            retries: 0,
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl SsdpConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs.max(1))
    }
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        anyhow::ensure!(
            config.api.descriptor_path.starts_with('/'),
            "api.descriptor_path must start with '/': {:?}",
            config.api.descriptor_path
        );
        Ok(config)
    }
}
