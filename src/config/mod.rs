//! Configuration management for vm2dhcp
//!
//! Values are resolved in three layers: built-in defaults, then the TOML
//! file, then `V2D_*` environment variables.

use crate::error::{Result, Vm2DhcpError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub platform: PlatformConfig,
    pub registry: RegistryConfig,
    pub filter: FilterConfig,
    pub metrics: MetricsConfig,
}

/// Virtualization platform (event source) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub address: String,
    pub username: String,
    pub password: String,
    /// Custom attributes named `<namespace><option>` become DHCP options
    pub custom_attribute_namespace: String,
    /// Monitored networks; empty means every network
    pub networks: Vec<String>,
    pub page_size: usize,
    pub poll_interval: String,
}

/// Lease registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub address: String,
    pub port: u16,
    pub key_name: String,
    pub key_value: String,
    /// Registry group handed to every created host; empty means none
    pub group: String,
}

/// Event filter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Guest OS identifiers matching this pattern (case-insensitive) are skipped
    pub unmanaged_guest_pattern: String,
}

/// Prometheus exporter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            username: "admin".to_string(),
            password: "password".to_string(),
            custom_attribute_namespace: "dhcp.".to_string(),
            networks: Vec::new(),
            page_size: 1000,
            poll_interval: "5s".to_string(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 7991,
            key_name: "omapi_key".to_string(),
            key_value: "REVGQVVMVF9ESENQX0tFWV9WQUxVRQ==".to_string(),
            group: String::new(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            unmanaged_guest_pattern: "^win.+".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8000,
        }
    }
}

impl RegistryConfig {
    /// Configured group, `None` when left empty
    pub fn group(&self) -> Option<&str> {
        let group = self.group.trim();
        (!group.is_empty()).then_some(group)
    }
}

impl PlatformConfig {
    /// Delay between two event windows
    pub fn poll_interval(&self) -> Result<Duration> {
        parse_interval(&self.poll_interval).ok_or_else(|| Vm2DhcpError::InvalidConfigValue {
            path: "platform.poll_interval".to_string(),
            message: format!("Invalid duration format: {}", self.poll_interval),
        })
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Vm2DhcpError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| Vm2DhcpError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| Vm2DhcpError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: V2D_<KEY>=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply overrides from an arbitrary set of `(name, value)` pairs
    pub fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("V2D_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "DHCP_ADDRESS" => self.registry.address = value.to_string(),
            "DHCP_GROUP" => self.registry.group = value.to_string(),
            "DHCP_KEY_NAME" => self.registry.key_name = value.to_string(),
            "DHCP_KEY_VALUE" => self.registry.key_value = value.to_string(),
            "DHCP_PORT" => self.registry.port = parse_env(key, value)?,
            "PROM_ENABLED" => self.metrics.enabled = parse_bool(key, value)?,
            "PROM_PORT" => self.metrics.port = parse_env(key, value)?,
            "VC_ADDRESS" => self.platform.address = value.to_string(),
            "VC_CUSTOMATTRIBUTE_DHCPOPTION_NAMESPACE" => {
                self.platform.custom_attribute_namespace = value.to_string()
            }
            "VC_PASSWORD" => self.platform.password = value.to_string(),
            "VC_USERNAME" => self.platform.username = value.to_string(),
            "VM_NETWORKS" => {
                self.platform.networks = value
                    .split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", key);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Vm2DhcpError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("vm2dhcp").join("config.toml"))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Vm2DhcpError::InvalidConfigValue {
            path: key.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Vm2DhcpError::InvalidConfigValue {
            path: key.to_string(),
            message: format!("Cannot parse '{}' as boolean", value),
        }),
    }
}

/// Parse interval strings such as "5s", "500ms", "2m" or bare seconds
pub fn parse_interval(interval: &str) -> Option<Duration> {
    let interval = interval.trim();

    // "ms" before "s" because "ms" ends with "s"
    if let Some(ms) = interval.strip_suffix("ms") {
        ms.trim().parse().ok().map(Duration::from_millis)
    } else if let Some(secs) = interval.strip_suffix('s') {
        secs.trim().parse().ok().map(Duration::from_secs)
    } else if let Some(mins) = interval.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        interval.parse().ok().map(Duration::from_secs)
    }
}
