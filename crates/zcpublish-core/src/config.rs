//! Configuration management for the zcpublish announcer.
//!
//! This module provides the configuration system used by the daemon:
//! - Loading from YAML files
//! - Environment variable overrides through the `config` crate
//! - Validation of all settings
//! - Publication settings, logging settings and declared endpoints

use crate::error::{ConfigError, Result};
use crate::types::{
    ChannelMap, ChannelPosition, Endpoint, EndpointId, EndpointKind, SampleFormat, SampleSpec,
    DEFAULT_NATIVE_PORT,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::Level;

/// Main application configuration.
///
/// # Examples
///
/// ```
/// use zcpublish_core::config::AppConfig;
///
/// let config = AppConfig::from_yaml("publish:\n  port: 4713\n").unwrap();
/// config.validate().unwrap();
/// assert_eq!(config.publish.port().unwrap(), 4713);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Announcement settings
    #[serde(default)]
    pub publish: PublishConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Endpoints to announce when no live registry feeds the daemon
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl AppConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate, layering
    /// `ZCPUBLISH__*` environment variables over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or merged.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("ZCPUBLISH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// Checks the port bounds, the logging level, that endpoint ids are
    /// unique and that every endpoint has a usable sample spec.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.publish.validate()?;
        self.logging.parse_level()?;

        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.id) {
                return Err(ConfigError::DuplicateEndpoint { id: endpoint.id }.into());
            }
            endpoint.validate()?;
        }

        Ok(())
    }

    /// Builds the endpoint snapshots declared in the configuration.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.iter().map(EndpointConfig::to_endpoint).collect()
    }
}

/// Settings of the announcer itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Port announced for every record. Kept wide so out-of-range values
    /// are reported instead of failing to parse.
    #[serde(default = "default_port")]
    pub port: u32,

    /// Login name used in service names; detected when unset
    #[serde(default)]
    pub user_name: Option<String>,

    /// Host name used in service names; detected when unset
    #[serde(default)]
    pub host_name: Option<String>,

    /// Fully qualified domain name for the TXT record; detected when unset
    #[serde(default)]
    pub fqdn: Option<String>,
}

fn default_port() -> u32 {
    u32::from(DEFAULT_NATIVE_PORT)
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            user_name: None,
            host_name: None,
            fqdn: None,
        }
    }
}

impl PublishConfig {
    /// Creates a config announcing `port`.
    pub fn with_port(port: u32) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Returns the validated port.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPort`] unless the port is in 1..=65535.
    pub fn port(&self) -> Result<u16> {
        match u16::try_from(self.port) {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(ConfigError::InvalidPort { port: self.port }.into()),
        }
    }

    /// Validates the publication settings.
    pub fn validate(&self) -> Result<()> {
        self.port()?;

        for (field, value) in [
            ("publish.user_name", &self.user_name),
            ("publish.host_name", &self.host_name),
            ("publish.fqdn", &self.fqdn),
        ] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(ConfigError::invalid_value(field, "cannot be empty").into());
            }
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Whether to include file/line info
    #[serde(default)]
    pub file_line: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            file_line: false,
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: format!("Invalid log level: {}", self.level),
            }
            .into()
        })
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}

/// An endpoint declared in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub id: u32,
    pub kind: EndpointKind,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub format: SampleFormat,
    #[serde(default = "default_rate")]
    pub rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u8,
    /// Explicit speaker layout; derived from the channel count when unset
    #[serde(default)]
    pub channel_map: Option<Vec<ChannelPosition>>,
}

fn default_rate() -> u32 {
    44100
}

fn default_channels() -> u8 {
    2
}

impl EndpointConfig {
    /// Validates a single endpoint declaration.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ConfigError::InvalidEndpoint {
            endpoint: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name cannot be empty".to_string()).into());
        }

        SampleSpec::new(self.format, self.rate, self.channels)
            .validate()
            .map_err(invalid)?;

        if let Some(ref map) = self.channel_map {
            if map.len() != usize::from(self.channels) {
                return Err(invalid(format!(
                    "channel_map has {} positions but channels is {}",
                    map.len(),
                    self.channels
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Converts the declaration into an endpoint snapshot.
    pub fn to_endpoint(&self) -> Endpoint {
        let channel_map = match self.channel_map {
            Some(ref positions) => ChannelMap::new(positions.clone()),
            None => ChannelMap::default_for(self.channels),
        };

        Endpoint {
            id: EndpointId(self.id),
            kind: self.kind,
            name: self.name.clone(),
            description: self.description.clone(),
            sample_spec: SampleSpec::new(self.format, self.rate, self.channels),
            channel_map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ZcError;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.publish.port, 4713);
        assert_eq!(config.logging.level, "info");
        assert!(config.endpoints.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_bounds() {
        assert!(PublishConfig::with_port(1).port().is_ok());
        assert!(PublishConfig::with_port(65535).port().is_ok());

        let err = PublishConfig::with_port(0).port().unwrap_err();
        assert!(matches!(
            err,
            ZcError::Config(ConfigError::InvalidPort { port: 0 })
        ));

        let err = PublishConfig::with_port(65536).validate().unwrap_err();
        assert!(matches!(
            err,
            ZcError::Config(ConfigError::InvalidPort { port: 65536 })
        ));
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
publish:
  port: 4714
  user_name: alice
  host_name: host
logging:
  level: debug
  format: json
endpoints:
  - id: 7
    kind: sink
    name: alsa_output.pci
    description: Built-in Audio
    rate: 44100
    channels: 2
  - id: 8
    kind: source
    name: alsa_input.usb
    format: float32le
    rate: 48000
    channels: 1
"#;

        let config = AppConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.publish.port().unwrap(), 4714);
        assert_eq!(config.publish.user_name.as_deref(), Some("alice"));
        assert_eq!(config.logging.format, LogFormat::Json);

        let endpoints = config.endpoints();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].display_label(), "Built-in Audio");
        assert_eq!(endpoints[1].sample_spec.format, SampleFormat::Float32Le);
        assert_eq!(endpoints[1].channel_map.to_string(), "mono");
    }

    #[test]
    fn test_duplicate_endpoint_ids() {
        let yaml = r#"
endpoints:
  - { id: 1, kind: sink, name: a }
  - { id: 1, kind: source, name: b }
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ZcError::Config(ConfigError::DuplicateEndpoint { id: 1 })
        ));
    }

    #[test]
    fn test_channel_map_length_mismatch() {
        let yaml = r#"
endpoints:
  - id: 3
    kind: sink
    name: hdmi
    channels: 2
    channel_map: [front-left, front-right, lfe]
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_identity_override() {
        let mut config = AppConfig::default();
        config.publish.host_name = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::from_file("/nonexistent/zcpublish.yaml").unwrap_err();
        assert!(matches!(
            err,
            ZcError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
