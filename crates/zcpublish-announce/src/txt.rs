//! TXT metadata attached to announcements.
//!
//! Every record carries the server scoped keys (`server-version`,
//! `user-name`, `fqdn`, `cookie`). Endpoint records add `device`, `rate`,
//! `channels`, `format` and `channel_map`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;
use zcpublish_core::config::PublishConfig;
use zcpublish_core::types::Endpoint;

/// Identity of the running server as published in TXT records and names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Product name and version, e.g. `zcpublish 0.2.0`
    pub version: String,
    pub user_name: String,
    pub host_name: String,
    /// Fully qualified name from `publish.fqdn`. Without one it falls back
    /// to the host name, which is only qualified if the system name is.
    pub fqdn: String,
    /// Random per-process session cookie
    pub cookie: u32,
}

impl ServerInfo {
    /// Builds the server identity, detecting whatever the config leaves unset.
    pub fn detect(config: &PublishConfig) -> Self {
        let user_name = config.user_name.clone().unwrap_or_else(detect_user_name);
        let host_name = config.host_name.clone().unwrap_or_else(detect_host_name);
        let fqdn = config.fqdn.clone().unwrap_or_else(|| host_name.clone());

        let info = Self {
            version: format!("zcpublish {}", env!("CARGO_PKG_VERSION")),
            user_name,
            host_name,
            fqdn,
            cookie: random_cookie(),
        };

        debug!(
            user = %info.user_name,
            host = %info.host_name,
            fqdn = %info.fqdn,
            cookie = format_args!("0x{:08x}", info.cookie),
            "Detected server identity"
        );

        info
    }
}

fn detect_user_name() -> String {
    ["USER", "LOGNAME", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub(crate) fn detect_host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn random_cookie() -> u32 {
    // Low 32 bits of a v4 UUID are random.
    Uuid::new_v4().as_u128() as u32
}

/// Ordered list of TXT key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxtRecord {
    entries: Vec<(String, String)>,
}

impl TxtRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pair. Keys are not deduplicated.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Returns the first value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key=value` is present.
    pub fn contains(&self, entry: &str) -> bool {
        self.iter().any(|(k, v)| {
            entry
                .split_once('=')
                .map(|(ek, ev)| ek == k && ev == v)
                .unwrap_or(false)
        })
    }
}

impl fmt::Display for TxtRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Server scoped TXT data, published on every record.
pub fn server_txt(server: &ServerInfo) -> TxtRecord {
    let mut txt = TxtRecord::new();
    txt.push("server-version", server.version.as_str());
    txt.push("user-name", server.user_name.as_str());
    txt.push("fqdn", server.fqdn.as_str());
    txt.push("cookie", format!("0x{:08x}", server.cookie));
    txt
}

/// Server TXT data plus the endpoint's device and sample information.
pub fn endpoint_txt(server: &ServerInfo, endpoint: &Endpoint) -> TxtRecord {
    let mut txt = server_txt(server);
    let spec = &endpoint.sample_spec;
    txt.push("device", endpoint.name.as_str());
    txt.push("rate", spec.rate.to_string());
    txt.push("channels", spec.channels.to_string());
    txt.push("format", spec.format.as_str());
    txt.push("channel_map", endpoint.channel_map.to_string());
    txt
}

#[cfg(test)]
mod tests {
    use super::*;
    use zcpublish_core::types::{EndpointKind, SampleFormat};

    fn server() -> ServerInfo {
        ServerInfo {
            version: "zcpublish 0.0.0".to_string(),
            user_name: "alice".to_string(),
            host_name: "host".to_string(),
            fqdn: "host.example.org".to_string(),
            cookie: 0x00c0ffee,
        }
    }

    #[test]
    fn test_server_txt() {
        let txt = server_txt(&server());
        assert_eq!(txt.len(), 4);
        assert_eq!(txt.get("user-name"), Some("alice"));
        assert_eq!(txt.get("cookie"), Some("0x00c0ffee"));
        assert!(txt.get("rate").is_none());
    }

    #[test]
    fn test_endpoint_txt() {
        let endpoint = Endpoint::builder(7, EndpointKind::Sink, "alsa_output.pci")
            .description("Built-in Audio")
            .format(SampleFormat::S16Le)
            .rate(44100)
            .channels(2)
            .build();

        let txt = endpoint_txt(&server(), &endpoint);
        assert!(txt.contains("rate=44100"));
        assert!(txt.contains("channels=2"));
        assert!(txt.contains("format=s16le"));
        assert!(txt.contains("device=alsa_output.pci"));
        assert!(txt.contains("channel_map=front-left,front-right"));
        assert!(txt.contains("fqdn=host.example.org"));
    }

    #[test]
    fn test_detect_honours_overrides() {
        let config = PublishConfig {
            user_name: Some("bob".to_string()),
            host_name: Some("studio".to_string()),
            ..PublishConfig::default()
        };

        let info = ServerInfo::detect(&config);
        assert_eq!(info.user_name, "bob");
        assert_eq!(info.host_name, "studio");
        assert_eq!(info.fqdn, "studio");
        assert!(info.version.starts_with("zcpublish "));
    }
}
