//! Configuration loading and validation

use anyhow::{Context, Result};
use phonescan_discovery::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub capture_service: CaptureServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Seconds to wait for an LLDP frame on each device
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Seconds before a phone web service request is abandoned
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Forward proxy for phone web service requests
    #[serde(default)]
    pub proxy: Option<String>,
    /// Devices whose description contains one of these are skipped
    #[serde(default = "default_skip_descriptions")]
    pub skip_descriptions: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            http_timeout_secs: default_http_timeout(),
            proxy: None,
            skip_descriptions: default_skip_descriptions(),
        }
    }
}

fn default_timeout() -> u64 {
    33
}

fn default_http_timeout() -> u64 {
    10
}

fn default_skip_descriptions() -> Vec<String> {
    vec!["VMware".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureServiceConfig {
    /// systemd unit providing packet capture (none = not managed)
    #[serde(default)]
    pub unit: Option<String>,
    /// Stop the unit once the scan is over
    #[serde(default = "default_true")]
    pub stop_after_scan: bool,
}

impl Default for CaptureServiceConfig {
    fn default() -> Self {
        Self {
            unit: None,
            stop_after_scan: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Convert to the discovery session configuration
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            timeout_secs: self.discovery.timeout_secs,
            http_timeout_secs: self.discovery.http_timeout_secs,
            proxy: self
                .discovery
                .proxy
                .clone()
                .filter(|p| !p.trim().is_empty()),
            skip_descriptions: self.discovery.skip_descriptions.clone(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("phonescan.toml")).unwrap();
        assert_eq!(config.discovery.timeout_secs, 33);
        assert_eq!(config.discovery.http_timeout_secs, 10);
        assert_eq!(config.discovery.proxy, None);
        assert_eq!(config.discovery.skip_descriptions, vec!["VMware"]);
        assert_eq!(config.capture_service.unit, None);
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[discovery]
timeout_secs = 5
proxy = "http://proxy.example:3128"

[capture_service]
unit = "npf"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.discovery.timeout_secs, 5);
        assert_eq!(config.discovery.http_timeout_secs, 10);
        assert_eq!(config.capture_service.unit.as_deref(), Some("npf"));
        assert!(config.capture_service.stop_after_scan);

        let session = config.to_session_config();
        assert_eq!(session.timeout_secs, 5);
        assert_eq!(session.proxy.as_deref(), Some("http://proxy.example:3128"));
    }

    #[test]
    fn test_blank_proxy_means_direct() {
        let mut config = Config::default();
        config.discovery.proxy = Some("  ".to_string());
        assert_eq!(config.to_session_config().proxy, None);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[discovery]\ntimeout_secs = \"soon\"").unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
