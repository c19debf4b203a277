use std::path::Path;

use serde::Deserialize;

use crate::error::{BackendError, Result};

/// Runtime configuration, loaded once at startup from a JSON file.
///
/// Field names follow the established config file format, so existing
/// deployments keep working unchanged.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name server presented in synthesized SOA records
    #[serde(rename = "Hostname")]
    pub hostname: String,

    /// Hostmaster mail address presented in synthesized SOA records
    #[serde(rename = "HostmasterEmailAddress")]
    pub hostmaster_email_address: String,

    /// Which KV store to connect to: `consul` or `memory`
    #[serde(rename = "KVBackend")]
    pub kv_backend: String,

    /// Address of the KV store, e.g. `127.0.0.1:8500`
    #[serde(rename = "KVAddress")]
    pub kv_address: String,

    /// TTL assigned to records whose stored value carries none
    #[serde(rename = "DefaultTTL")]
    pub default_ttl: u32,

    /// SOA refresh interval in seconds
    #[serde(rename = "SoaRefresh")]
    pub soa_refresh: i32,

    /// SOA retry interval in seconds
    #[serde(rename = "SoaRetry")]
    pub soa_retry: i32,

    /// SOA expiry interval in seconds
    #[serde(rename = "SoaExpiry")]
    pub soa_expiry: i32,

    /// SOA negative-cache TTL in seconds
    #[serde(rename = "SoaNx")]
    pub soa_nx: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            hostmaster_email_address: String::new(),
            kv_backend: "consul".to_string(),
            kv_address: "127.0.0.1:8500".to_string(),
            default_ttl: 60,
            soa_refresh: 1200,
            soa_retry: 180,
            soa_expiry: 1209600,
            soa_nx: 60,
        }
    }
}

impl Config {
    /// Load and validate the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            BackendError::InvalidConfig(format!("cannot read {}: {}", path.display(), err))
        })?;

        let config: Config = serde_json::from_str(&raw).map_err(|err| {
            BackendError::InvalidConfig(format!("cannot parse {}: {}", path.display(), err))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() {
            return Err(BackendError::InvalidConfig(
                "Hostname must be set".to_string(),
            ));
        }

        if self.hostmaster_email_address.is_empty() {
            return Err(BackendError::InvalidConfig(
                "HostmasterEmailAddress must be set".to_string(),
            ));
        }

        match self.kv_backend.as_str() {
            "consul" | "memory" => {}
            other => return Err(BackendError::UnsupportedBackend(other.to_string())),
        }

        if self.kv_address.is_empty() {
            return Err(BackendError::InvalidConfig(
                "KVAddress must be set".to_string(),
            ));
        }

        if self.default_ttl == 0 {
            return Err(BackendError::InvalidConfig(
                "DefaultTTL must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
