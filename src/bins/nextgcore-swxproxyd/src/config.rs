//! SWx proxy configuration
//!
//! Loaded from the `swx_proxy` and `rpc` sections of a YAML file. Every field
//! has a default so a partial file is enough.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use ogs_diameter::{DiameterClientConfig, DiameterServerConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DEFAULT_TTL;
use crate::health::{DEFAULT_MINIMUM_REQUEST_THRESHOLD, DEFAULT_REQUEST_FAILURE_THRESHOLD};

/// Default wait for an HSS answer
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default JSON RPC listen address
pub const DEFAULT_RPC_ADDR: &str = "0.0.0.0:9110";

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub swx_proxy: SwxProxyConfig,
    pub rpc: RpcConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.swx_proxy.validate()?;
        self.rpc.socket_addr()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub addr: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_RPC_ADDR.to_string(),
        }
    }
}

impl RpcConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.addr
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("rpc.addr '{}': {}", self.addr, e)))
    }
}

/// `swx_proxy` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwxProxyConfig {
    /// Require a SAR confirming non-3GPP access before vectors are returned
    pub verify_authorization: bool,
    /// Register the subscriber with the HSS as part of authentication
    pub register_on_auth: bool,
    /// Take the deregistration realm from the HSS-reported AAA server name
    pub derive_unregister_realm: bool,
    pub cache_ttl_seconds: u64,
    pub request_timeout_ms: u64,
    /// IMSI prefixes served by an HLR instead of the HSS
    pub hlr_plmn_ids: Vec<String>,
    pub health: HealthConfig,
    pub servers: Vec<ServerEntry>,
}

impl Default for SwxProxyConfig {
    fn default() -> Self {
        Self {
            verify_authorization: false,
            register_on_auth: false,
            derive_unregister_realm: false,
            cache_ttl_seconds: DEFAULT_TTL.as_secs(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            hlr_plmn_ids: Vec::new(),
            health: HealthConfig::default(),
            servers: vec![ServerEntry::default()],
        }
    }
}

impl SwxProxyConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Zero falls back to the default
    pub fn request_timeout(&self) -> Duration {
        if self.request_timeout_ms == 0 {
            Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)
        } else {
            Duration::from_millis(self.request_timeout_ms)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::Invalid("swx_proxy.servers must not be empty".into()));
        }
        for (i, entry) in self.servers.iter().enumerate() {
            entry
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("swx_proxy.servers[{i}]: {e}")))?;
        }

        let threshold = self.health.request_failure_threshold;
        // Zero is accepted and falls back to the default ratio
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "swx_proxy.health.request_failure_threshold {threshold} must be in [0, 1]"
            )));
        }

        for plmn in &self.hlr_plmn_ids {
            if !(5..=6).contains(&plmn.len()) || !plmn.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ConfigError::Invalid(format!(
                    "swx_proxy.hlr_plmn_ids: '{plmn}' is not a 5 or 6 digit PLMN id"
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub minimum_request_threshold: u32,
    pub request_failure_threshold: f32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            minimum_request_threshold: DEFAULT_MINIMUM_REQUEST_THRESHOLD,
            request_failure_threshold: DEFAULT_REQUEST_FAILURE_THRESHOLD,
        }
    }
}

/// One HSS backend and the identity used towards it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEntry {
    pub client: ClientSection,
    pub server: ServerSection,
}

impl ServerEntry {
    fn validate(&self) -> Result<(), String> {
        if self.client.host.is_empty() {
            return Err("client.host must not be empty".into());
        }
        if self.client.realm.is_empty() {
            return Err("client.realm must not be empty".into());
        }
        self.server.socket_addr()?;
        if !self.server.protocol.eq_ignore_ascii_case("tcp") {
            return Err(format!("unsupported protocol '{}'", self.server.protocol));
        }
        Ok(())
    }

    pub fn diameter_client(&self) -> DiameterClientConfig {
        DiameterClientConfig {
            host: self.client.host.clone(),
            realm: self.client.realm.clone(),
            product_name: self.client.product_name.clone(),
            retransmits: self.client.retransmits,
            watchdog_interval: Duration::from_secs(self.client.watchdog_interval.max(1)),
            retry_count: self.client.retry_count,
            ..Default::default()
        }
    }

    pub fn diameter_server(&self) -> Result<DiameterServerConfig, ConfigError> {
        let address = self.server.socket_addr().map_err(ConfigError::Invalid)?;
        Ok(DiameterServerConfig {
            address,
            dest_host: Some(self.server.dest_host.clone()).filter(|h| !h.is_empty()),
            dest_realm: if self.server.dest_realm.is_empty() {
                self.client.realm.clone()
            } else {
                self.server.dest_realm.clone()
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub host: String,
    pub realm: String,
    pub product_name: String,
    pub retransmits: u32,
    /// Seconds
    pub watchdog_interval: u64,
    pub retry_count: u32,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            host: "aaa.epc.mnc001.mcc001.3gppnetwork.org".to_string(),
            realm: "epc.mnc001.mcc001.3gppnetwork.org".to_string(),
            product_name: "swx_proxy".to_string(),
            retransmits: 3,
            watchdog_interval: 1,
            retry_count: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub address: String,
    pub protocol: String,
    pub dest_host: String,
    pub dest_realm: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{}", ogs_diameter::DIAMETER_PORT),
            protocol: "tcp".to_string(),
            dest_host: "hss.epc.mnc001.mcc001.3gppnetwork.org".to_string(),
            dest_realm: "epc.mnc001.mcc001.3gppnetwork.org".to_string(),
        }
    }
}

impl ServerSection {
    fn socket_addr(&self) -> Result<SocketAddr, String> {
        self.address
            .parse()
            .map_err(|e| format!("server.address '{}': {}", self.address, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
swx_proxy:
  verify_authorization: true
  register_on_auth: false
  derive_unregister_realm: true
  cache_ttl_seconds: 600
  hlr_plmn_ids: ["00102", "310260"]
  health:
    minimum_request_threshold: 4
    request_failure_threshold: 0.25
  servers:
    - client:
        host: aaa.epc.mnc001.mcc001.3gppnetwork.org
        realm: epc.mnc001.mcc001.3gppnetwork.org
        product_name: swx_proxy
        retransmits: 2
        watchdog_interval: 3
        retry_count: 4
      server:
        address: 10.0.0.1:3868
        protocol: tcp
        dest_host: hss.epc.mnc001.mcc001.3gppnetwork.org
        dest_realm: epc.mnc001.mcc001.3gppnetwork.org
    - client:
        host: aaa2.epc.mnc001.mcc001.3gppnetwork.org
        realm: epc.mnc001.mcc001.3gppnetwork.org
      server:
        address: 10.0.0.2:3868
rpc:
  addr: 127.0.0.1:9110
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let swx = &config.swx_proxy;

        assert!(swx.verify_authorization);
        assert!(swx.derive_unregister_realm);
        assert_eq!(swx.cache_ttl(), Duration::from_secs(600));
        assert_eq!(swx.request_timeout(), Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS));
        assert_eq!(swx.hlr_plmn_ids, vec!["00102", "310260"]);
        assert_eq!(swx.health.minimum_request_threshold, 4);
        assert_eq!(swx.servers.len(), 2);

        let client = swx.servers[0].diameter_client();
        assert_eq!(client.retransmits, 2);
        assert_eq!(client.watchdog_interval, Duration::from_secs(3));

        // Second server falls back to defaults
        let server = swx.servers[1].diameter_server().unwrap();
        assert_eq!(server.address, "10.0.0.2:3868".parse::<SocketAddr>().unwrap());
        assert_eq!(server.dest_host.as_deref(), Some("hss.epc.mnc001.mcc001.3gppnetwork.org"));
        assert_eq!(config.rpc.socket_addr().unwrap().port(), 9110);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.swx_proxy.servers.len(), 1);
    }

    #[test]
    fn test_rejects_empty_servers() {
        let err = Config::from_yaml("swx_proxy:\n  servers: []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_server_entries() {
        let mut config = SwxProxyConfig::default();
        config.servers[0].client.host.clear();
        assert!(config.validate().is_err());

        let mut config = SwxProxyConfig::default();
        config.servers[0].server.address = "not-an-address".into();
        assert!(config.validate().is_err());

        let mut config = SwxProxyConfig::default();
        config.servers[0].server.protocol = "sctp".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_threshold_and_plmn() {
        let mut config = SwxProxyConfig::default();
        config.health.request_failure_threshold = 1.5;
        assert!(config.validate().is_err());
        config.health.request_failure_threshold = -0.1;
        assert!(config.validate().is_err());

        let mut config = SwxProxyConfig::default();
        config.hlr_plmn_ids = vec!["0010".into()];
        assert!(config.validate().is_err());

        config.hlr_plmn_ids = vec!["00a01".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_health_thresholds_are_accepted() {
        let config = Config::from_yaml(
            "swx_proxy:\n  health:\n    minimum_request_threshold: 0\n    request_failure_threshold: 0\n",
        )
        .unwrap();
        assert_eq!(config.swx_proxy.health.minimum_request_threshold, 0);
        assert_eq!(config.swx_proxy.health.request_failure_threshold, 0.0);

        // One timeout in four stays under the default ratio
        let tracker = crate::health::HealthTracker::new(
            config.swx_proxy.health.minimum_request_threshold,
            config.swx_proxy.health.request_failure_threshold,
        );
        let status = tracker.evaluate(crate::metrics::HealthSnapshot {
            requests: 4,
            timeouts: 1,
            ..Default::default()
        });
        assert!(status.is_healthy());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/nonexistent/swx_proxy.yml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
