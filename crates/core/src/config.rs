//! Configuration management for cabundle.
//!
//! Every path, namespace and key the engine touches lives here and is
//! handed to the components at construction time. All fields are optional
//! in TOML and fall back to the values used by the deployed operator.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::ObjectKey;

/// Location of the distribution CA bundle on RHEL-based images.
pub const DEFAULT_SYSTEM_BUNDLE_PATH: &str = "/etc/pki/ca-trust/extracted/pem/tls-ca-bundle.pem";
pub const DEFAULT_TARGET_NAMESPACE: &str = "openshift-cloud-controller-manager";
pub const DEFAULT_CONFIG_NAMESPACE: &str = "openshift-config";
/// Key used by both the user bundle map and the output artifact.
pub const TRUSTED_CA_BUNDLE_KEY: &str = "ca-bundle.crt";
pub const PROVIDER_CA_BUNDLE_KEY: &str = "ca-bundle.pem";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// PEM file holding the system trust anchors
    pub system_bundle_path: PathBuf,
    /// Namespace holding the provider map and the output artifact
    pub target_namespace: String,
    /// Period of the fallback resync trigger
    pub resync_interval_secs: u64,
    pub output: OutputConfig,
    pub user: UserSourceConfig,
    pub provider: ProviderSourceConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub name: String,
    pub key: String,
}

/// Where the user-supplied bundle pointer lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSourceConfig {
    /// Namespace of the map the proxy pointer refers to
    pub config_namespace: String,
    /// Name of the cluster-scoped proxy object carrying the pointer
    pub proxy_name: String,
    pub key: String,
}

/// Map populated by the cloud-config sync process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSourceConfig {
    pub name: String,
    pub key: String,
}

/// Retry policy: conflict re-runs within a cycle, backoff between failed cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_bundle_path: PathBuf::from(DEFAULT_SYSTEM_BUNDLE_PATH),
            target_namespace: DEFAULT_TARGET_NAMESPACE.to_string(),
            resync_interval_secs: 600,
            output: OutputConfig::default(),
            user: UserSourceConfig::default(),
            provider: ProviderSourceConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            name: "ccm-trusted-ca".to_string(),
            key: TRUSTED_CA_BUNDLE_KEY.to_string(),
        }
    }
}

impl Default for UserSourceConfig {
    fn default() -> Self {
        Self {
            config_namespace: DEFAULT_CONFIG_NAMESPACE.to_string(),
            proxy_name: "cluster".to_string(),
            key: TRUSTED_CA_BUNDLE_KEY.to_string(),
        }
    }
}

impl Default for ProviderSourceConfig {
    fn default() -> Self {
        Self {
            name: "cloud-conf".to_string(),
            key: PROVIDER_CA_BUNDLE_KEY.to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 500,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject configurations the engine cannot act on.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("target_namespace", &self.target_namespace),
            ("output.name", &self.output.name),
            ("output.key", &self.output.key),
            ("user.config_namespace", &self.user.config_namespace),
            ("user.proxy_name", &self.user.proxy_name),
            ("user.key", &self.user.key),
            ("provider.name", &self.provider.name),
            ("provider.key", &self.provider.key),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(Error::Config(format!("{field} must not be empty")));
        }

        if self.system_bundle_path.as_os_str().is_empty() {
            return Err(Error::Config("system_bundle_path must not be empty".to_string()));
        }

        if self.resync_interval_secs == 0 {
            return Err(Error::Config(
                "resync_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(format!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.initial_delay_ms, self.retry.max_delay_ms
            )));
        }

        Ok(())
    }

    /// Identity of the merged artifact.
    pub fn output_key(&self) -> ObjectKey {
        ObjectKey::new(&self.target_namespace, &self.output.name)
    }

    /// Identity of the map populated by the provider sync.
    pub fn provider_key(&self) -> ObjectKey {
        ObjectKey::new(&self.target_namespace, &self.provider.name)
    }

    /// Key of the user map a proxy pointer resolves to.
    pub fn user_bundle_key(&self, pointer: &str) -> ObjectKey {
        ObjectKey::new(&self.user.config_namespace, pointer)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}
