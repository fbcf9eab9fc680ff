//! Source readings.
//!
//! Each of the three inputs resolves to a [`SourceState`] at evaluation time.
//! The system bundle is the exception: it must always be valid, so reading
//! it returns a [`ValidBundle`] or a fatal [`ReconcileError`].

use cabundle_core::EngineConfig;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::codec::{self, CertificateRecord, ParseError};
use crate::error::{ReconcileError, ReconcileResult};
use crate::store::ObjectStore;

/// The three inputs to the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceRole {
    /// Local file shipped with the image
    System,
    /// Bundle referenced by the proxy configuration
    User,
    /// Bundle synced from the cloud provider configuration
    Provider,
}

impl fmt::Display for SourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceRole::System => "system",
            SourceRole::User => "user",
            SourceRole::Provider => "provider",
        })
    }
}

/// Source content that parsed into at least one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidBundle {
    raw: Vec<u8>,
    certificates: Vec<CertificateRecord>,
}

impl ValidBundle {
    pub fn parse(raw: impl Into<Vec<u8>>) -> Result<Self, ParseError> {
        let raw = raw.into();
        let certificates = codec::parse(&raw)?;
        Ok(Self { raw, certificates })
    }

    /// Bytes exactly as read from the source.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn certificates(&self) -> &[CertificateRecord] {
        &self.certificates
    }
}

/// State of an optional source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    Valid(ValidBundle),
    /// Present but unusable; the reason is only logged
    Invalid(String),
    Absent,
}

impl SourceState {
    /// Classify the value found under a source's key.
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            None => SourceState::Absent,
            Some(raw) => match ValidBundle::parse(raw.as_bytes()) {
                Ok(bundle) => SourceState::Valid(bundle),
                Err(e) => SourceState::Invalid(describe(&e)),
            },
        }
    }

    pub fn as_valid(&self) -> Option<&ValidBundle> {
        match self {
            SourceState::Valid(bundle) => Some(bundle),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.as_valid().is_some()
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceState::Valid(_) => "valid",
            SourceState::Invalid(_) => "invalid",
            SourceState::Absent => "absent",
        }
    }
}

/// Error message followed by its source, if any.
fn describe(err: &ParseError) -> String {
    match std::error::Error::source(err) {
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    }
}

/// Everything one cycle read.
#[derive(Debug, Clone)]
pub struct SourceReadings {
    pub system: ValidBundle,
    pub user: SourceState,
    pub provider: SourceState,
}

/// Reads the three sources named by the engine configuration.
#[derive(Clone)]
pub struct SourceAccessor {
    config: Arc<EngineConfig>,
    store: Arc<dyn ObjectStore>,
}

impl SourceAccessor {
    pub fn new(config: Arc<EngineConfig>, store: Arc<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    /// Read and parse the system bundle. Any failure is fatal to the cycle.
    pub async fn read_system(&self) -> ReconcileResult<ValidBundle> {
        let path = &self.config.system_bundle_path;
        let raw = tokio::fs::read(path)
            .await
            .map_err(|source| ReconcileError::SystemBundleUnreadable {
                path: path.clone(),
                source,
            })?;

        ValidBundle::parse(raw).map_err(|source| ReconcileError::SystemBundleInvalid {
            path: path.clone(),
            source,
        })
    }

    /// Resolve the proxy pointer and read the user bundle behind it.
    pub async fn read_user(&self) -> SourceState {
        let proxy = match self.store.get_proxy(&self.config.user.proxy_name).await {
            Ok(proxy) => proxy,
            Err(e) => {
                warn!(error = %e, "unable to read proxy configuration");
                return SourceState::Invalid(e.to_string());
            }
        };

        let Some(pointer) = proxy.as_ref().and_then(|p| p.trusted_ca_name()) else {
            debug!(proxy = %self.config.user.proxy_name, "no trusted CA configured on proxy");
            return SourceState::Absent;
        };

        let key = self.config.user_bundle_key(pointer);
        match self.store.get_config_map(&key).await {
            Ok(Some(config_map)) => SourceState::from_value(config_map.get(&self.config.user.key)),
            Ok(None) => {
                debug!(%key, "proxy points at a missing ConfigMap");
                SourceState::Absent
            }
            Err(e) => {
                warn!(%key, error = %e, "unable to read user CA bundle");
                SourceState::Invalid(e.to_string())
            }
        }
    }

    /// Read the bundle synced from the cloud provider configuration.
    pub async fn read_provider(&self) -> SourceState {
        let key = self.config.provider_key();
        match self.store.get_config_map(&key).await {
            Ok(Some(config_map)) => {
                SourceState::from_value(config_map.get(&self.config.provider.key))
            }
            Ok(None) => SourceState::Absent,
            Err(e) => {
                warn!(%key, error = %e, "unable to read provider CA bundle");
                SourceState::Invalid(e.to_string())
            }
        }
    }

    /// Read all sources, system first so a broken deployment fails fast.
    pub async fn read_all(&self) -> ReconcileResult<SourceReadings> {
        let system = self.read_system().await?;
        let user = self.read_user().await;
        let provider = self.read_provider().await;
        Ok(SourceReadings {
            system,
            user,
            provider,
        })
    }
}
