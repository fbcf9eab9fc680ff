//! Core functionality for the cabundle trust bundle engine.
//!
//! This crate provides the configuration, object model, error type and
//! logging setup shared by the reconciler and anything that hosts it.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{EngineConfig, OutputConfig, ProviderSourceConfig, RetryConfig, UserSourceConfig};
pub use error::{Error, Result};
pub use types::{ConfigMap, ObjectKey, ObjectKind, ProxyConfig, WatchAction, WatchEvent};
