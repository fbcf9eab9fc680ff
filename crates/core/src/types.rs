//! Object model shared by the trust bundle sources and the output artifact.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a stored object. Cluster-scoped objects use an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace holding the object
    pub namespace: String,
    /// Object name, unique within its namespace
    pub name: String,
}

impl ObjectKey {
    /// Key of a namespaced object.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a cluster-scoped object.
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self::new("", name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Key/value map object.
///
/// Used for the user bundle target, the provider holder and the merged
/// output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMap {
    /// Where the map lives
    pub key: ObjectKey,
    /// Map content
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    /// Optimistic concurrency token, assigned by the store (0 = never stored)
    #[serde(default)]
    pub resource_version: u64,
}

impl ConfigMap {
    /// Empty, never-stored map.
    pub fn new(key: ObjectKey) -> Self {
        Self {
            key,
            data: BTreeMap::new(),
            resource_version: 0,
        }
    }

    /// Builder-style insertion of one entry.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// Cluster proxy configuration.
///
/// Only the trusted CA pointer matters here: it names a [`ConfigMap`] in
/// the user configuration namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Object name (cluster-scoped)
    pub name: String,
    /// Name of the map holding the user-supplied CA bundle
    #[serde(default)]
    pub trusted_ca: Option<String>,
    /// Optimistic concurrency token
    #[serde(default)]
    pub resource_version: u64,
}

impl ProxyConfig {
    /// Proxy pointing at `trusted_ca`.
    pub fn new(name: impl Into<String>, trusted_ca: Option<String>) -> Self {
        Self {
            name: name.into(),
            trusted_ca,
            resource_version: 0,
        }
    }

    /// The pointer, with an empty name treated as unset.
    pub fn trusted_ca_name(&self) -> Option<&str> {
        self.trusted_ca.as_deref().filter(|name| !name.is_empty())
    }
}

/// Kind of object a change notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// [`ProxyConfig`]
    Proxy,
    /// [`ConfigMap`]
    ConfigMap,
}

/// What happened to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchAction {
    Added,
    Modified,
    Deleted,
}

/// Change notification emitted by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: ObjectKind,
    pub key: ObjectKey,
    pub action: WatchAction,
}
