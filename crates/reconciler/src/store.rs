//! Object store seam.
//!
//! The reconciler reads the proxy pointer and the source maps through
//! [`ObjectStore`] and writes the merged artifact back through it. Updates
//! carry the resource version the caller read, so a write based on a stale
//! snapshot is refused with [`StoreError::Conflict`] instead of clobbering a
//! newer object.

use async_trait::async_trait;
use cabundle_core::{ConfigMap, ObjectKey, ObjectKind, ProxyConfig, WatchAction, WatchEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::trace;

/// Capacity of the change notification channel of [`InMemoryStore`].
pub const WATCH_CHANNEL_CAPACITY: usize = 256;

/// Object store errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Object does not exist
    #[error("{kind:?} {key} not found")]
    NotFound { kind: ObjectKind, key: ObjectKey },

    /// Create raced with another writer
    #[error("ConfigMap {key} already exists")]
    AlreadyExists { key: ObjectKey },

    /// Optimistic concurrency failure
    #[error("conflict writing {key}: expected resource version {expected}, found {actual}")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    /// Transport or backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Another writer got there first; re-reading and retrying is the fix.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::AlreadyExists { .. }
        )
    }
}

/// Access to the objects the engine reads and writes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Cluster-scoped proxy configuration, `None` if it does not exist.
    async fn get_proxy(&self, name: &str) -> Result<Option<ProxyConfig>, StoreError>;

    async fn get_config_map(&self, key: &ObjectKey) -> Result<Option<ConfigMap>, StoreError>;

    /// Create a map; fails with [`StoreError::AlreadyExists`].
    async fn create_config_map(&self, config_map: ConfigMap) -> Result<ConfigMap, StoreError>;

    /// Replace a map whose `resource_version` still matches the stored one.
    async fn update_config_map(&self, config_map: ConfigMap) -> Result<ConfigMap, StoreError>;

    async fn delete_config_map(&self, key: &ObjectKey) -> Result<(), StoreError>;

    /// Subscribe to change notifications for every object in the store.
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}

/// Process-local store with watch support.
///
/// Cloning is cheap; clones share the same objects and notification channel.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    proxies: RwLock<HashMap<String, ProxyConfig>>,
    config_maps: RwLock<HashMap<ObjectKey, ConfigMap>>,
    last_version: AtomicU64,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                proxies: RwLock::new(HashMap::new()),
                config_maps: RwLock::new(HashMap::new()),
                last_version: AtomicU64::new(0),
                events,
            }),
        }
    }

    fn next_version(&self) -> u64 {
        self.inner.last_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, kind: ObjectKind, key: ObjectKey, action: WatchAction) {
        trace!(?kind, %key, ?action, "publishing watch event");
        // no subscribers is fine
        let _ = self.inner.events.send(WatchEvent { kind, key, action });
    }

    /// Unconditional create-or-replace, as done by actors outside the engine.
    pub fn apply_config_map(&self, mut config_map: ConfigMap) -> ConfigMap {
        config_map.resource_version = self.next_version();
        let key = config_map.key.clone();
        let previous = self
            .inner
            .config_maps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), config_map.clone());

        let action = if previous.is_some() {
            WatchAction::Modified
        } else {
            WatchAction::Added
        };
        self.publish(ObjectKind::ConfigMap, key, action);
        config_map
    }

    /// Unconditional create-or-replace of a proxy object.
    pub fn apply_proxy(&self, mut proxy: ProxyConfig) -> ProxyConfig {
        proxy.resource_version = self.next_version();
        let previous = self
            .inner
            .proxies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(proxy.name.clone(), proxy.clone());

        let action = if previous.is_some() {
            WatchAction::Modified
        } else {
            WatchAction::Added
        };
        self.publish(
            ObjectKind::Proxy,
            ObjectKey::cluster_scoped(&proxy.name),
            action,
        );
        proxy
    }

    /// Remove a proxy object; returns whether it existed.
    pub fn delete_proxy(&self, name: &str) -> bool {
        let removed = self
            .inner
            .proxies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            self.publish(
                ObjectKind::Proxy,
                ObjectKey::cluster_scoped(name),
                WatchAction::Deleted,
            );
        }
        removed
    }

    /// Number of stored maps.
    pub fn config_map_count(&self) -> usize {
        self.inner
            .config_maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get_proxy(&self, name: &str) -> Result<Option<ProxyConfig>, StoreError> {
        Ok(self
            .inner
            .proxies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned())
    }

    async fn get_config_map(&self, key: &ObjectKey) -> Result<Option<ConfigMap>, StoreError> {
        Ok(self
            .inner
            .config_maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn create_config_map(&self, mut config_map: ConfigMap) -> Result<ConfigMap, StoreError> {
        let key = config_map.key.clone();
        {
            let mut maps = self
                .inner
                .config_maps
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if maps.contains_key(&key) {
                return Err(StoreError::AlreadyExists { key });
            }
            config_map.resource_version = self.next_version();
            maps.insert(key.clone(), config_map.clone());
        }

        self.publish(ObjectKind::ConfigMap, key, WatchAction::Added);
        Ok(config_map)
    }

    async fn update_config_map(&self, mut config_map: ConfigMap) -> Result<ConfigMap, StoreError> {
        let key = config_map.key.clone();
        {
            let mut maps = self
                .inner
                .config_maps
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let stored = maps.get(&key).ok_or_else(|| StoreError::NotFound {
                kind: ObjectKind::ConfigMap,
                key: key.clone(),
            })?;
            if stored.resource_version != config_map.resource_version {
                return Err(StoreError::Conflict {
                    key,
                    expected: config_map.resource_version,
                    actual: stored.resource_version,
                });
            }
            config_map.resource_version = self.next_version();
            maps.insert(key.clone(), config_map.clone());
        }

        self.publish(ObjectKind::ConfigMap, key, WatchAction::Modified);
        Ok(config_map)
    }

    async fn delete_config_map(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let removed = self
            .inner
            .config_maps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        match removed {
            Some(_) => {
                self.publish(ObjectKind::ConfigMap, key.clone(), WatchAction::Deleted);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: ObjectKind::ConfigMap,
                key: key.clone(),
            }),
        }
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.inner.events.subscribe()
    }
}
