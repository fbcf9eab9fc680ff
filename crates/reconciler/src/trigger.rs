//! Watch event filtering.
//!
//! The store reports changes to every object it holds; only a handful of
//! them can change the merge result or the artifact.

use cabundle_core::{EngineConfig, ObjectKey, ObjectKind, WatchEvent};

/// Why a watch event is worth a reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Proxy object holding the user bundle pointer
    UserPointer,
    /// A map in the user configuration namespace; the pointer may target it
    UserBundle,
    /// Provider map in the target namespace
    ProviderBundle,
    /// The output artifact itself, e.g. deleted or edited out-of-band
    Output,
}

#[derive(Debug, Clone)]
pub struct TriggerFilter {
    proxy: ObjectKey,
    user_namespace: String,
    provider: ObjectKey,
    output: ObjectKey,
}

impl TriggerFilter {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            proxy: ObjectKey::cluster_scoped(&config.user.proxy_name),
            user_namespace: config.user.config_namespace.clone(),
            provider: config.provider_key(),
            output: config.output_key(),
        }
    }

    pub fn classify(&self, event: &WatchEvent) -> Option<Trigger> {
        match event.kind {
            ObjectKind::Proxy if event.key == self.proxy => Some(Trigger::UserPointer),
            ObjectKind::Proxy => None,
            ObjectKind::ConfigMap if event.key == self.output => Some(Trigger::Output),
            ObjectKind::ConfigMap if event.key == self.provider => Some(Trigger::ProviderBundle),
            ObjectKind::ConfigMap if event.key.namespace == self.user_namespace => {
                Some(Trigger::UserBundle)
            }
            ObjectKind::ConfigMap => None,
        }
    }
}
