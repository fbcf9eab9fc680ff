//! Operator events.
//!
//! Mirrors what a Kubernetes event recorder would publish for the trust
//! bundle: creation and updates of the artifact, degraded sources, and
//! failed cycles.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub const EVENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventReason {
    TrustedCABundleCreated,
    TrustedCABundleUpdated,
    TrustedCABundleUpdateFailed,
    UserCABundleInvalid,
    ProviderCABundleInvalid,
}

impl fmt::Display for EventReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One published event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileEvent {
    pub kind: EventType,
    pub reason: EventReason,
    pub message: String,
}

/// Fan-out of [`ReconcileEvent`]s. Clones publish to the same subscribers.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    tx: broadcast::Sender<ReconcileEvent>,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileEvent> {
        self.tx.subscribe()
    }

    pub fn normal(&self, reason: EventReason, message: impl Into<String>) {
        self.publish(EventType::Normal, reason, message.into());
    }

    pub fn warning(&self, reason: EventReason, message: impl Into<String>) {
        self.publish(EventType::Warning, reason, message.into());
    }

    fn publish(&self, kind: EventType, reason: EventReason, message: String) {
        // Err only means nobody is listening
        let _ = self.tx.send(ReconcileEvent {
            kind,
            reason,
            message,
        });
    }
}
