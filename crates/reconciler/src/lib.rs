//! Trust bundle reconciliation engine.
//!
//! Maintains one merged CA bundle built from three independently managed
//! sources and keeps the stored artifact equal to that merge, even when the
//! sources or the artifact itself are changed, corrupted or deleted.
//!
//! # Sources
//!
//! - **system**: PEM file shipped with the image. Always required; when it
//!   cannot be read or parsed the cycle fails and nothing is written.
//! - **user**: bundle in a map named by the cluster proxy's trusted CA
//!   pointer. Optional; missing or broken bundles are skipped.
//! - **provider**: bundle synced from the cloud provider configuration into
//!   the target namespace. Optional; skipped when missing, broken, or
//!   byte-identical to the user bundle.
//!
//! # Pipeline
//!
//! 1. [`SourceAccessor`] reads the three sources into [`SourceState`]s
//! 2. [`merge()`] orders them `provider ++ user ++ system`
//! 3. [`OutputReconciler`] writes the result only if it differs from the artifact
//! 4. [`Controller`] runs cycles on watch events, manual triggers and a
//!    periodic resync, one at a time, with backoff on failure
//!
//! # Example
//!
//! ```no_run
//! use cabundle_core::EngineConfig;
//! use cabundle_reconciler::{Controller, InMemoryStore};
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let store = InMemoryStore::new();
//! let controller = Controller::new(Arc::new(EngineConfig::default()), Arc::new(store));
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! controller.run(shutdown).await;
//! # }
//! ```

pub mod codec;
pub mod controller;
pub mod error;
pub mod merge;
pub mod reconciler;
pub mod recorder;
pub mod source;
pub mod store;
pub mod trigger;

pub use codec::{CertificateRecord, ParseError};
pub use controller::{Controller, ControllerHandle, ControllerStatus};
pub use error::{ReconcileError, ReconcileResult};
pub use merge::{merge, MergedBundle};
pub use reconciler::{CycleAction, CycleOutcome, OutputReconciler};
pub use recorder::{EventReason, EventRecorder, EventType, ReconcileEvent};
pub use source::{SourceAccessor, SourceReadings, SourceRole, SourceState, ValidBundle};
pub use store::{InMemoryStore, ObjectStore, StoreError};
pub use trigger::{Trigger, TriggerFilter};
