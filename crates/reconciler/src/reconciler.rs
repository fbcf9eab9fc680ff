//! Output reconciliation.
//!
//! One cycle reads every source, merges them and compares the result with
//! the artifact currently stored. Nothing is written when they match. A
//! missing artifact, or one missing the bundle key, counts as empty content
//! and is (re)created. Cycles carry no state between runs.

use cabundle_core::{ConfigMap, EngineConfig};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::merge::{merge, MergedBundle};
use crate::recorder::{EventReason, EventRecorder};
use crate::source::{SourceAccessor, SourceReadings, SourceRole, SourceState};
use crate::store::ObjectStore;

/// What a successful cycle did to the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleAction {
    Unchanged,
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub action: CycleAction,
    /// Certificates in the merged bundle
    pub certificates: usize,
    /// Sources that contributed, in output order
    pub contributors: Vec<String>,
    /// BLAKE3 digest of the written (or already present) bundle
    pub digest: String,
}

impl CycleOutcome {
    fn new(action: CycleAction, merged: &MergedBundle) -> Self {
        Self {
            action,
            certificates: merged.certificates().len(),
            contributors: merged
                .contributors()
                .iter()
                .map(SourceRole::to_string)
                .collect(),
            digest: merged.digest(),
        }
    }

    /// Whether the cycle wrote to the store.
    pub fn wrote(&self) -> bool {
        self.action != CycleAction::Unchanged
    }
}

/// Converges the output artifact to the merge of the current sources.
#[derive(Clone)]
pub struct OutputReconciler {
    config: Arc<EngineConfig>,
    store: Arc<dyn ObjectStore>,
    sources: SourceAccessor,
    recorder: EventRecorder,
}

impl OutputReconciler {
    pub fn new(config: Arc<EngineConfig>, store: Arc<dyn ObjectStore>) -> Self {
        let sources = SourceAccessor::new(Arc::clone(&config), Arc::clone(&store));
        Self {
            config,
            store,
            sources,
            recorder: EventRecorder::new(),
        }
    }

    /// Publish events through an existing recorder.
    pub fn with_recorder(mut self, recorder: EventRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Merge of the current sources, without touching the artifact.
    pub async fn desired(&self) -> ReconcileResult<MergedBundle> {
        let readings = self.sources.read_all().await?;
        Ok(merge(&readings.system, &readings.user, &readings.provider))
    }

    /// Run one cycle.
    ///
    /// Lost write races re-run the whole read-merge-compare-write sequence
    /// against fresh reads, at most `retry.max_retries` extra times. An
    /// artifact deleted between the read and the update counts as one.
    pub async fn reconcile(&self) -> ReconcileResult<CycleOutcome> {
        let attempts = self.config.retry.max_retries.saturating_add(1);
        let key = self.config.output_key();

        for attempt in 1..=attempts {
            match self.reconcile_once().await {
                Err(ReconcileError::Store(e)) if e.is_conflict() || e.is_not_found() => {
                    debug!(%key, attempt, error = %e, "trust bundle write raced, re-reading");
                }
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    self.report_failure(&e);
                    return Err(e);
                }
            }
        }

        let err = ReconcileError::ConflictRetriesExhausted { attempts };
        self.report_failure(&err);
        Err(err)
    }

    async fn reconcile_once(&self) -> ReconcileResult<CycleOutcome> {
        let readings = self.sources.read_all().await?;
        self.report_degraded_sources(&readings);

        let merged = merge(&readings.system, &readings.user, &readings.provider);
        let key = self.config.output_key();
        let bundle_key = &self.config.output.key;

        let current = self.store.get_config_map(&key).await?;
        let current_content = current
            .as_ref()
            .and_then(|config_map| config_map.get(bundle_key))
            .unwrap_or_default();

        if current_content.as_bytes() == merged.as_bytes() {
            debug!(%key, certificates = merged.certificates().len(), "trust bundle up to date");
            return Ok(CycleOutcome::new(CycleAction::Unchanged, &merged));
        }

        let outcome = match current {
            Some(mut config_map) => {
                config_map
                    .data
                    .insert(bundle_key.clone(), merged.as_pem().to_string());
                self.store.update_config_map(config_map).await?;
                CycleOutcome::new(CycleAction::Updated, &merged)
            }
            None => {
                let config_map = ConfigMap::new(key.clone())
                    .with_entry(bundle_key.as_str(), merged.as_pem());
                self.store.create_config_map(config_map).await?;
                CycleOutcome::new(CycleAction::Created, &merged)
            }
        };

        info!(
            %key,
            action = ?outcome.action,
            certificates = outcome.certificates,
            sources = ?outcome.contributors,
            digest = %outcome.digest,
            "trust bundle synced"
        );
        let (reason, verb) = match outcome.action {
            CycleAction::Created => (EventReason::TrustedCABundleCreated, "created"),
            _ => (EventReason::TrustedCABundleUpdated, "updated"),
        };
        self.recorder.normal(
            reason,
            format!("{key} {verb} with {} certificates", outcome.certificates),
        );

        Ok(outcome)
    }

    fn report_degraded_sources(&self, readings: &SourceReadings) {
        if let SourceState::Invalid(reason) = &readings.user {
            warn!(source = "user", %reason, "ignoring invalid CA bundle");
            self.recorder.warning(
                EventReason::UserCABundleInvalid,
                format!("user CA bundle ignored: {reason}"),
            );
        }
        if let SourceState::Invalid(reason) = &readings.provider {
            warn!(source = "provider", %reason, "ignoring invalid CA bundle");
            self.recorder.warning(
                EventReason::ProviderCABundleInvalid,
                format!("provider CA bundle ignored: {reason}"),
            );
        }
    }

    fn report_failure(&self, err: &ReconcileError) {
        error!(error = %err, system_bundle = err.is_system_bundle(), "trust bundle reconciliation failed");
        self.recorder
            .warning(EventReason::TrustedCABundleUpdateFailed, err.to_string());
    }
}
