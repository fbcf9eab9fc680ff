//! Trust bundle controller.
//!
//! Drives [`OutputReconciler`] cycles from three wake-up sources:
//!
//! - relevant store watch events (filtered through [`TriggerFilter`]),
//! - explicit [`ControllerHandle::trigger`] calls, e.g. when the system
//!   bundle file is known to have changed,
//! - a coarse periodic resync that catches drift whose notification was lost.
//!
//! Wake-ups are coalesced through a [`Notify`] and a single task runs the
//! cycles, so at most one cycle is in flight and a burst of events costs one
//! follow-up cycle. Failed cycles are retried with exponential backoff.

use cabundle_core::{EngineConfig, RetryConfig, WatchEvent};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::reconciler::{CycleOutcome, OutputReconciler};
use crate::recorder::EventRecorder;
use crate::store::ObjectStore;
use crate::trigger::TriggerFilter;

/// Observable controller state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerStatus {
    /// Cycles run so far, successful or not
    pub cycles: u64,
    pub failures: u64,
    /// Failures since the last successful cycle
    pub consecutive_failures: u32,
    pub last_outcome: Option<CycleOutcome>,
    pub last_error: Option<String>,
}

struct Shared {
    wake: Notify,
    status: Mutex<ControllerStatus>,
}

impl Shared {
    fn update_status(&self, f: impl FnOnce(&mut ControllerStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }
}

/// Cheap, cloneable handle onto a running [`Controller`].
#[derive(Clone)]
pub struct ControllerHandle {
    shared: Arc<Shared>,
}

impl ControllerHandle {
    /// Request a cycle. Requests made while a cycle runs collapse into one.
    pub fn trigger(&self) {
        self.shared.wake.notify_one();
    }

    pub fn status(&self) -> ControllerStatus {
        self.shared
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Why the loop woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Resync,
    Notified,
    Retry,
}

/// Exponential backoff between failed cycles.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    fn new(retry: &RetryConfig) -> Self {
        Self {
            initial: retry.initial_delay(),
            max: retry.max_delay(),
            current: None,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(delay) => delay.saturating_mul(2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    fn reset(&mut self) {
        self.current = None;
    }
}

pub struct Controller {
    config: Arc<EngineConfig>,
    store: Arc<dyn ObjectStore>,
    reconciler: OutputReconciler,
    filter: TriggerFilter,
    shared: Arc<Shared>,
}

impl Controller {
    pub fn new(config: Arc<EngineConfig>, store: Arc<dyn ObjectStore>) -> Self {
        let reconciler = OutputReconciler::new(Arc::clone(&config), Arc::clone(&store));
        let filter = TriggerFilter::from_config(&config);
        Self {
            config,
            store,
            reconciler,
            filter,
            shared: Arc::new(Shared {
                wake: Notify::new(),
                status: Mutex::new(ControllerStatus::default()),
            }),
        }
    }

    /// Publish events through an existing recorder.
    pub fn with_recorder(mut self, recorder: EventRecorder) -> Self {
        self.reconciler = self.reconciler.with_recorder(recorder);
        self
    }

    pub fn recorder(&self) -> &EventRecorder {
        self.reconciler.recorder()
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run until `shutdown` turns `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }

        let forwarder = tokio::spawn(forward_watch_events(
            self.store.watch(),
            self.filter.clone(),
            Arc::clone(&self.shared),
        ));

        let mut resync = tokio::time::interval(self.config.resync_interval());
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backoff = Backoff::new(&self.config.retry);
        let mut retry_at: Option<Instant> = None;

        info!(
            output = %self.config.output_key(),
            resync_secs = self.config.resync_interval_secs,
            "trust bundle controller started"
        );

        loop {
            // The first resync tick fires immediately, giving the startup cycle.
            let wake = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let stop = *shutdown.borrow();
                    if stop {
                        break;
                    }
                    continue;
                }
                _ = self.shared.wake.notified() => Wake::Notified,
                _ = wait_until(retry_at) => Wake::Retry,
                _ = resync.tick() => Wake::Resync,
            };

            debug!(?wake, "starting reconciliation cycle");
            match self.reconciler.reconcile().await {
                Ok(outcome) => {
                    backoff.reset();
                    retry_at = None;
                    self.shared.update_status(|status| {
                        status.cycles += 1;
                        status.consecutive_failures = 0;
                        status.last_outcome = Some(outcome);
                        status.last_error = None;
                    });
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    retry_at = Some(Instant::now() + delay);
                    warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "reconciliation cycle failed, backing off");
                    self.shared.update_status(|status| {
                        status.cycles += 1;
                        status.failures += 1;
                        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                        status.last_error = Some(e.to_string());
                    });
                }
            }
        }

        forwarder.abort();
        info!("trust bundle controller stopped");
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn forward_watch_events(
    mut events: broadcast::Receiver<WatchEvent>,
    filter: TriggerFilter,
    shared: Arc<Shared>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(trigger) = filter.classify(&event) {
                    debug!(?trigger, key = %event.key, action = ?event.action, "change queued");
                    shared.wake.notify_one();
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // whatever was missed, a full cycle covers it
                warn!(missed, "watch stream lagged, forcing a cycle");
                shared.wake.notify_one();
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_max() {
        let mut backoff = Backoff::new(&RetryConfig {
            max_retries: 5,
            initial_delay_ms: 100,
            max_delay_ms: 350,
        });

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_lagged_watch_stream_wakes_controller() {
        let (tx, rx) = broadcast::channel(1);
        let unrelated = WatchEvent {
            kind: cabundle_core::ObjectKind::ConfigMap,
            key: cabundle_core::ObjectKey::new("default", "unrelated"),
            action: cabundle_core::WatchAction::Modified,
        };
        for _ in 0..3 {
            tx.send(unrelated.clone()).unwrap();
        }

        let shared = Arc::new(Shared {
            wake: Notify::new(),
            status: Mutex::new(ControllerStatus::default()),
        });
        let forwarder = tokio::spawn(forward_watch_events(
            rx,
            TriggerFilter::from_config(&EngineConfig::default()),
            Arc::clone(&shared),
        ));

        tokio::time::timeout(Duration::from_secs(1), shared.wake.notified())
            .await
            .expect("lag did not wake the controller");
        forwarder.abort();
    }

    #[test]
    fn test_handle_status_starts_empty() {
        let controller = Controller::new(
            Arc::new(EngineConfig::default()),
            Arc::new(crate::store::InMemoryStore::new()),
        );
        let status = controller.handle().status();
        assert_eq!(status.cycles, 0);
        assert!(status.last_outcome.is_none());
    }
}
