//! Reconciliation error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::codec::ParseError;
use crate::store::StoreError;

/// Failure of one reconciliation cycle.
///
/// Only the system bundle, the store and exhausted write retries fail a
/// cycle. Problems with the user or provider bundles degrade the merge
/// instead and never show up here.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// System bundle file could not be read; the I/O error is kept as-is
    #[error("unable to read system trust bundle {}: {source}", path.display())]
    SystemBundleUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// System bundle file holds no usable certificates
    #[error("system trust bundle {} is invalid: {source}", path.display())]
    SystemBundleInvalid {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// Reading or writing the output artifact failed
    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    /// Every attempt lost the race against another writer
    #[error("trust bundle write still conflicting after {attempts} attempts")]
    ConflictRetriesExhausted { attempts: u32 },
}

impl ReconcileError {
    /// Whether the failure points at the system bundle, i.e. a deployment defect.
    pub fn is_system_bundle(&self) -> bool {
        matches!(
            self,
            ReconcileError::SystemBundleUnreadable { .. } | ReconcileError::SystemBundleInvalid { .. }
        )
    }

    /// The underlying I/O error of an unreadable system bundle.
    pub fn io_error(&self) -> Option<&std::io::Error> {
        match self {
            ReconcileError::SystemBundleUnreadable { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
