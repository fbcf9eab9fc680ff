//! Structured logging infrastructure for cabundle.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directive used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "info";

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initialize the logging system with structured output.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
/// If not set, defaults to `info` level.
///
/// # Example
/// ```no_run
/// use cabundle_core::logging;
///
/// logging::init();
/// tracing::info!("Trust bundle controller started");
/// ```
pub fn init() {
    init_with_default(DEFAULT_DIRECTIVE);
}

/// Same as [`init`] but with a caller-chosen fallback directive,
/// e.g. `"cabundle_reconciler=debug,info"`.
pub fn init_with_default(default_directive: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize the logging system with JSON output for production environments.
///
/// This format is suitable for log aggregation systems and structured log analysis.
/// Log level can be configured via the `RUST_LOG` environment variable.
///
/// # Example
/// ```no_run
/// use cabundle_core::logging;
///
/// logging::init_json();
/// tracing::info!(namespace = "openshift-cloud-controller-manager", "Controller started");
/// ```
pub fn init_json() {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_DIRECTIVE))
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_directive_is_accepted() {
        // Installing a global subscriber can only happen once per process,
        // so only the filter construction is exercised here.
        let filter = env_filter("cabundle_reconciler=debug,info");
        assert!(!filter.to_string().is_empty());
    }
}
