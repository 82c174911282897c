//! Tracing subscriber setup
//!
//! Reads `RECEPTIONIST_LOG` for per-target levels, e.g.
//! `RECEPTIONIST_LOG=receptionist_common::auth=debug,reqwest=warn`.
//! Falls back to [`DEFAULT_FILTER`] when unset or invalid.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the filter directives
pub const LOG_ENV_VAR: &str = "RECEPTIONIST_LOG";

/// Filter used when [`LOG_ENV_VAR`] is not set
pub const DEFAULT_FILTER: &str = "receptionist_common=info,receptionist_infra=info";

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

static INIT: Once = Once::new();

/// Install the global subscriber
///
/// Idempotent. Leaves an already installed subscriber in place.
pub fn init_tracing(format: LogFormat) {
    INIT.call_once(|| {
        let filter = env_filter();
        let registry = tracing_subscriber::registry().with(filter);

        let result = match format {
            LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
            LogFormat::Json => {
                registry.with(fmt::layer().json().with_current_span(true)).try_init()
            }
        };

        if result.is_err() {
            tracing::debug!("Global tracing subscriber already installed");
        }
    });
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_idempotent() {
        init_tracing(LogFormat::Json);
        init_tracing(LogFormat::Pretty);
        tracing::info!("still logging");
    }

    #[test]
    fn test_default_filter_parses() {
        let filter = EnvFilter::try_new(DEFAULT_FILTER);
        assert!(filter.is_ok());
    }
}
