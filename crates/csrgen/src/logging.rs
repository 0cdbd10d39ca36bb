//! Subscriber setup for the binary.
//!
//! Library code logs through the `log` facade and opens `tracing` spans; the
//! `LogTracer` bridge turns `log` records into tracing events so both end up
//! in the same formatted output.

use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::error::LoggingError;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// `json` selects JSON lines; anything else is plain text.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber and the `log` bridge. Fails if either has
/// already been installed in this process.
pub fn init(format: LogFormat) -> Result<(), LoggingError> {
    LogTracer::init().map_err(|e| LoggingError::LogBridge(e.to_string()))?;

    let registry = Registry::default().with(env_filter());
    let result = match format {
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_target(true).with_thread_names(true)),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        ),
    };
    result.map_err(|e| LoggingError::Subscriber(e.to_string()))
}
