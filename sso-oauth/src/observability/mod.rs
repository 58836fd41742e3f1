//! Logging setup
//!
//! Installs a `tracing` subscriber filtered by `RUST_LOG`. Debug builds log
//! human-readable output and release builds log JSON lines, unless the host
//! picks a [`LogFormat`] explicitly.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable events
    Pretty,
    /// One JSON object per event
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Initialize the global tracing subscriber in the build's default format
///
/// Hosts that already install their own subscriber should skip this.
///
/// # Example
///
/// ```rust,no_run
/// use sso_oauth::observability;
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init()?;
/// tracing::info!("Application started");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init() -> anyhow::Result<()> {
    init_with(LogFormat::default())
}

/// Initialize the global tracing subscriber with an explicit format
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init_with(format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let (pretty, json) = match format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer().pretty()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty)
        .with(json)
        .try_init()?;

    Ok(())
}

fn default_filter() -> EnvFilter {
    if cfg!(debug_assertions) {
        EnvFilter::new("debug,sso_oauth=trace")
    } else {
        EnvFilter::new("info")
    }
}
