//! Centralised tracing initialisation for ctxkeep binaries.
//!
//! Filter precedence: `CTXKEEP_LOG`, then `RUST_LOG`, then the supplied
//! level applied to the ctxkeep crates only (dependencies stay at `warn`).
//!
//! Safe to call more than once; only the first call installs a subscriber.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "CTXKEEP_LOG";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Text,
    /// Newline-delimited JSON for log aggregation
    Json,
}

/// Default filter directive: `level` for ctxkeep crates, `warn` for everything else.
pub fn default_directive(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    format!("warn,ctxkeep_core={level},ctxkeep_state={level},ctxkeepd={level}")
}

fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)))
}

/// Initialise the global tracing subscriber.
pub fn init_tracing(format: LogFormat, level: Level) {
    let env_filter = build_filter(level);
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok(),
    };
}
