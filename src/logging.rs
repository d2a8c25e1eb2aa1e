//! Diagnostic logging setup.
//!
//! Logs go to stderr in the compact format; stdout belongs to the console
//! sink. The filter comes from `CO2_LISTENER_LOG`, then `RUST_LOG`, then the
//! `--verbose` flag.

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "CO2_LISTENER_LOG";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    #[error("logging already initialized: {0}")]
    Init(#[from] TryInitError),
}

/// Install the global subscriber.
pub fn init(verbose: bool) -> Result<(), LoggingError> {
    let override_directives = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .ok();
    let env_filter = EnvFilter::try_new(directives(override_directives, verbose))?;

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init()?;

    Ok(())
}

fn directives(from_env: Option<String>, verbose: bool) -> String {
    match from_env {
        Some(directives) if !directives.trim().is_empty() => directives,
        _ if verbose => "debug".to_string(),
        _ => "info".to_string(),
    }
}
