//! Logging system setup and configuration
//!
//! This module handles the initialization of the tracing-based logging system
//! used throughout the server for debugging, monitoring, and diagnostic output.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt, EnvFilter};

use crate::config::Args;

/// Initialize the logging system
///
/// Sets up structured logging using the tracing crate with configurable
/// output format and filtering levels. The logging level can be controlled
/// through command-line arguments or environment variables.
///
/// # Arguments
/// * `args` - Command line arguments containing the debug and JSON flags
///
/// # Environment Variables
/// * `RUST_LOG` - Override the default logging filter (e.g., "debug", "proximity_core=trace")
pub fn setup_logging(args: &Args) -> Result<()> {
    setup_logging_with_format(args, args.json_logs)
}

/// Initialize logging with an explicit output format
///
/// When `json_format` is true, logs are emitted as structured JSON, useful
/// for log aggregation systems and machine parsing.
pub fn setup_logging_with_format(args: &Args, json_format: bool) -> Result<()> {
    let level = if args.debug { "debug" } else { "info" };

    // Respect RUST_LOG when present, fall back to the CLI-derived level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_setup() {
        let args = Args::default();

        // The global subscriber can only be installed once per process, so
        // this mainly verifies the function does not panic; a second call
        // in the same test binary is allowed to fail.
        let result = setup_logging(&args);
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn test_debug_logging() {
        let mut args = Args::default();
        args.debug = true;

        let result = setup_logging(&args);
        assert!(result.is_ok() || result.is_err());
    }
}
