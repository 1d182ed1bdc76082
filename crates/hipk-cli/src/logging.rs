//! Subscriber setup.

use anyhow::Result;
use hipk_harness::LogFormat;
use hipk_harness::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Logs go to stderr so stdout carries only the run report.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match config.format {
        LogFormat::Json => {
            subscriber.json().with_timer(tracing_subscriber::fmt::time::uptime()).try_init()
        }
        LogFormat::Compact => subscriber.compact().try_init(),
        LogFormat::Pretty => subscriber.pretty().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

/// Make sure errors are visible even if configuration failed before
/// [`setup_logging`] ran.
pub fn ensure_fallback() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
