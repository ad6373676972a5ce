//! Subscriber installation for the `modelport` binary.

use anyhow::{Result, anyhow};
use modelport_common::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Logs go to stderr so `--json` output on stdout stays machine readable.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match config.format.as_str() {
        "json" => subscriber.json().with_timer(tracing_subscriber::fmt::time::uptime()).try_init(),
        "compact" => subscriber.compact().try_init(),
        _ => subscriber.pretty().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
