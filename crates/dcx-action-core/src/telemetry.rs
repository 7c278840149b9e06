//! Log setup for the `dcx-action` binary.
//!
//! Stdout carries the run report (`[dcx-action]` lines or `--report-json`),
//! so every log line goes to stderr. CI steps can pipe the report without
//! filtering diagnostics out of it.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global stderr subscriber.
///
/// `json` switches to one JSON object per line for log collectors. `level`
/// applies unless `RUST_LOG` is set. The first call wins; later calls do
/// nothing.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

