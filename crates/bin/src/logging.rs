//! Log subscriber setup.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter
pub(crate) const LOG_ENV: &str = "DEMORA_LOG";

/// Install a stderr subscriber filtered by `DEMORA_LOG` (default `info`)
pub(crate) fn init_logging(json: bool) {
    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .init();
    }
    tracing::debug!(filter_env = LOG_ENV, json, "logging initialized");
}
