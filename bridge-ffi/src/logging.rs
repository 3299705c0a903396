//! Tracing subscriber setup.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a formatting subscriber.
///
/// `RUST_LOG` takes precedence over `config.filter`. Does nothing if the host
/// process already installed a global subscriber, so calling it again is
/// harmless.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("Logging initialized");
    }
}
