//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;

/// Install a fmt subscriber for the engine
///
/// `RUST_LOG` takes precedence; otherwise logs at `debug` when
/// `config.debug` is set and at `info` otherwise. Does nothing if the host
/// already installed a global subscriber.
pub fn init_tracing(config: &EngineConfig) {
    let fallback = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
