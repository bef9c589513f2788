//! Tracing subscriber setup for the binary.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Console logging to stderr. `RUST_LOG` overrides the level chosen by
/// `verbose`. Calling it twice is harmless.
pub fn init(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kabuwalk={level},warn")));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_names(verbose)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}
