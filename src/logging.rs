use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `fmt` subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .try_init();
}
