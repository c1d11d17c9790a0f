use tracing_subscriber::EnvFilter;

/// Install a global subscriber printing `log` records to stderr
///
/// The filter is read from `RUST_LOG` and defaults to `info`. Calling this
/// again after a subscriber is installed has no effect.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
