use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Stdout carries protocol lines, so all
/// diagnostics go to stderr. RUST_LOG overrides --log-level when set.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
