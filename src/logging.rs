use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Builds the filter from `RUST_LOG`-style directives. An empty or invalid
/// spec falls back to `warn`.
pub fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(directives)
}

/// Installs the fmt subscriber filtered by `RUST_LOG`, `warn` when unset.
/// Calling it again is harmless.
pub fn init_logging() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&directives))
        .try_init();
}
