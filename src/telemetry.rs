/// Initializes structured logging for binaries embedding the store.
///
/// Verbosity comes from `RUST_LOG`, e.g. `RUST_LOG=store_orders=debug` shows
/// every stock decrement. Falls back to `info` when unset.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // A subscriber may already be installed (tests, embedding binaries)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
