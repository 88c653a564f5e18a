use tracing_subscriber::EnvFilter;

/// Opt-in tracing setup for binaries and examples embedding the crate.
/// Filtering follows `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to set tracing subscriber: {err}"))
}
