use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt::SubscriberBuilder};

/// Installs the global fmt subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
}
