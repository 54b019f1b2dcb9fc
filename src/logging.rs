use anyhow::Context as _;

pub const DEFAULT_DIRECTIVE: &str = "info";
pub const QUIET_DIRECTIVE: &str = "warn";

/// Installs the stderr subscriber. `RUST_LOG` takes precedence over `default_directive`.
pub fn init(default_directive: &str) -> anyhow::Result<()> {
    let filter = env_filter(default_directive)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn env_filter(default_directive: &str) -> anyhow::Result<tracing_subscriber::EnvFilter> {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_directive))
        .with_context(|| format!("build log filter (default {default_directive:?})"))
}
