use std::env;

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

pub const ENV_LOG_JSON: &str = "TUNNELWATCH_LOG_JSON";

/// Installs the global subscriber. `RUST_LOG` filters, defaulting to `info`.
pub fn init() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if json_requested(env::var(ENV_LOG_JSON).ok().as_deref()) {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

fn json_requested(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|value| value.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}
