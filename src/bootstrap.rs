use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use tunnelwatch_adapter_cloudflare::CloudflareMonitor;
use tunnelwatch_adapter_github::GithubWorkflowDispatcher;
use tunnelwatch_adapter_notification::TelegramNotifier;
use tunnelwatch_adapter_store::MemoryKvStore;
use tunnelwatch_domain::WatchConfig;
use tunnelwatch_ports::{KvStorePort, NotificationPort, PortSet, SystemClock};

pub const ENV_CONFIG_PATH: &str = "TUNNELWATCH_CONFIG_PATH";

pub fn config_path() -> PathBuf {
    if let Ok(path) = env::var(ENV_CONFIG_PATH) {
        return PathBuf::from(path);
    }

    if let Ok(home) = env::var("HOME") {
        return Path::new(&home).join(".tunnelwatch").join("config.yaml");
    }

    PathBuf::from("tunnelwatch-config.yaml")
}

/// Reads the config file, then applies process environment overrides.
pub fn load_config(path: &Path) -> Result<WatchConfig> {
    load_config_with(path, |key| env::var(key).ok())
}

pub fn load_config_with<F>(path: &Path, lookup: F) -> Result<WatchConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = WatchConfig::load_from_path(path)?;
    config.apply_overrides(lookup);
    Ok(config)
}

pub fn build_ports(config: &WatchConfig) -> Result<PortSet> {
    let monitoring = CloudflareMonitor::new(&config.endpoints.monitoring, config.fetch_timeout)?;
    let remediation = GithubWorkflowDispatcher::new(
        &config.endpoints.remediation,
        &config.workflow_file,
        config.request_timeout,
    )?;

    let notification: Option<Arc<dyn NotificationPort>> = match config.active_notification() {
        Some(telegram) => Some(Arc::new(TelegramNotifier::new(
            &config.endpoints.notification,
            &telegram.bot_token,
            &telegram.chat_id,
            config.request_timeout,
        )?)),
        None => {
            tracing::warn!("notification credentials missing, alerts disabled");
            None
        }
    };

    Ok(PortSet {
        monitoring: Arc::new(monitoring),
        remediation: Arc::new(remediation),
        notification,
        store: build_store(config)?,
        clock: Arc::new(SystemClock),
    })
}

fn build_store(config: &WatchConfig) -> Result<Arc<dyn KvStorePort>> {
    let Some(path) = &config.store_path else {
        tracing::warn!("no store path configured, mutes and quotas will not survive a restart");
        return Ok(Arc::new(MemoryKvStore::new()));
    };
    open_sqlite(path)
}

#[cfg(feature = "sqlite")]
fn open_sqlite(path: &Path) -> Result<Arc<dyn KvStorePort>> {
    use anyhow::Context;

    let store = tunnelwatch_adapter_store::SqliteKvStore::open(path)
        .with_context(|| format!("failed to open policy store {}", path.display()))?;
    tracing::info!(path = %store.path().display(), "policy store opened");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(path: &Path) -> Result<Arc<dyn KvStorePort>> {
    anyhow::bail!(
        "store path {} configured but this build has no sqlite support",
        path.display()
    )
}
