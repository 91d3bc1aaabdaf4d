use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;

use tunnelwatch::{bootstrap, server, telemetry};
use tunnelwatch_application::Watcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init()?;

    let config_path = bootstrap::config_path();
    let config = bootstrap::load_config(&config_path)?;
    tracing::info!(path = %config_path.display(), ?config, "configuration loaded");
    if config.inventory.is_none() {
        tracing::warn!("no inventory configured, every cycle will fail until one is set");
    }

    let ports = bootstrap::build_ports(&config)?;
    let listen = config.listen.clone();
    let period = config.schedule_interval.max(Duration::from_secs(1));
    let watcher = Watcher::new(ports, config);

    tokio::spawn(run_schedule(watcher.clone(), period));

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    tracing::info!(%listen, "http server listening");
    axum::serve(listener, server::router(watcher))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .context("http server failed")?;
    Ok(())
}

async fn run_schedule(watcher: Watcher, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(err) = watcher.run_cycle().await {
            tracing::error!(error = %err, "scheduled cycle failed");
        }
    }
}
