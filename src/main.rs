use std::sync::Arc;

use riskwatch_mempool::sinks::build_sinks;
use riskwatch_mempool::{AlertDispatcher, Monitor, MonitorConfig, MonitorError, NodeClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "Mempool monitor failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), MonitorError> {
    let config = MonitorConfig::from_env()?;
    info!(
        router = %config.thresholds.router,
        ws_url = %config.connection.ws_url,
        rpc_endpoints = config.connection.rpc_urls.len(),
        "Configuration loaded"
    );

    let sinks = build_sinks(&config.sinks).await?;
    let dispatcher = AlertDispatcher::spawn(sinks, &config.dispatch);
    let ledger = NodeClient::new(&config.connection)?;

    let monitor = Monitor::new(
        ledger,
        Arc::new(config.thresholds),
        config.connection,
        dispatcher.handle(),
    );
    let status = monitor.status();

    let cancel = CancellationToken::new();
    let monitor_task = tokio::spawn(monitor.run(cancel.clone()));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!(state = %status.state(), "Shutdown requested");
    cancel.cancel();

    match monitor_task.await {
        Ok(stats) => info!(
            notifications = stats.notifications,
            flagged = stats.flagged,
            reconnects = stats.reconnects,
            "Monitor finished"
        ),
        Err(e) => error!(error = %e, "Monitor task failed"),
    }

    let delivered = dispatcher.shutdown().await;
    info!(delivered = delivered.delivered, dropped = delivered.dropped, "Alerts flushed");
    Ok(())
}
