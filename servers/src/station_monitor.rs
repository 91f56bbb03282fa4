use anyhow::{Context, Result};
use lib_common::ingestors::WcsHubIngestor;
use lib_common::retrieve::ApiClient;
use station_sync::{run_event_loop, HttpWarehouseApi, StationSync};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};

mod station_logic;
use station_logic::{config, logger, monitor};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    let _log_guard = logger::setup_logging(&config.log_dir(), config.log_level())?;

    let wms_url = config.wms_base_url.clone().unwrap_or_default();
    let wcs_url = config.wcs_base_url.clone().unwrap_or_default();
    let wms = ApiClient::new(&wms_url, config.request_timeout(), config.max_retries())
        .with_context(|| format!("WMS client for {}", wms_url))?;
    let wcs = ApiClient::new(&wcs_url, config.request_timeout(), config.max_retries())
        .with_context(|| format!("WCS client for {}", wcs_url))?;

    let sync = StationSync::new(config.sync_config(), Arc::new(HttpWarehouseApi::new(wms, wcs)));
    let (shutdown_tx, _) = broadcast::channel(1);

    let monitor_handle = tokio::spawn(monitor::run(sync.clone(), shutdown_tx.subscribe()));

    // Hub events are queued while the registry is being seeded.
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let ingestor = WcsHubIngestor::new(config.hub_config(), events_tx);
    let hub_shutdown = shutdown_tx.subscribe();
    let hub_handle = tokio::spawn(async move { ingestor.run(hub_shutdown).await });

    let report = sync.seed_devices().await;
    for (code, e) in &report.failed {
        tracing::warn!(device = %code, error = %e, "device not seeded");
    }

    for station in config.initial_monitors() {
        if let Err(e) = sync.register_monitored_station(&station).await {
            tracing::warn!(station = %station, error = %e, "initial monitor skipped");
        }
    }

    let pump_handle =
        tokio::spawn(run_event_loop(sync.clone(), events_rx, shutdown_tx.subscribe()));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        tracing::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "SIGTERM handler unavailable");
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());
    sync.cleanup();

    // Wait for components to shut down
    let _ = tokio::try_join!(hub_handle, pump_handle, monitor_handle);

    tracing::info!("Shutdown complete.");
    Ok(())
}
