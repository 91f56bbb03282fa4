use station_sync::StationSync;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Logs every published station snapshot until shutdown.
pub async fn run(sync: StationSync, mut shutdown: broadcast::Receiver<()>) {
    let mut updates = sync.subscribe();

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("station monitor received shutdown signal");
                break;
            }
            update = updates.recv() => match update {
                Ok(state) => {
                    let pick_lines = state
                        .local_goods
                        .iter()
                        .filter(|g| g.pick_quantity > 0.0)
                        .count();
                    tracing::info!(
                        station = %state.station_no,
                        name = %state.station_name,
                        container = %state.current_container,
                        goods = state.local_goods.len(),
                        pick_lines,
                        loading = state.is_loading,
                        error = %state.error_message,
                        "station state"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "station monitor lagging behind updates");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    let status = sync.connection_status();
    tracing::info!(wms = status.wms.label(), wcs = status.wcs.label(), "final connection status");
}
