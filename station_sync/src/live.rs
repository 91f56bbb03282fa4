//! Live channel pump: feeds hub events into the core one at a time.

use lib_common::ingestors::{ConnectionState, HubEvent};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::error::SyncError;
use crate::service::StationSync;

/// What the core exposes to the live channel adapter.
pub trait LiveChannelHandler: Send + Sync {
    /// Applies one device update. Must not wait on the network: anything slow
    /// is started in the background so later events are not held up.
    fn on_device_update(&self, code: &str, payload: &Value) -> Result<(), SyncError>;

    fn on_connection_state(&self, state: ConnectionState);
}

impl LiveChannelHandler for StationSync {
    fn on_device_update(&self, code: &str, payload: &Value) -> Result<(), SyncError> {
        self.dispatch_device_update(code, payload).map(|_| ())
    }

    fn on_connection_state(&self, state: ConnectionState) {
        StationSync::on_connection_state(self, state)
    }
}

/// Drains `events` into `handler` until shutdown or until every sender is gone.
///
/// Events are applied sequentially, so a device update is fully reconciled
/// before the next one is looked at. Goods fetches run detached.
pub async fn run_event_loop<H>(
    handler: H,
    mut events: mpsc::UnboundedReceiver<HubEvent>,
    mut shutdown: broadcast::Receiver<()>,
) where
    H: LiveChannelHandler,
{
    let mut applied: u64 = 0;
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(applied, "live event loop shutting down");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!(applied, "live channel closed");
                    break;
                };
                match event {
                    HubEvent::DeviceDataUpdate { code, payload } => {
                        if let Err(e) = handler.on_device_update(&code, &payload) {
                            tracing::debug!(device = %code, error = %e, "device update skipped");
                        } else {
                            applied += 1;
                        }
                    }
                    HubEvent::Connection(state) => handler.on_connection_state(state),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<String>>,
        states: Mutex<Vec<ConnectionState>>,
    }

    impl LiveChannelHandler for &Recorder {
        fn on_device_update(&self, code: &str, _payload: &Value) -> Result<(), SyncError> {
            self.updates.lock().unwrap().push(code.to_string());
            Ok(())
        }

        fn on_connection_state(&self, state: ConnectionState) {
            self.states.lock().unwrap().push(state);
        }
    }

    #[tokio::test]
    async fn events_are_applied_in_order_until_senders_drop() {
        let recorder = Recorder::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(HubEvent::Connection(ConnectionState::Connected)).unwrap();
        for code in ["Tran3001", "Crn2002", "Tran3001"] {
            tx.send(HubEvent::DeviceDataUpdate {
                code: code.to_string(),
                payload: serde_json::json!({}),
            })
            .unwrap();
        }
        drop(tx);

        run_event_loop(&recorder, rx, shutdown_rx).await;

        assert_eq!(
            *recorder.updates.lock().unwrap(),
            vec!["Tran3001", "Crn2002", "Tran3001"]
        );
        assert_eq!(*recorder.states.lock().unwrap(), vec![ConnectionState::Connected]);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let recorder = Recorder::default();
        let (_tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        shutdown_tx.send(()).unwrap();

        run_event_loop(&recorder, rx, shutdown_rx).await;
        assert!(recorder.updates.lock().unwrap().is_empty());
    }
}
