//! # WCS Hub Ingestor
//!
//! WebSocket client for the WCS SignalR hub using the JSON hub protocol.
//!
//! Frames are JSON documents terminated by the `0x1E` record separator. After
//! the socket opens the client sends the handshake
//! `{"protocol":"json","version":1}` and waits for an empty `{}` answer. From
//! then on the server pushes invocation frames
//! (`{"type":1,"target":"DeviceDataUpdate","arguments":[code,payload]}`),
//! pings (`type` 6) and eventually a close frame (`type` 7).
//!
//! Every device update and every lifecycle change is forwarded on a single
//! unbounded channel in receive order, so consumers see one logical stream.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

const RECORD_SEPARATOR: char = '\u{1e}';
const DEVICE_UPDATE_TARGET: &str = "DeviceDataUpdate";

/// Lifecycle of the push connection, as reported to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// First connection attempt in progress.
    Connecting,
    /// Handshake completed; updates are flowing.
    Connected,
    /// The connection dropped and a new attempt is scheduled.
    Reconnecting,
    /// The ingestor stopped (shutdown requested).
    Disconnected,
    /// The last attempt failed with the given reason.
    Error(String),
}

impl ConnectionState {
    /// Lower-case label used in logs and UI status fields.
    pub fn label(&self) -> &str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error(_) => "error",
        }
    }
}

/// Events emitted by the ingestor.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// A device reported new state. `payload` is the raw device document.
    DeviceDataUpdate {
        /// Device code the update is addressed to.
        code: String,
        /// Device document as sent by the hub.
        payload: Value,
    },
    /// The connection changed state.
    Connection(ConnectionState),
}

/// Errors of a single connection attempt.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The configured hub URL could not be turned into a WebSocket URL.
    #[error("invalid hub url {url}: {reason}")]
    InvalidUrl {
        /// URL as configured.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Socket level failure.
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    /// The server refused the handshake or closed the hub.
    #[error("hub protocol error: {0}")]
    Protocol(String),
    /// No frame (not even a ping) arrived within the inactivity window.
    #[error("no traffic for {0:?}")]
    Inactive(Duration),
    /// The consumer side of the event channel is gone.
    #[error("event consumer dropped")]
    ConsumerGone,
}

/// Configuration for the hub connection.
#[derive(Debug, Clone)]
pub struct WcsHubConfig {
    /// `http(s)://` or `ws(s)://` URL of the hub (e.g. `http://10.20.88.14:8009/hubs/wcsHub`).
    pub hub_url: String,
    /// First reconnect delay; doubled after every failed attempt.
    pub reconnect_base_delay: Duration,
    /// Upper bound for the reconnect delay.
    pub reconnect_max_delay: Duration,
    /// Interval of client pings keeping the server side alive.
    pub keep_alive_interval: Duration,
    /// Silence after which the connection is considered dead.
    pub server_timeout: Duration,
}

impl Default for WcsHubConfig {
    fn default() -> Self {
        Self {
            hub_url: "http://10.20.88.14:8009/hubs/wcsHub".to_string(),
            reconnect_base_delay: Duration::from_millis(1000),
            reconnect_max_delay: Duration::from_millis(30_000),
            keep_alive_interval: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
        }
    }
}

/// A decoded hub frame.
#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    /// Handshake answer; `Some` carries the server's refusal reason.
    Handshake(Option<String>),
    /// Invocation of a client method.
    Invocation {
        /// Hub method name.
        target: String,
        /// Positional arguments.
        arguments: Vec<Value>,
    },
    /// Keep-alive.
    Ping,
    /// Server closes the hub connection.
    Close(Option<String>),
    /// Anything else (completions, stream items, undecodable text).
    Other,
}

/// Turns the configured hub URL into the WebSocket URL to dial.
pub fn hub_ws_url(hub_url: &str) -> Result<Url, HubError> {
    let mut url = Url::parse(hub_url).map_err(|e| HubError::InvalidUrl {
        url: hub_url.to_string(),
        reason: e.to_string(),
    })?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(HubError::InvalidUrl {
                url: hub_url.to_string(),
                reason: format!("unsupported scheme {}", other),
            })
        }
    };
    url.set_scheme(scheme).map_err(|_| HubError::InvalidUrl {
        url: hub_url.to_string(),
        reason: "cannot switch scheme".to_string(),
    })?;
    Ok(url)
}

/// Splits a text message into its record-separated frames and decodes them.
pub fn parse_frames(text: &str) -> Vec<HubFrame> {
    text.split(RECORD_SEPARATOR)
        .filter(|chunk| !chunk.trim().is_empty())
        .map(parse_frame)
        .collect()
}

fn parse_frame(chunk: &str) -> HubFrame {
    let value: Value = match serde_json::from_str(chunk) {
        Ok(v) => v,
        Err(_) => return HubFrame::Other,
    };
    let error = value.get("error").and_then(Value::as_str).map(str::to_string);
    match value.get("type").and_then(Value::as_i64) {
        None => HubFrame::Handshake(error),
        Some(1) => HubFrame::Invocation {
            target: value.get("target").and_then(Value::as_str).unwrap_or_default().to_string(),
            arguments: value
                .get("arguments")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        },
        Some(6) => HubFrame::Ping,
        Some(7) => HubFrame::Close(error),
        Some(_) => HubFrame::Other,
    }
}

/// Extracts `(code, payload)` from a `DeviceDataUpdate` invocation.
///
/// Some hub builds send the device document as a JSON string; it is decoded
/// here so consumers always receive an object.
pub fn device_update(target: &str, arguments: &[Value]) -> Option<(String, Value)> {
    if !target.eq_ignore_ascii_case(DEVICE_UPDATE_TARGET) {
        return None;
    }
    let code = match arguments.first()? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let payload = match arguments.get(1).cloned().unwrap_or(Value::Null) {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    };
    Some((code, payload))
}

fn frame(value: Value) -> String {
    let mut text = value.to_string();
    text.push(RECORD_SEPARATOR);
    text
}

/// Reconnecting client of the WCS hub.
pub struct WcsHubIngestor {
    config: WcsHubConfig,
    events: mpsc::UnboundedSender<HubEvent>,
}

impl WcsHubIngestor {
    /// Creates a new ingestor publishing into `events`.
    pub fn new(config: WcsHubConfig, events: mpsc::UnboundedSender<HubEvent>) -> Self {
        Self { config, events }
    }

    fn emit(&self, event: HubEvent) -> Result<(), HubError> {
        self.events.send(event).map_err(|_| HubError::ConsumerGone)
    }

    fn emit_state(&self, state: ConnectionState) -> Result<(), HubError> {
        tracing::info!(state = state.label(), "wcs hub connection state");
        self.emit(HubEvent::Connection(state))
    }

    /// Primary execution loop with reconnection logic. Returns on shutdown or
    /// when the consumer dropped its receiver.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let url = match hub_ws_url(&self.config.hub_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "wcs hub ingestor not started");
                let _ = self.emit_state(ConnectionState::Error(e.to_string()));
                return;
            }
        };

        if self.emit_state(ConnectionState::Connecting).is_err() {
            return;
        }
        let mut attempt: u32 = 0;

        loop {
            let outcome = tokio::select! {
                _ = shutdown.recv() => break,
                outcome = self.session(&url) => outcome,
            };

            let reported = match outcome {
                Ok(()) => {
                    attempt = 0;
                    self.emit_state(ConnectionState::Reconnecting)
                }
                Err(HubError::ConsumerGone) => return,
                Err(e) => {
                    tracing::warn!(error = %e, url = %url, "wcs hub session ended");
                    self.emit_state(ConnectionState::Error(e.to_string()))
                        .and_then(|_| self.emit_state(ConnectionState::Reconnecting))
                }
            };
            if reported.is_err() {
                return;
            }

            let delay = self.backoff(attempt);
            attempt = attempt.saturating_add(1);
            tracing::debug!(delay_ms = delay.as_millis() as u64, "wcs hub reconnect scheduled");
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = sleep(delay) => {}
            }
        }

        let _ = self.emit_state(ConnectionState::Disconnected);
    }

    /// Reconnect delay for the given number of consecutive failures.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.config
            .reconnect_base_delay
            .saturating_mul(factor)
            .min(self.config.reconnect_max_delay)
    }

    /// One connection from dial to drop. `Ok(())` means the server closed cleanly
    /// after a successful handshake.
    async fn session(&self, url: &Url) -> Result<(), HubError> {
        tracing::info!(url = %url, "connecting to wcs hub");
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(frame(json!({ "protocol": "json", "version": 1 })).into()))
            .await?;

        let mut handshaken = false;
        let mut last_activity = Instant::now();
        let mut keep_alive = interval(self.config.keep_alive_interval);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            return if handshaken {
                                Ok(())
                            } else {
                                Err(HubError::Protocol("closed before handshake".to_string()))
                            };
                        }
                        Some(Ok(_)) => {
                            last_activity = Instant::now();
                            continue;
                        }
                        Some(Err(e)) => return Err(e.into()),
                    };
                    last_activity = Instant::now();

                    for hub_frame in parse_frames(text.as_str()) {
                        match hub_frame {
                            HubFrame::Handshake(Some(reason)) => {
                                return Err(HubError::Protocol(reason));
                            }
                            HubFrame::Handshake(None) => {
                                if !handshaken {
                                    handshaken = true;
                                    self.emit_state(ConnectionState::Connected)?;
                                }
                            }
                            HubFrame::Invocation { target, arguments } => {
                                match device_update(&target, &arguments) {
                                    Some((code, payload)) => {
                                        self.emit(HubEvent::DeviceDataUpdate { code, payload })?;
                                    }
                                    None => {
                                        tracing::trace!(method = %target, "ignored hub invocation")
                                    }
                                }
                            }
                            HubFrame::Close(Some(reason)) => return Err(HubError::Protocol(reason)),
                            HubFrame::Close(None) => return Ok(()),
                            HubFrame::Ping | HubFrame::Other => {}
                        }
                    }
                }
                _ = keep_alive.tick() => {
                    if last_activity.elapsed() > self.config.server_timeout {
                        return Err(HubError::Inactive(self.config.server_timeout));
                    }
                    if handshaken {
                        write.send(Message::Text(frame(json!({ "type": 6 })).into())).await?;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_decodes_frames() {
        let text = concat!(
            "{}\u{1e}",
            r#"{"type":1,"target":"DeviceDataUpdate","arguments":"#,
            r#"["Tran3001",{"code":"Tran3001","palletCode":"PAL-77"}]}"#,
            "\u{1e}",
            r#"{"type":6}"#,
            "\u{1e}",
        );
        let frames = parse_frames(text);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], HubFrame::Handshake(None));
        assert_eq!(frames[2], HubFrame::Ping);
        match &frames[1] {
            HubFrame::Invocation { target, arguments } => {
                let (code, payload) = device_update(target, arguments).unwrap();
                assert_eq!(code, "Tran3001");
                assert_eq!(payload["palletCode"], "PAL-77");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn handshake_refusal_and_close_carry_reason() {
        assert_eq!(
            parse_frames("{\"error\":\"protocol not supported\"}\u{1e}"),
            vec![HubFrame::Handshake(Some("protocol not supported".to_string()))]
        );
        assert_eq!(parse_frames("{\"type\":7}\u{1e}"), vec![HubFrame::Close(None)]);
        assert_eq!(parse_frames("garbage\u{1e}"), vec![HubFrame::Other]);
    }

    #[test]
    fn string_payload_is_decoded() {
        let args = vec![json!("Crn2002"), json!("{\"code\":\"Crn2002\",\"workStatus\":1}")];
        let (_, payload) = device_update("devicedataupdate", &args).unwrap();
        assert_eq!(payload["workStatus"], 1);
        assert!(device_update("OtherTarget", &args).is_none());
        assert!(device_update(DEVICE_UPDATE_TARGET, &[]).is_none());
    }

    #[test]
    fn http_urls_become_websocket_urls() {
        assert_eq!(
            hub_ws_url("http://h:8009/hubs/wcsHub").unwrap().as_str(),
            "ws://h:8009/hubs/wcsHub"
        );
        assert_eq!(hub_ws_url("https://h/hubs/wcsHub").unwrap().as_str(), "wss://h/hubs/wcsHub");
        assert!(hub_ws_url("ftp://h/x").is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let ingestor = WcsHubIngestor::new(
            WcsHubConfig {
                reconnect_base_delay: Duration::from_millis(500),
                reconnect_max_delay: Duration::from_millis(3000),
                ..WcsHubConfig::default()
            },
            tx,
        );
        assert_eq!(ingestor.backoff(0), Duration::from_millis(500));
        assert_eq!(ingestor.backoff(1), Duration::from_millis(1000));
        assert_eq!(ingestor.backoff(2), Duration::from_millis(2000));
        assert_eq!(ingestor.backoff(3), Duration::from_millis(3000));
        assert_eq!(ingestor.backoff(40), Duration::from_millis(3000));
    }
}
