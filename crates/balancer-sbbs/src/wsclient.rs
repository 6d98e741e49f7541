use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const PONG_WAIT: Duration = Duration::from_secs(30);
const PING_PERIOD: Duration = Duration::from_secs(27); // 9/10 of PONG_WAIT
const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum WsClientError {
    #[error("connect failed: {0}")]
    Connect(#[source] tokio_tungstenite::tungstenite::Error),
}

/// A single, auto-reconnecting WebSocket client to the SBBS monitor child.
/// Any IO error ends the current connection and falls back into the
/// reconnect loop rather than propagating upward — the pipeline only
/// observes messages and liveness, never transport errors.
pub struct WsClient {
    send_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl WsClient {
    /// Connects to `url` and spawns the combined read/write loop. Returns
    /// immediately; the connection itself is established lazily with a
    /// 1-second retry cadence until `cancel` fires.
    pub fn connect(url: String, on_message: mpsc::Sender<String>) -> Self {
        let cancel = CancellationToken::new();
        let (send_tx, send_rx) = mpsc::channel::<String>(64);

        tokio::spawn(run(url, on_message, send_rx, cancel.clone()));

        Self { send_tx, cancel }
    }

    pub async fn send(&self, payload: String) {
        let _ = self.send_tx.send(payload).await;
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn run(url: String, on_message: mpsc::Sender<String>, mut send_rx: mpsc::Receiver<String>, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio_tungstenite::connect_async(&url) => result,
        };

        let ws_stream = match connected {
            Ok((stream, _)) => stream,
            Err(e) => {
                tracing::debug!(error = %e, "sbbs websocket connect failed, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(RECONNECT_INTERVAL) => continue,
                }
            }
        };

        let (mut sink, mut stream) = ws_stream.split();
        let mut ping_tick = tokio::time::interval(PING_PERIOD);
        ping_tick.tick().await; // first tick is immediate

        'connection: loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ping_tick.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break 'connection;
                    }
                }
                maybe_payload = send_rx.recv() => {
                    match maybe_payload {
                        Some(payload) => {
                            if sink.send(Message::Text(payload)).await.is_err() {
                                break 'connection;
                            }
                        }
                        None => return,
                    }
                }
                next = tokio::time::timeout(PONG_WAIT, stream.next()) => {
                    match next {
                        Err(_elapsed) => break 'connection,
                        Ok(Some(Ok(Message::Text(text)))) => {
                            if on_message.send(text).await.is_err() {
                                return;
                            }
                        }
                        Ok(Some(Ok(Message::Pong(_) | Message::Ping(_)))) => continue,
                        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break 'connection,
                        Ok(Some(Ok(_))) => continue,
                        Ok(Some(Err(e))) => {
                            tracing::debug!(error = %e, "sbbs websocket read error");
                            break 'connection;
                        }
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(RECONNECT_INTERVAL) => {}
        }
    }
}
