use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, Mutex};

use balancer_core::counters::Counters;
use balancer_protocol::methods::{NewMessageParams, SubscribeParams, UnsubscribeParams};

use crate::crypto::keys_match;
use crate::push::{PushError, PushSender};
use crate::store::{Subscription, SubscriptionStore};
use crate::wsclient::WsClient;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("server key does not match configured VAPID public key")]
    ServerKeyMismatch,
    #[error("subscription expiry must be in the future")]
    AlreadyExpired,
    #[error("caller does not control the private key for this address")]
    KeysDoNotMatch,
    #[error("notification endpoint is not a valid URI")]
    BadEndpoint,
    #[error("p256dh and auth push keys must not be empty")]
    MissingPushKeys,
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

/// Owns the single WebSocket connection to the currently-live SBBS child and
/// the persistent subscription store; re-wires itself whenever the pool
/// drops and relaunches that child.
pub struct SbbsPipeline {
    store: Arc<SubscriptionStore>,
    push: Arc<PushSender>,
    counters: Arc<Counters>,
    client: Mutex<Option<Arc<WsClient>>>,
}

impl SbbsPipeline {
    pub fn new(store: Arc<SubscriptionStore>, push: Arc<PushSender>, counters: Arc<Counters>) -> Arc<Self> {
        Arc::new(Self { store, push, counters, client: Mutex::new(None) })
    }

    /// Called when the pool drops the SBBS child: tears down the socket.
    pub async fn on_dropped(&self) {
        let mut client = self.client.lock().await;
        if let Some(c) = client.take() {
            c.shutdown();
        }
    }

    /// Called when the pool relaunches the SBBS child: opens a fresh socket
    /// and replays every persisted subscription so the new child learns
    /// about all addresses it needs to watch.
    pub async fn on_restarted(self: &Arc<Self>, port: u16) {
        let (message_tx, mut message_rx) = mpsc::channel(256);
        let url = format!("ws://127.0.0.1:{port}");
        let new_client = Arc::new(WsClient::connect(url, message_tx));

        {
            let mut client = self.client.lock().await;
            *client = Some(Arc::clone(&new_client));
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(raw) = message_rx.recv().await {
                this.handle_child_message(&raw).await;
            }
        });

        for sub in self.store.for_all() {
            let payload = json!({
                "jsonrpc": "2.0",
                "method": "subscribe",
                "params": {
                    "SbbsAddress": sub.sbbs_address,
                    "NotificationEndpoint": sub.notification_endpoint,
                },
            });
            new_client.send(payload.to_string()).await;
        }
    }

    async fn handle_child_message(self: &Arc<Self>, raw: &str) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            tracing::warn!("sbbs child sent malformed frame");
            self.counters.count_bbs_error();
            return;
        };
        let Some(method) = value.get("method").and_then(|m| m.as_str()) else {
            self.counters.count_bbs_error();
            return;
        };
        if method != "new_message" {
            tracing::debug!(method, "sbbs child sent unrecognised method");
            self.counters.count_bbs_bad_method();
            return;
        }
        self.counters.count_bbs_message();
        let Some(params) = value.get("params").cloned() else {
            self.counters.count_bbs_error();
            return;
        };
        let Ok(params) = serde_json::from_value::<NewMessageParams>(params) else {
            self.counters.count_bbs_error();
            return;
        };
        self.fan_out(params.address, params.data).await;
    }

    /// Pushes `data` to every subscription registered for `address`,
    /// spawning one independent task per subscription so a slow or failing
    /// push never blocks delivery to the others.
    async fn fan_out(self: &Arc<Self>, address: String, data: String) {
        for sub in self.store.for_prefix(&address) {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.push_one(sub, data.clone()).await;
            });
        }
    }

    async fn push_one(&self, sub: Subscription, data: String) {
        match self.push.send(&sub, data.as_bytes()).await {
            Ok(()) => {}
            Err(PushError::Gone) => {
                tracing::info!(endpoint = %sub.notification_endpoint, "push subscription gone, pruning");
                if let Err(e) = self.store.remove_key(&sub.sbbs_address, &sub.notification_endpoint) {
                    tracing::warn!(error = %e, "failed to prune dead subscription");
                }
            }
            Err(e) => {
                tracing::warn!(endpoint = %sub.notification_endpoint, error = %e, "push send failed");
            }
        }
    }

    pub async fn subscribe(&self, params: SubscribeParams) -> Result<(), PipelineError> {
        if params.server_key != self.push.vapid_public() {
            return Err(PipelineError::ServerKeyMismatch);
        }
        if params.expires_at <= now_secs() {
            return Err(PipelineError::AlreadyExpired);
        }
        if !keys_match(&params.sbbs_address, &params.sbbs_address_private) {
            return Err(PipelineError::KeysDoNotMatch);
        }
        if url::Url::parse(&params.notification_endpoint).is_err() {
            return Err(PipelineError::BadEndpoint);
        }
        if params.p256dh_key.is_empty() || params.auth_key.is_empty() {
            return Err(PipelineError::MissingPushKeys);
        }

        self.store.put(&params)?;

        if let Some(client) = self.client.lock().await.as_ref() {
            let payload = json!({
                "jsonrpc": "2.0",
                "method": "subscribe",
                "params": {
                    "SbbsAddress": params.sbbs_address,
                    "NotificationEndpoint": params.notification_endpoint,
                },
            });
            client.send(payload.to_string()).await;
        }
        Ok(())
    }

    pub async fn unsubscribe(&self, params: UnsubscribeParams) -> Result<(), PipelineError> {
        if !keys_match(&params.sbbs_address, &params.sbbs_address_private) {
            return Err(PipelineError::KeysDoNotMatch);
        }
        self.store.delete(&params)?;

        if let Some(client) = self.client.lock().await.as_ref() {
            let payload = json!({
                "jsonrpc": "2.0",
                "method": "unsubscribe",
                "params": {
                    "SbbsAddress": params.sbbs_address,
                    "NotificationEndpoint": params.notification_endpoint,
                },
            });
            client.send(payload.to_string()).await;
        }
        Ok(())
    }
}

fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}
