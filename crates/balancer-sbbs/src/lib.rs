pub mod crypto;
pub mod pipeline;
pub mod push;
pub mod store;
pub mod wsclient;

use std::sync::Arc;
use std::time::Duration;

use store::SubscriptionStore;

/// Spawns the periodic expired-subscription sweep (every 5 minutes).
pub fn spawn_expiry_sweep(store: Arc<SubscriptionStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(5 * 60));
        loop {
            tick.tick().await;
            let removed = store.sweep_expired();
            if removed > 0 {
                tracing::debug!(removed, "swept expired sbbs subscriptions");
            }
        }
    })
}
