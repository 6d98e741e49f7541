use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

/// One wallet-id's routing record. `clients_count` tracks how many live
/// sessions reference this endpoint; it reaches zero exactly when the last
/// referencing session logs out or times out.
pub struct Endpoint {
    clients_count: AtomicI32,
    pub service_index: usize,
    pub public_address: String,
    alive_tx: mpsc::Sender<()>,
    logout_tx: mpsc::Sender<()>,
    dropped_tx: mpsc::Sender<()>,
}

impl Endpoint {
    /// Increments the refcount and pings the monitor's alive timer.
    pub async fn use_now(&self) {
        self.clients_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.alive_tx.send(()).await;
    }

    pub async fn mark_alive(&self) {
        let _ = self.alive_tx.send(()).await;
    }

    pub async fn logout(&self) {
        let _ = self.logout_tx.send(()).await;
    }

    fn release(&self) -> i32 {
        let prev = self.clients_count.fetch_sub(1, Ordering::SeqCst);
        if prev < 1 {
            panic!("endpoint refcount went negative for service {}", self.service_index);
        }
        prev - 1
    }

    pub fn clients_count(&self) -> i32 {
        self.clients_count.load(Ordering::SeqCst)
    }
}

struct MonitorChannels {
    alive_rx: mpsc::Receiver<()>,
    logout_rx: mpsc::Receiver<()>,
    dropped_rx: mpsc::Receiver<()>,
}

pub struct EndpointRegistry {
    all: Mutex<HashMap<String, Arc<Endpoint>>>,
    alive_timeout: Duration,
}

impl EndpointRegistry {
    pub fn new(alive_timeout: Duration) -> Arc<Self> {
        Arc::new(Self { all: Mutex::new(HashMap::new()), alive_timeout })
    }

    pub async fn get(&self, wallet_id: &str) -> Option<Arc<Endpoint>> {
        self.all.lock().await.get(wallet_id).cloned()
    }

    /// Inserts a freshly created endpoint, unless a concurrent caller beat
    /// us to it — in that case we `use_now()` the existing one and discard
    /// the service slot reservation the caller made for the new one.
    pub async fn add(self: &Arc<Self>, wallet_id: String, service_index: usize, public_address: String) -> Arc<Endpoint> {
        let mut all = self.all.lock().await;
        if let Some(existing) = all.get(&wallet_id) {
            let existing = Arc::clone(existing);
            drop(all);
            existing.use_now().await;
            return existing;
        }

        let (alive_tx, alive_rx) = mpsc::channel(1);
        let (logout_tx, logout_rx) = mpsc::channel(1);
        let (dropped_tx, dropped_rx) = mpsc::channel(1);
        let endpoint = Arc::new(Endpoint {
            clients_count: AtomicI32::new(1),
            service_index,
            public_address,
            alive_tx,
            logout_tx,
            dropped_tx,
        });
        all.insert(wallet_id.clone(), Arc::clone(&endpoint));
        drop(all);

        tokio::spawn(Arc::clone(self).run_endpoint_monitor(
            wallet_id,
            Arc::clone(&endpoint),
            MonitorChannels { alive_rx, logout_rx, dropped_rx },
        ));

        endpoint
    }

    async fn run_endpoint_monitor(self: Arc<Self>, wallet_id: String, endpoint: Arc<Endpoint>, mut ch: MonitorChannels) {
        let mut timeout = Box::pin(tokio::time::sleep(self.alive_timeout));
        // Disabled after the timer fires with clients still attached: per
        // spec the timer stays stopped until the next `Alive`, rather than
        // re-arming on a fixed cadence.
        let mut timer_active = true;
        loop {
            tokio::select! {
                _ = &mut timeout, if timer_active => {
                    let remaining = endpoint.release();
                    if remaining == 0 {
                        self.remove_if_empty(&wallet_id).await;
                        return;
                    }
                    timer_active = false;
                }
                got = ch.alive_rx.recv() => {
                    if got.is_some() {
                        timeout.as_mut().reset(tokio::time::Instant::now() + self.alive_timeout);
                        timer_active = true;
                    }
                }
                got = ch.logout_rx.recv() => {
                    if got.is_some() {
                        let remaining = endpoint.release();
                        if remaining == 0 {
                            self.remove_if_empty(&wallet_id).await;
                        }
                        return;
                    }
                }
                _ = ch.dropped_rx.recv() => {
                    return;
                }
            }
        }
    }

    async fn remove_if_empty(&self, wallet_id: &str) {
        let mut all = self.all.lock().await;
        if let Some(endpoint) = all.get(wallet_id) {
            if endpoint.clients_count() <= 0 {
                all.remove(wallet_id);
            }
        }
    }

    /// Drops every endpoint routed through `service_index`, returning the
    /// number of endpoints and the total client count removed.
    pub async fn drop_service_endpoints(&self, service_index: usize) -> (usize, i32) {
        let mut all = self.all.lock().await;
        let to_remove: Vec<String> = all
            .iter()
            .filter(|(_, ep)| ep.service_index == service_index)
            .map(|(id, _)| id.clone())
            .collect();

        let mut clients_removed = 0;
        for wallet_id in &to_remove {
            if let Some(endpoint) = all.remove(wallet_id) {
                clients_removed += endpoint.clients_count();
                let _ = endpoint.dropped_tx.send(()).await;
            }
        }
        (to_remove.len(), clients_removed)
    }

    pub async fn service_counts(&self, service_index: usize) -> (usize, i32) {
        let all = self.all.lock().await;
        let mut endpoints = 0;
        let mut clients = 0;
        for ep in all.values() {
            if ep.service_index == service_index {
                endpoints += 1;
                clients += ep.clients_count();
            }
        }
        (endpoints, clients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_reuses_existing_entry_on_race() {
        let registry = EndpointRegistry::new(Duration::from_secs(30));
        let first = registry.add("w1".to_string(), 0, "host:1".to_string()).await;
        let second = registry.add("w1".to_string(), 1, "host:2".to_string()).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.clients_count(), 2);
        assert_eq!(second.public_address, "host:1");
    }

    #[tokio::test]
    async fn drop_service_endpoints_removes_matching_entries() {
        let registry = EndpointRegistry::new(Duration::from_secs(30));
        registry.add("w1".to_string(), 0, "host:1".to_string()).await;
        registry.add("w2".to_string(), 1, "host:2".to_string()).await;
        let (removed, clients) = registry.drop_service_endpoints(0).await;
        assert_eq!(removed, 1);
        assert_eq!(clients, 1);
        assert!(registry.get("w1").await.is_none());
        assert!(registry.get("w2").await.is_some());
    }
}
