//! Periodic human-readable activity summary, logged at `info` level.
//! Mirrors the original `collectActivityLog`/`startActivityLog`: a single
//! multi-line report, printed immediately and then on a fixed interval.

use std::time::Duration;

use crate::state::AppState;

async fn collect(state: &AppState) -> String {
    let wallet_count = state.inner.wallet_pool.slot_count().await;
    let mut alive = 0usize;
    let mut svc_endpoints = 0usize;
    let mut svc_clients = 0i32;
    for index in 0..wallet_count {
        if state.inner.wallet_pool.pid_at(index).await.is_some() {
            alive += 1;
        }
        let (endpoints, clients) = state.inner.endpoints.service_counts(index).await;
        svc_endpoints += endpoints;
        svc_clients += clients;
    }

    let bbs_alive = match &state.inner.bbs_pool {
        Some(pool) => pool.slot_count().await,
        None => 0,
    };

    let counters = state.inner.counters.snapshot();

    format!(
        "WalletServices:\n\tMax: {}\n\tAlive: {}\n\tDrops: {}\n\tEndpoints: {}\n\tClients: {}\nMonitors:\n\tShould run: {}\n\tMax: {}\n\tAlive: {}\n\tDrops: {}",
        state.inner.config.wallet_service_cnt(),
        alive,
        counters.ws_drops,
        svc_endpoints,
        svc_clients,
        state.inner.bbs_pool.is_some(),
        if state.inner.bbs_pool.is_some() { 1 } else { 0 },
        bbs_alive,
        counters.bbs_drops,
    )
}

/// Spawns the activity-log task: prints once immediately, then every
/// `activity_log_interval_ms`.
pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval_ms = state.inner.config.activity_log_interval_ms;
        let report = collect(&state).await;
        tracing::info!("[==== Activity report ====]\n{report}\n[==========================]");

        let mut tick = tokio::time::interval(Duration::from_millis(interval_ms));
        tick.tick().await; // first tick is immediate; we already printed above
        loop {
            tick.tick().await;
            let report = collect(&state).await;
            tracing::info!("[==== Activity report ====]\n{report}\n[==========================]");
        }
    })
}
