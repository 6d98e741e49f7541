use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::status_allowed;
use crate::diskstat::{db_size, disk_usage};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    secret: Option<String>,
}

#[derive(Debug, Serialize)]
struct ServiceStat {
    index: usize,
    port: Option<u16>,
    pid: Option<u32>,
    endpoints_cnt: usize,
    clients_cnt: i32,
}

/// `GET /status?secret=…` — admin snapshot. Mirrors the original
/// `statusRequest`/`collectStatus(fast=false)`: rejects with 500 when no
/// secret is configured and debug is off, or the provided secret mismatches.
pub async fn get_status(State(state): State<AppState>, Query(query): Query<StatusQuery>) -> Result<Json<Value>, StatusCode> {
    let cfg = &state.inner.config;
    if !status_allowed(cfg.api_secret.as_deref(), cfg.debug, query.secret.as_deref()) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    let wallet_services = service_stats(&state.inner.wallet_pool, Some(state.inner.endpoints.as_ref())).await;
    let bbs_services = match &state.inner.bbs_pool {
        Some(pool) => service_stats(pool, None).await,
        None => Vec::new(),
    };

    let counters = state.inner.counters.snapshot();
    let wallet_sockets = counters.w_connect - counters.w_disconnect;

    Ok(Json(json!({
        "num_cpu": std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        "max_wallet_services": cfg.wallet_service_cnt(),
        "alive_wallet_services": wallet_services.len(),
        "max_bbs_services": if state.inner.bbs_pool.is_some() { 1 } else { 0 },
        "alive_bbs_services": bbs_services.len(),
        "wallet_services": wallet_services,
        "bbs_services": bbs_services,
        "counters": counters,
        "wallet_sockets": wallet_sockets,
        "uptime_seconds": state.uptime_secs(),
        "db_size": db_size(&cfg.database_path),
        "db_disk_usage": disk_usage(&cfg.database_path),
        "self_disk_usage": disk_usage("."),
    })))
}

async fn service_stats(
    pool: &std::sync::Arc<balancer_core::pool::ServicePool>,
    endpoints: Option<&balancer_core::endpoint::EndpointRegistry>,
) -> Vec<ServiceStat> {
    let count = pool.slot_count().await;
    let mut stats = Vec::with_capacity(count);
    for index in 0..count {
        let port = pool.port_at(index).await;
        let pid = pool.pid_at(index).await;
        if port.is_none() && pid.is_none() {
            continue;
        }
        let (endpoints_cnt, clients_cnt) = match endpoints {
            Some(registry) => registry.service_counts(index).await,
            None => (0, 0),
        };
        stats.push(ServiceStat { index, port, pid, endpoints_cnt, clients_cnt });
    }
    stats
}

/// `GET /` — liveness hello.
pub async fn hello() -> &'static str {
    "service-balancer"
}
