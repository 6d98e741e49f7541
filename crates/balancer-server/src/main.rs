mod activity_log;
mod api;
mod auth;
mod diskstat;
mod state;
mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use balancer_core::config::{Config, BBS_MONITOR_CNT};
use balancer_core::counters::{spawn_reset_task, Counters};
use balancer_core::dispatcher::Dispatcher;
use balancer_core::endpoint::EndpointRegistry;
use balancer_core::pool::ServicePool;
use balancer_core::supervisor::SupervisorConfig;
use balancer_sbbs::pipeline::SbbsPipeline;
use balancer_sbbs::push::PushSender;
use balancer_sbbs::store::SubscriptionStore;

use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "balancer", about = "wallet-service balancer")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a fresh VAPID keypair and print it, then exit.
    VapidKeys,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if matches!(args.command, Some(Command::VapidKeys)) {
        let (public, private) = balancer_sbbs::crypto::generate_vapid_keypair();
        tracing::info!(vapid_public = %public, vapid_private = %private, "generated VAPID keypair");
        return Ok(());
    }

    let config = Config::load(&args.config)?;
    tracing::info!(config = %args.config, listen = %config.listen_address, "service balancer starting");

    let counters = Arc::new(Counters::default());
    let endpoints = EndpointRegistry::new(Duration::from_millis(config.endpoint_alive_timeout_ms));

    let wallet_pool = spawn_wallet_pool(&config, counters.clone(), endpoints.clone()).await?;

    let dispatcher = Dispatcher::new(
        Arc::clone(&wallet_pool),
        Arc::clone(&endpoints),
        config.service_public_address.clone(),
        config.return_raw_svc_port,
    );

    let (bbs_pool, sbbs_pipeline) = spawn_bbs_pool(&config, counters.clone()).await?;

    spawn_reset_task(Arc::clone(&counters));

    let state = AppState::new(config.clone(), counters, dispatcher, endpoints, wallet_pool, bbs_pool, sbbs_pipeline);

    activity_log::spawn(state.clone());

    let app = api::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_address).await?;
    tracing::info!(addr = %config.listen_address, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

/// Spawns the wallet-service pool and the background task that mirrors its
/// `Dropped` events into the endpoint registry and counters, matching the
/// original `walletServicesInitialize` wiring.
async fn spawn_wallet_pool(
    config: &Config,
    counters: Arc<Counters>,
    endpoints: Arc<EndpointRegistry>,
) -> anyhow::Result<Arc<ServicePool>> {
    let (dropped_tx, mut dropped_rx) = mpsc::channel(1);
    let (restarted_tx, mut restarted_rx) = mpsc::channel(1);

    let supervisor_cfg = SupervisorConfig {
        binary_path: config.wallet_service_path.clone(),
        node_address: config.beam_node_address.clone(),
        allowed_origin: config.allowed_origin.clone(),
        start_timeout: Duration::from_millis(config.service_launch_timeout_ms),
        heartbeat_timeout: Duration::from_millis(config.service_heartbeat_timeout_ms),
    };

    let pool = ServicePool::new(
        config.wallet_service_cnt(),
        config.wallet_service_first_port,
        config.wallet_service_last_port,
        supervisor_cfg,
        Duration::from_millis(config.service_alive_timeout_ms),
        dropped_tx,
        restarted_tx,
    )
    .await?;

    tokio::spawn(async move {
        while let Some(index) = dropped_rx.recv().await {
            let (endpoints_removed, clients_removed) = endpoints.drop_service_endpoints(index).await;
            counters.count_ws_drop(endpoints_removed as i64, clients_removed as i64);
            tracing::warn!(index, endpoints_removed, clients_removed, "wallet service dropped");
        }
    });

    tokio::spawn(async move {
        while let Some(index) = restarted_rx.recv().await {
            tracing::info!(index, "wallet service restarted");
        }
    });

    Ok(pool)
}

/// Spawns the single SBBS monitor child and the subscription pipeline, but
/// only when VAPID keys are configured — their absence disables the whole
/// pipeline per SPEC_FULL §6.
async fn spawn_bbs_pool(config: &Config, counters: Arc<Counters>) -> anyhow::Result<(Option<Arc<ServicePool>>, Option<Arc<SbbsPipeline>>)> {
    let (Some(vapid_public), Some(vapid_private)) = (config.vapid_public.clone(), config.vapid_private.clone()) else {
        tracing::info!("vapid keys not configured, sbbs pipeline disabled");
        return Ok((None, None));
    };

    let (dropped_tx, mut dropped_rx) = mpsc::channel(1);
    let (restarted_tx, mut restarted_rx) = mpsc::channel(1);

    let supervisor_cfg = SupervisorConfig {
        binary_path: config.bbs_monitor_path.clone(),
        node_address: config.beam_node_address.clone(),
        allowed_origin: config.allowed_origin.clone(),
        start_timeout: Duration::from_millis(config.service_launch_timeout_ms),
        heartbeat_timeout: Duration::from_millis(config.service_heartbeat_timeout_ms),
    };

    let pool = ServicePool::new(
        BBS_MONITOR_CNT,
        config.bbs_monitor_first_port,
        config.bbs_monitor_last_port,
        supervisor_cfg,
        Duration::from_millis(config.service_alive_timeout_ms),
        dropped_tx,
        restarted_tx,
    )
    .await?;

    let store = Arc::new(SubscriptionStore::open(&config.database_path, &vapid_public)?);
    let push = Arc::new(PushSender::new(vapid_public, vapid_private, config.push_contact_mail.clone()));
    let pipeline = SbbsPipeline::new(Arc::clone(&store), push, Arc::clone(&counters));

    balancer_sbbs::spawn_expiry_sweep(Arc::clone(&store));

    if let Some(port) = pool.port_at(0).await {
        pipeline.on_restarted(port).await;
    }

    {
        let pipeline = Arc::clone(&pipeline);
        let counters = Arc::clone(&counters);
        tokio::spawn(async move {
            while dropped_rx.recv().await.is_some() {
                counters.count_bbs_drops();
                pipeline.on_dropped().await;
            }
        });
    }
    {
        let pipeline = Arc::clone(&pipeline);
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            while let Some(index) = restarted_rx.recv().await {
                if let Some(port) = pool.port_at(index).await {
                    pipeline.on_restarted(port).await;
                }
            }
        });
    }

    Ok((Some(pool), Some(pipeline)))
}
