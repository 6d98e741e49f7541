//! Shared process-wide state, threaded through the axum router and every
//! background task by composition — one `Arc<AppStateInner>` rather than
//! ambient statics, following the teacher's `AppState`/`AppStateInner` split.

use std::sync::Arc;
use std::time::Instant;

use balancer_core::config::Config;
use balancer_core::counters::Counters;
use balancer_core::dispatcher::Dispatcher;
use balancer_core::endpoint::EndpointRegistry;
use balancer_core::pool::ServicePool;
use balancer_sbbs::pipeline::SbbsPipeline;

#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub config: Config,
    pub counters: Arc<Counters>,
    pub dispatcher: Dispatcher,
    pub endpoints: Arc<EndpointRegistry>,
    pub wallet_pool: Arc<ServicePool>,
    pub bbs_pool: Option<Arc<ServicePool>>,
    pub sbbs_pipeline: Option<Arc<SbbsPipeline>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: Config,
        counters: Arc<Counters>,
        dispatcher: Dispatcher,
        endpoints: Arc<EndpointRegistry>,
        wallet_pool: Arc<ServicePool>,
        bbs_pool: Option<Arc<ServicePool>>,
        sbbs_pipeline: Option<Arc<SbbsPipeline>>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                counters,
                dispatcher,
                endpoints,
                wallet_pool,
                bbs_pool,
                sbbs_pipeline,
                start_time: Instant::now(),
            }),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }
}
