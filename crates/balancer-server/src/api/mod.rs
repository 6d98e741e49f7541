pub mod status;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;
use crate::websocket::ws_handler;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status::hello))
        .route("/status", get(status::get_status))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
