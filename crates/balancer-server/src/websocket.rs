//! Per-client WebSocket session: upgrade, origin check, and JSON-RPC 2.0
//! dispatch over text frames. Mirrors the teacher's `ws_*_handler` split
//! (upgrade handler + a `handle_*_ws` loop taking the socket by value), but
//! the loop here spawns one task per inbound frame per SPEC_FULL §5 rather
//! than handling each message inline, so a slow RPC never blocks the read
//! side of the connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use balancer_core::config::PING_PERIOD_MS;
use balancer_protocol::envelope::{self, Response as RpcResponse, METHOD_ERROR, METHOD_NOT_FOUND};
use balancer_protocol::methods::{
    LoginParams, LoginResult, LogoutParams, SubscribeParams, UnsubscribeParams, METHOD_LOGIN, METHOD_LOGOUT,
    METHOD_SUBSCRIBE, METHOD_UNSUBSCRIBE,
};
use balancer_protocol::MAX_FRAME_BYTES;

use crate::state::AppState;

/// `GET /ws` — upgrades after an optional `Origin` check.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    if let Some(expected) = state.inner.config.allowed_origin.as_deref() {
        let origin = headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok());
        if origin != Some(expected) {
            tracing::warn!(%addr, origin = ?origin, "websocket upgrade rejected: origin mismatch");
            state.inner.counters.count_w_reject();
            return StatusCode::FORBIDDEN.into_response();
        }
    }
    state.inner.counters.count_w_upgrade();
    ws.on_upgrade(move |socket| handle_session(socket, state, addr))
}

/// The wallet-id a session has logged in as, if any.
struct SessionState {
    wallet_id: Option<String>,
}

async fn handle_session(socket: WebSocket, state: AppState, addr: SocketAddr) {
    state.inner.counters.count_w_connect();
    tracing::info!(%addr, "wallet client connected");

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Server-driven liveness ping, mirroring melody's PingPeriod: the client's
    // answering Pong is what keeps this session's endpoint alive (§4.4).
    let ping_tx = out_tx.clone();
    let ping_task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(PING_PERIOD_MS));
        tick.tick().await; // first tick is immediate
        loop {
            tick.tick().await;
            if ping_tx.send(Message::Ping(Vec::new())).await.is_err() {
                return;
            }
        }
    });

    let session = Arc::new(StdMutex::new(SessionState { wallet_id: None }));

    while let Some(next) = stream.next().await {
        let frame = match next {
            Ok(Message::Text(text)) => text.as_bytes().to_vec(),
            Ok(Message::Binary(bytes)) => bytes.to_vec(),
            Ok(Message::Pong(_)) => {
                let wallet_id = session.lock().unwrap().wallet_id.clone();
                if let Some(wallet_id) = wallet_id {
                    if let Err(e) = state.inner.dispatcher.mark_alive(&wallet_id).await {
                        tracing::debug!(wallet_id, error = %e, "pong alive for unknown endpoint");
                    }
                }
                continue;
            }
            Ok(Message::Ping(data)) => {
                let _ = out_tx.send(Message::Pong(data)).await;
                continue;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        if frame.len() > MAX_FRAME_BYTES {
            let _ = out_tx
                .send(Message::Text(
                    RpcResponse::err(Value::Null, envelope::INVALID_REQUEST, "frame too large").to_json().into(),
                ))
                .await;
            continue;
        }

        let state = state.clone();
        let out_tx = out_tx.clone();
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let reply = dispatch(&state, &session, &frame).await;
            let _ = out_tx.send(Message::Text(reply.into())).await;
        });
    }

    ping_task.abort();
    drop(out_tx);
    let _ = writer.await;

    if let Some(wallet_id) = session.lock().unwrap().wallet_id.take() {
        if let Err(e) = state.inner.dispatcher.logout(&wallet_id).await {
            tracing::debug!(wallet_id, error = %e, "logout on disconnect found no endpoint");
        }
    }

    state.inner.counters.count_w_disconnect();
    tracing::info!(%addr, "wallet client disconnected");
}

async fn dispatch(state: &AppState, session: &Arc<StdMutex<SessionState>>, raw: &[u8]) -> String {
    let request = match envelope::parse(raw) {
        Ok(req) => req,
        Err(resp) => return resp.to_json(),
    };

    let id = request.id.clone();
    let result = match request.method.as_str() {
        METHOD_LOGIN => handle_login(state, session, request.params).await,
        METHOD_LOGOUT => handle_logout(state, session, request.params).await,
        METHOD_SUBSCRIBE => handle_subscribe(state, request.params).await,
        METHOD_UNSUBSCRIBE => handle_unsubscribe(state, request.params).await,
        other => {
            state.inner.counters.count_w_bad_method();
            tracing::debug!(method = other, "unrecognised wallet rpc method");
            Err((METHOD_NOT_FOUND, format!("unknown method {other}")))
        }
    };

    match result {
        Ok(value) => RpcResponse::ok(id, value).to_json(),
        Err((code, message)) => {
            if code == METHOD_ERROR {
                state.inner.counters.count_w_error();
            }
            RpcResponse::err(id, code, message).to_json()
        }
    }
}

async fn handle_login(state: &AppState, session: &Arc<StdMutex<SessionState>>, params: Value) -> Result<Value, (i64, String)> {
    let params: LoginParams = serde_json::from_value(params).map_err(|e| (METHOD_ERROR, e.to_string()))?;
    if session.lock().unwrap().wallet_id.is_some() {
        return Err((METHOD_ERROR, "session already logged in".to_string()));
    }

    let endpoint = state
        .inner
        .dispatcher
        .login(&params.wallet_id)
        .await
        .map_err(|e| (METHOD_ERROR, e.to_string()))?;

    session.lock().unwrap().wallet_id = Some(params.wallet_id);
    state.inner.counters.count_login();
    Ok(serde_json::to_value(LoginResult { endpoint }).expect("LoginResult always serializes"))
}

async fn handle_logout(state: &AppState, session: &Arc<StdMutex<SessionState>>, params: Value) -> Result<Value, (i64, String)> {
    let params: LogoutParams = serde_json::from_value(params).map_err(|e| (METHOD_ERROR, e.to_string()))?;

    let current = session.lock().unwrap().wallet_id.clone();
    if current.as_deref() != Some(params.wallet_id.as_str()) {
        return Err((METHOD_ERROR, "wallet id does not match this session".to_string()));
    }

    state.inner.dispatcher.logout(&params.wallet_id).await.map_err(|e| (METHOD_ERROR, e.to_string()))?;
    session.lock().unwrap().wallet_id = None;
    state.inner.counters.count_logout();
    Ok(json!({}))
}

async fn handle_subscribe(state: &AppState, params: Value) -> Result<Value, (i64, String)> {
    let Some(pipeline) = state.inner.sbbs_pipeline.as_ref() else {
        return Err((METHOD_ERROR, "sbbs pipeline is disabled".to_string()));
    };
    let params: SubscribeParams = serde_json::from_value(params).map_err(|e| (METHOD_ERROR, e.to_string()))?;
    pipeline.subscribe(params).await.map_err(|e| (METHOD_ERROR, e.to_string()))?;
    state.inner.counters.count_subscribe();
    Ok(json!({}))
}

async fn handle_unsubscribe(state: &AppState, params: Value) -> Result<Value, (i64, String)> {
    let Some(pipeline) = state.inner.sbbs_pipeline.as_ref() else {
        return Err((METHOD_ERROR, "sbbs pipeline is disabled".to_string()));
    };
    let params: UnsubscribeParams = serde_json::from_value(params).map_err(|e| (METHOD_ERROR, e.to_string()))?;
    pipeline.unsubscribe(params).await.map_err(|e| (METHOD_ERROR, e.to_string()))?;
    state.inner.counters.count_unsubscribe();
    Ok(serde_json::to_value(balancer_protocol::methods::UnsubResult { unsubscribe: true }).expect("UnsubResult always serializes"))
}
