// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the gateway.

pub mod proxy;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::GatewayState;

/// Build the axum `Router` with all gateway routes.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        // Bridged WebSocket sessions
        .route("/ws", get(ws::ws_handler))
        // Server information
        .route("/gui-server-info", get(info))
        // HTTP proxies
        .route("/juju-core/{*path}", any(proxy::api_proxy))
        .route("/content/{*path}", any(proxy::content_proxy))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct InfoResponse {
    apiurl: String,
    version: String,
    uptime: u64,
    /// Always false: the gateway only ever talks to a real backend. Kept in
    /// the payload because clients read it.
    sandbox: bool,
    deployer: Vec<serde_json::Value>,
}

/// `GET /gui-server-info` — gateway status snapshot.
async fn info(State(state): State<Arc<GatewayState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        apiurl: state.config.api_url.clone(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        uptime: state.started_at.elapsed().as_secs(),
        sandbox: false,
        deployer: state.deployer.status(),
    })
}
