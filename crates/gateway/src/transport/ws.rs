// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-facing WebSocket endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;

use crate::bridge;
use crate::state::GatewayState;

/// `GET /ws` — WebSocket upgrade for a bridged client session.
pub async fn ws_handler(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let summary = request_summary(addr, &headers);
    ws.on_upgrade(move |socket| bridge::run_bridge(socket, state, summary))
}

/// Identifying summary used to tag every log line for one connection.
fn request_summary(addr: SocketAddr, headers: &HeaderMap) -> String {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    format!("{addr} ({user_agent})")
}
