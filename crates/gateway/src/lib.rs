// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opsgate: gateway between browser clients and an orchestration API server.
//!
//! Bridges WebSocket sessions with local interception for authentication,
//! token exchange, change set queries and bundle deployments, and proxies
//! plain HTTP(S) to the backend API and the content service.

pub mod auth;
pub mod bridge;
pub mod bundles;
pub mod changeset;
pub mod codec;
pub mod config;
pub mod state;
pub mod tokens;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::bundles::deployer::BundleDeployer;
use crate::config::GatewayConfig;
use crate::state::GatewayState;
use crate::transport::build_router;

/// Run the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let deployer = Arc::new(BundleDeployer::new());
    let state = Arc::new(GatewayState::new(config, deployer, shutdown.clone()));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    tracing::info!("opsgate listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}
