// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::bundles::deployer::Deployer;
use crate::config::GatewayConfig;
use crate::tokens::TokenStore;

/// Shared gateway state, created once at startup and injected into every
/// connection and handler.
pub struct GatewayState {
    pub config: GatewayConfig,
    /// The only resource shared across connections.
    pub tokens: Arc<TokenStore>,
    pub deployer: Arc<dyn Deployer>,
    /// Client for the backend HTTP API. Backend certificates are not
    /// validated: the gateway has no way to obtain its CA certificates.
    pub api_client: reqwest::Client,
    /// Client for the content service.
    pub content_client: reqwest::Client,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        deployer: Arc<dyn Deployer>,
        shutdown: CancellationToken,
    ) -> Self {
        let tokens = Arc::new(TokenStore::new(config.token_ttl()));
        let api_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        let content_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            config,
            tokens,
            deployer,
            api_client,
            content_client,
            started_at: Instant::now(),
            shutdown,
        }
    }

    /// HTTP base URL of the backend API, derived from the WebSocket URL.
    pub fn api_http_base(&self) -> String {
        http_from_ws(&self.config.api_url)
    }

    /// Fallback icon served when a charm has none of its own.
    pub fn fallback_icon_url(&self) -> String {
        let base = self.config.content_url.trim_end_matches('/');
        format!("{base}/static/img/charm_160.svg")
    }
}

/// Convert a ws(s) URL to its http(s) equivalent, dropping any path.
fn http_from_ws(ws_url: &str) -> String {
    let http = if ws_url.starts_with("wss://") {
        ws_url.replacen("wss://", "https://", 1)
    } else {
        ws_url.replacen("ws://", "http://", 1)
    };
    // Keep scheme://host[:port] only; the proxy appends its own paths.
    match http.find("://") {
        Some(idx) => match http[idx + 3..].find('/') {
            Some(path_idx) => http[..idx + 3 + path_idx].to_owned(),
            None => http,
        },
        None => http,
    }
}

/// Return current epoch seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
