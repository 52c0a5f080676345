// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the opsgate gateway.
#[derive(Debug, Clone, clap::Parser)]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "OPSGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8888, env = "OPSGATE_PORT")]
    pub port: u16,

    /// WebSocket URL of the backend orchestration API.
    #[arg(long, default_value = "wss://127.0.0.1:17070/ws", env = "OPSGATE_API_URL")]
    pub api_url: String,

    /// Base URL of the content service (charm store assets).
    #[arg(long, default_value = "https://api.jujucharms.com", env = "OPSGATE_CONTENT_URL")]
    pub content_url: String,

    /// Authentication token lifetime in seconds.
    #[arg(long, default_value_t = 120, env = "OPSGATE_TOKEN_TTL_SECS")]
    pub token_ttl_secs: u64,
}

impl GatewayConfig {
    pub fn token_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.token_ttl_secs)
    }
}
