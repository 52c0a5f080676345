// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection bridge: relays messages between one browser WebSocket and one
//! backend WebSocket, applying the interceptor chain to browser-originated
//! messages.
//!
//! Lifecycle per connection: while the backend link is still connecting,
//! unconsumed browser messages are queued; on connect the queue drains FIFO
//! before direct flow begins. A browser close never cancels an unresolved
//! connect attempt — the bridge waits for it and then closes the backend
//! immediately. An unexpected backend close tears the browser side down.

pub mod writer;

use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as BackendMessage;

use crate::auth::{AuthInterceptor, SessionUser};
use crate::bridge::writer::ClientWriter;
use crate::bundles;
use crate::bundles::deployer::Deployer;
use crate::changeset;
use crate::codec::{self, Inbound};
use crate::state::GatewayState;
use crate::tokens::{self, TokenStore};

/// The interceptor chain for one connection.
///
/// Dispatch order gives each interceptor first refusal: ChangeSet →
/// Deployment → Auth (only while unauthenticated) → Token. The first claimant
/// owns the response and forwarding is skipped; unclaimed messages are
/// returned for relay, possibly rewritten by the auth path.
pub struct Interceptors {
    user: Arc<SessionUser>,
    auth: AuthInterceptor,
    tokens: Arc<TokenStore>,
    deployer: Arc<dyn Deployer>,
    writer: ClientWriter,
}

impl Interceptors {
    pub fn new(state: &GatewayState, writer: ClientWriter) -> Self {
        let user = Arc::new(SessionUser::new());
        let auth = AuthInterceptor::new(Arc::clone(&user), Arc::clone(&state.tokens));
        Self {
            user,
            auth,
            tokens: Arc::clone(&state.tokens),
            deployer: Arc::clone(&state.deployer),
            writer,
        }
    }

    /// Offer a browser-originated message to the chain.
    ///
    /// Returns the message to forward to the backend, or `None` when an
    /// interceptor consumed it. Messages that fail to decode as JSON objects
    /// match nothing and are relayed untouched.
    pub fn handle_client_message(&mut self, raw: String) -> Option<String> {
        let Some(data) = codec::decode_object(&raw) else {
            return Some(raw);
        };
        match codec::classify(&data) {
            Inbound::ChangeSet { request_id, params } => {
                self.writer.send_value(&changeset::process_request(request_id.as_ref(), &params));
                None
            }
            Inbound::Deployment { request_id, op, params } => {
                tokio::spawn(bundles::handle_request(
                    op,
                    request_id,
                    params,
                    Arc::clone(&self.user),
                    Arc::clone(&self.deployer),
                    self.writer.clone(),
                ));
                None
            }
            Inbound::Login { request_id, params } if !self.user.is_authenticated() => {
                self.auth.process_login(request_id, &params, raw)
            }
            Inbound::TokenLogin { request_id, params } if !self.user.is_authenticated() => {
                self.auth.process_token_login(request_id, &params, &self.writer)
            }
            Inbound::TokenCreate { request_id } => {
                tokens::process_token_request(
                    &self.tokens,
                    request_id.as_ref(),
                    &self.user,
                    &self.writer,
                );
                None
            }
            // Auth-shaped messages from an authenticated user, and everything
            // unrecognized, pass through unmodified.
            _ => Some(raw),
        }
    }

    /// Transform a backend-originated message before relay.
    ///
    /// Only consulted content-wise while an auth handshake is in flight;
    /// otherwise (and for undecodable payloads) the message is returned
    /// verbatim.
    pub fn handle_backend_message(&mut self, raw: String) -> String {
        if !self.auth.in_progress() {
            return raw;
        }
        let Some(data) = codec::decode_object(&raw) else {
            return raw;
        };
        let transformed = self.auth.process_response(data);
        match serde_json::to_string(&transformed) {
            Ok(text) => text,
            Err(_) => raw,
        }
    }

    #[cfg(test)]
    pub(crate) fn auth_in_progress(&self) -> bool {
        self.auth.in_progress()
    }

    #[cfg(test)]
    pub(crate) fn user(&self) -> &Arc<SessionUser> {
        &self.user
    }
}

/// Run one bridged session to completion.
pub async fn run_bridge(socket: WebSocket, state: Arc<GatewayState>, summary: String) {
    tracing::info!(conn = %summary, "client connected");

    let (browser_sink, mut browser_rx) = socket.split();
    let writer = ClientWriter::spawn(browser_sink);
    let mut chain = Interceptors::new(&state, writer.clone());

    // CONNECTING_BACKEND: buffer unconsumed browser messages until the
    // backend link resolves.
    let connect = tokio_tungstenite::connect_async(state.config.api_url.clone());
    let mut connect = std::pin::pin!(connect);
    let mut pending: VecDeque<BackendMessage> = VecDeque::new();
    let mut browser_open = true;

    let connected = loop {
        tokio::select! {
            conn = &mut connect => break conn,
            msg = browser_rx.next(), if browser_open => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(forward) = chain.handle_client_message(text.to_string()) {
                        tracing::debug!(conn = %summary, "client -> queue: {forward}");
                        pending.push_back(BackendMessage::Text(forward.into()));
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    pending.push_back(BackendMessage::Binary(data));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(conn = %summary, err = %err, "browser read error");
                    browser_open = false;
                }
                None => browser_open = false,
            },
        }
    };

    let backend = match connected {
        Ok((ws, _)) => ws,
        Err(err) => {
            // DEGRADED_BACKEND: tell the browser instead of leaving it
            // silently half-open, then close.
            tracing::error!(conn = %summary, err = %err, "unable to connect to the backend API");
            if browser_open {
                writer.send_value(&codec::error_envelope(None, "backend connection failed"));
                writer.close();
            }
            return;
        }
    };
    tracing::info!(conn = %summary, "backend API connected");

    let (mut backend_tx, mut backend_rx) = backend.split();

    if !browser_open {
        // The browser left while the connect attempt was in flight; the
        // attempt has now resolved, so close the backend immediately.
        let _ = backend_tx.send(BackendMessage::Close(None)).await;
        return;
    }

    // ACTIVE: drain the queue in arrival order before any new message flows.
    while let Some(msg) = pending.pop_front() {
        tracing::debug!(conn = %summary, "queue -> backend");
        if backend_tx.send(msg).await.is_err() {
            tracing::error!(conn = %summary, "backend API closed during queue drain");
            writer.close();
            return;
        }
    }

    loop {
        tokio::select! {
            msg = browser_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(forward) = chain.handle_client_message(text.to_string()) {
                        tracing::debug!(conn = %summary, "client -> backend: {forward}");
                        if backend_tx.send(BackendMessage::Text(forward.into())).await.is_err() {
                            tracing::error!(conn = %summary, "backend API write failed");
                            writer.close();
                            break;
                        }
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if backend_tx.send(BackendMessage::Binary(data)).await.is_err() {
                        tracing::error!(conn = %summary, "backend API write failed");
                        writer.close();
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(conn = %summary, err = %err, "browser read error");
                    let _ = backend_tx.send(BackendMessage::Close(None)).await;
                    break;
                }
                None => {
                    let _ = backend_tx.send(BackendMessage::Close(None)).await;
                    break;
                }
            },
            msg = backend_rx.next() => match msg {
                Some(Ok(BackendMessage::Text(text))) => {
                    let out = chain.handle_backend_message(text.to_string());
                    tracing::debug!(conn = %summary, "backend -> client: {out}");
                    writer.send_text(out);
                }
                Some(Ok(BackendMessage::Binary(data))) => {
                    writer.send_binary(data);
                }
                Some(Ok(BackendMessage::Close(_))) | None => {
                    // A backend disconnect while the browser is still open is
                    // an anomaly; there is no reconnection, so drop the
                    // browser too.
                    tracing::error!(conn = %summary, "backend API unexpectedly disconnected");
                    writer.close();
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::error!(conn = %summary, err = %err, "backend API read error");
                    writer.close();
                    break;
                }
            },
        }
    }
    tracing::info!(conn = %summary, "client connection closed");
}
