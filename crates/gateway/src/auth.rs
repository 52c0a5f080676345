// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication interception for bridged connections.
//!
//! Credential logins are forwarded to the backend and the in-flight handshake
//! tracked so the matching response can flip the per-connection auth state.
//! Token logins are rewritten into credential logins using the process-wide
//! token store before forwarding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{json, Value};

use crate::bridge::writer::ClientWriter;
use crate::codec::{error_envelope, JsonMap};
use crate::tokens::TokenStore;

/// Credentials extracted from a login request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Per-connection user state.
///
/// Shared by reference between one bridge and its interceptors, never across
/// connections. Mutated exclusively by the auth path on successful login.
pub struct SessionUser {
    authenticated: AtomicBool,
    credentials: Mutex<Option<Credentials>>,
}

impl SessionUser {
    pub fn new() -> Self {
        Self { authenticated: AtomicBool::new(false), credentials: Mutex::new(None) }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Record a successful login.
    pub fn set_authenticated(&self, credentials: Credentials) {
        let mut guard = self.credentials.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(credentials);
        self.authenticated.store(true, Ordering::SeqCst);
    }

    /// The credentials of an authenticated user, `None` before login.
    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Default for SessionUser {
    fn default() -> Self {
        Self::new()
    }
}

/// Login message shapes of the orchestration API.
///
/// Knows how credentials are carried in a login request, how to build a login
/// request from stored credentials, and what a successful login response
/// looks like.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthBackend;

impl AuthBackend {
    /// Pull credentials out of login request params.
    pub fn extract_credentials(&self, params: &JsonMap) -> Option<Credentials> {
        let username = params.get("AuthTag").and_then(Value::as_str)?;
        let password = params.get("Password").and_then(Value::as_str)?;
        Some(Credentials { username: username.to_owned(), password: password.to_owned() })
    }

    /// Build a login request carrying the given credentials.
    pub fn make_login(&self, request_id: Option<&Value>, credentials: &Credentials) -> Value {
        let mut map = JsonMap::new();
        if let Some(id) = request_id {
            map.insert("RequestId".to_owned(), id.clone());
        }
        map.insert("Type".to_owned(), json!("Admin"));
        map.insert("Request".to_owned(), json!("Login"));
        map.insert(
            "Params".to_owned(),
            json!({"AuthTag": credentials.username, "Password": credentials.password}),
        );
        Value::Object(map)
    }

    /// A login response without an `Error` key means the backend accepted it.
    pub fn login_succeeded(&self, data: &JsonMap) -> bool {
        !data.contains_key("Error")
    }
}

struct PendingLogin {
    request_id: Option<Value>,
    credentials: Credentials,
    via_token: bool,
}

/// Tracks one connection's login handshake with the backend.
pub struct AuthInterceptor {
    user: Arc<SessionUser>,
    tokens: Arc<TokenStore>,
    backend: AuthBackend,
    pending: Option<PendingLogin>,
}

impl AuthInterceptor {
    pub fn new(user: Arc<SessionUser>, tokens: Arc<TokenStore>) -> Self {
        Self { user, tokens, backend: AuthBackend, pending: None }
    }

    /// True while a login round trip with the backend is outstanding.
    pub fn in_progress(&self) -> bool {
        self.pending.is_some()
    }

    /// Handle a credential login request.
    ///
    /// The message is forwarded to the backend unchanged; the handshake is
    /// recorded so the response can be matched. Requests missing credential
    /// fields are not a handshake and pass through untouched.
    pub fn process_login(
        &mut self,
        request_id: Option<Value>,
        params: &JsonMap,
        raw: String,
    ) -> Option<String> {
        let Some(credentials) = self.backend.extract_credentials(params) else {
            return Some(raw);
        };
        self.pending = Some(PendingLogin { request_id, credentials, via_token: false });
        Some(raw)
    }

    /// Handle a token login request.
    ///
    /// A valid token is exchanged for its stored credentials and the message
    /// rewritten into a credential login (same RequestId) before forwarding.
    /// Unknown, already redeemed, or expired tokens are answered directly
    /// with an error and never reach the backend.
    pub fn process_token_login(
        &mut self,
        request_id: Option<Value>,
        params: &JsonMap,
        writer: &ClientWriter,
    ) -> Option<String> {
        let token = params.get("Token").and_then(Value::as_str).unwrap_or_default();
        let Some(credentials) = self.tokens.take(token) else {
            writer.send_value(&error_envelope(
                request_id.as_ref(),
                "unknown, fulfilled, or expired token",
            ));
            return None;
        };
        let rewritten = self.backend.make_login(request_id.as_ref(), &credentials);
        self.pending = Some(PendingLogin { request_id: request_id.clone(), credentials, via_token: true });
        match serde_json::to_string(&rewritten) {
            Ok(text) => Some(text),
            Err(err) => {
                // Should be unreachable for a plain object; fail the login
                // rather than leaking the raw token to the backend.
                tracing::error!(err = %err, "failed to encode rewritten login");
                self.pending = None;
                writer.send_value(&error_envelope(request_id.as_ref(), "internal error"));
                None
            }
        }
    }

    /// Transform a backend message while a handshake is in flight.
    ///
    /// The response matching the pending RequestId resolves the handshake:
    /// on success the user is marked authenticated, and token logins get the
    /// redeemed credentials injected into the response payload so the client
    /// can store them. Non-matching messages are relayed untouched.
    pub fn process_response(&mut self, mut data: JsonMap) -> Value {
        let Some(pending) = self.pending.as_ref() else {
            return Value::Object(data);
        };
        if data.get("RequestId") != pending.request_id.as_ref() {
            return Value::Object(data);
        }
        if self.backend.login_succeeded(&data) {
            self.user.set_authenticated(pending.credentials.clone());
            if pending.via_token {
                let response =
                    data.entry("Response".to_owned()).or_insert_with(|| json!({}));
                if let Value::Object(map) = response {
                    map.insert("AuthTag".to_owned(), json!(pending.credentials.username));
                    map.insert("Password".to_owned(), json!(pending.credentials.password));
                }
            }
        }
        self.pending = None;
        Value::Object(data)
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod auth_tests;
