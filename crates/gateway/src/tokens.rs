// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide authentication token store.
//!
//! Tokens are short-lived re-authentication aids minted for an already
//! authenticated user and redeemed once to resume a session on a new
//! connection. The store is never persisted; tokens are lost on restart.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::auth::{Credentials, SessionUser};
use crate::bridge::writer::ClientWriter;
use crate::codec::{error_envelope, response_envelope};
use crate::state::epoch_secs;

struct TokenEntry {
    credentials: Credentials,
    expires_at: Instant,
}

/// A freshly minted token, with its reported lifetime in epoch seconds.
pub struct MintedToken {
    pub token: String,
    pub created: u64,
    pub expires: u64,
}

/// Shared token store. One instance per process, injected into every
/// connection; the single mutex makes insert-or-lookup atomic per key.
pub struct TokenStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, TokenEntry>>,
}

impl TokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Mint a new token bound to the given credentials.
    pub fn mint(&self, credentials: Credentials) -> MintedToken {
        let token = uuid::Uuid::new_v4().to_string();
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop anything already expired while we hold the lock.
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(token.clone(), TokenEntry { credentials, expires_at: now + self.ttl });
        let created = epoch_secs();
        MintedToken { token, created, expires: created + self.ttl.as_secs() }
    }

    /// Redeem a token, removing it from the store.
    ///
    /// Tokens are single use: a second redemption fails like an unknown
    /// token. Expired entries are rejected even if still present.
    pub fn take(&self, token: &str) -> Option<Credentials> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.remove(token)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.credentials)
    }
}

/// Handle a token creation request, writing the response directly.
///
/// Only authenticated users may mint tokens; the request never reaches the
/// backend either way.
pub fn process_token_request(
    store: &TokenStore,
    request_id: Option<&Value>,
    user: &SessionUser,
    writer: &ClientWriter,
) {
    let Some(credentials) = user.credentials() else {
        writer.send_value(&error_envelope(
            request_id,
            "tokens can only be created by authenticated users",
        ));
        return;
    };
    let minted = store.mint(credentials);
    writer.send_value(&response_envelope(
        request_id,
        json!({
            "Token": minted.token,
            "Created": minted.created,
            "Expires": minted.expires,
        }),
    ));
}

#[cfg(test)]
#[path = "tokens_tests.rs"]
mod tokens_tests;
