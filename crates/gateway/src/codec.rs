// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire codec: decodes browser/backend JSON messages and classifies them
//! for the interceptor chain.

use serde_json::Value;

pub type JsonMap = serde_json::Map<String, Value>;

/// Decode a raw message into a JSON object.
///
/// Returns `None` for non-JSON payloads and for JSON values that are not
/// objects. Interception only ever applies to object-shaped messages; anything
/// else is relayed untouched by the caller.
pub fn decode_object(raw: &str) -> Option<JsonMap> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// The four bundle deployment operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOp {
    Import,
    Watch,
    Next,
    Status,
}

/// A browser-originated message, classified by its `Type`/`Request` markers.
///
/// Classification is mutually exclusive by construction: each message maps to
/// exactly one variant, so the interceptor chain is a single `match` instead
/// of repeated shape probing.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// `Type: ChangeSet, Request: GetChanges`.
    ChangeSet { request_id: Option<Value>, params: JsonMap },
    /// `Type: Deployer` with one of the four operation requests.
    Deployment { request_id: Option<Value>, op: DeployOp, params: JsonMap },
    /// `Type: Admin, Request: Login` — a credential login.
    Login { request_id: Option<Value>, params: JsonMap },
    /// `Type: GUIToken, Request: Login` — login via a previously minted token.
    TokenLogin { request_id: Option<Value>, params: JsonMap },
    /// `Type: GUIToken, Request: Create` — mint a new token.
    TokenCreate { request_id: Option<Value> },
    /// Anything else: relayed to the backend without interception.
    Opaque,
}

/// Classify a decoded message.
pub fn classify(data: &JsonMap) -> Inbound {
    let kind = data.get("Type").and_then(Value::as_str).unwrap_or_default();
    let request = data.get("Request").and_then(Value::as_str).unwrap_or_default();
    let request_id = data.get("RequestId").cloned();
    let params = params_of(data);

    match (kind, request) {
        ("ChangeSet", "GetChanges") => Inbound::ChangeSet { request_id, params },
        ("Deployer", "Import") => deployment(request_id, DeployOp::Import, params),
        ("Deployer", "Watch") => deployment(request_id, DeployOp::Watch, params),
        ("Deployer", "Next") => deployment(request_id, DeployOp::Next, params),
        ("Deployer", "Status") => deployment(request_id, DeployOp::Status, params),
        ("Admin", "Login") => Inbound::Login { request_id, params },
        ("GUIToken", "Login") => Inbound::TokenLogin { request_id, params },
        ("GUIToken", "Create") => Inbound::TokenCreate { request_id },
        _ => Inbound::Opaque,
    }
}

fn deployment(request_id: Option<Value>, op: DeployOp, params: JsonMap) -> Inbound {
    Inbound::Deployment { request_id, op, params }
}

fn params_of(data: &JsonMap) -> JsonMap {
    match data.get("Params") {
        Some(Value::Object(map)) => map.clone(),
        _ => JsonMap::new(),
    }
}

/// Build a success envelope: `{RequestId, Response: payload}`.
///
/// Every locally produced reply carries exactly one of `Response`/`Error` at
/// the top level, never both.
pub fn response_envelope(request_id: Option<&Value>, payload: Value) -> Value {
    let mut map = JsonMap::new();
    if let Some(id) = request_id {
        map.insert("RequestId".to_owned(), id.clone());
    }
    map.insert("Response".to_owned(), payload);
    Value::Object(map)
}

/// Build an error envelope: `{RequestId, Error: message}`.
pub fn error_envelope(request_id: Option<&Value>, message: impl Into<String>) -> Value {
    let mut map = JsonMap::new();
    if let Some(id) = request_id {
        map.insert("RequestId".to_owned(), id.clone());
    }
    map.insert("Error".to_owned(), Value::String(message.into()));
    Value::Object(map)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod codec_tests;
