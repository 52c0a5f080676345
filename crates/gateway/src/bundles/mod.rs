// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bundle deployment operations.
//!
//! The four request kinds (`Import`, `Watch`, `Next`, `Status`) mimic a
//! request/response paradigm over the bridged socket: each produces exactly
//! one envelope with either `Response` or `Error`. All of them require an
//! authenticated user, enforced by an explicit guard before any deployer
//! call.

pub mod deployer;
pub mod feed;

use std::sync::Arc;

use serde_json::{json, Value};

use crate::auth::SessionUser;
use crate::bridge::writer::ClientWriter;
use crate::bundles::deployer::Deployer;
use crate::codec::{error_envelope, response_envelope, DeployOp, JsonMap};

/// Handle one deployment request end to end, writing the reply through the
/// given writer. Runs as its own task so a suspended `Next` never blocks the
/// connection's relay loop.
pub async fn handle_request(
    op: DeployOp,
    request_id: Option<Value>,
    params: JsonMap,
    user: Arc<SessionUser>,
    deployer: Arc<dyn Deployer>,
    writer: ClientWriter,
) {
    // Guard composed at dispatch: unauthenticated requests fail here and
    // never reach the deployer.
    if !user.is_authenticated() {
        writer.send_value(&error_envelope(
            request_id.as_ref(),
            "unauthorized access: no user logged in",
        ));
        return;
    }
    let reply = match op {
        DeployOp::Import => import_bundle(request_id.as_ref(), &params, &user, &*deployer).await,
        DeployOp::Watch => watch(request_id.as_ref(), &params, &*deployer),
        DeployOp::Next => next(request_id.as_ref(), &params, &*deployer).await,
        DeployOp::Status => status(request_id.as_ref(), &*deployer),
    };
    writer.send_value(&reply);
}

/// Parse import params into the named bundle document.
fn validate_import_params(params: &JsonMap) -> Result<(String, serde_yaml::Value), String> {
    let name = params.get("Name").and_then(Value::as_str).unwrap_or_default();
    let contents = params.get("YAML").and_then(Value::as_str).unwrap_or_default();
    if name.is_empty() || contents.is_empty() {
        return Err("invalid data parameters".to_owned());
    }
    let bundles: serde_yaml::Value =
        serde_yaml::from_str(contents).map_err(|err| format!("invalid YAML contents: {err}"))?;
    let bundle = bundles.get(name).cloned().ok_or_else(|| "bundle not found".to_owned())?;
    Ok((name.to_owned(), bundle))
}

/// Start or schedule a bundle deployment.
async fn import_bundle(
    request_id: Option<&Value>,
    params: &JsonMap,
    user: &SessionUser,
    deployer: &dyn Deployer,
) -> Value {
    let (name, bundle) = match validate_import_params(params) {
        Ok(parsed) => parsed,
        Err(err) => return error_envelope(request_id, format!("invalid request: {err}")),
    };
    if let Some(err) = deployer.validate(user, &name, &bundle).await {
        return error_envelope(request_id, err);
    }
    let deployment_id = deployer.import_bundle(user, &name, bundle);
    response_envelope(request_id, json!({"DeploymentId": deployment_id}))
}

/// Subscribe to a deployment's progress.
fn watch(request_id: Option<&Value>, params: &JsonMap, deployer: &dyn Deployer) -> Value {
    let Some(deployment_id) = params.get("DeploymentId").and_then(Value::as_str) else {
        return error_envelope(request_id, "invalid request: invalid data parameters");
    };
    match deployer.watch(deployment_id) {
        Some(watcher_id) => response_envelope(request_id, json!({"WatcherId": watcher_id})),
        None => error_envelope(request_id, "invalid request: deployment not found"),
    }
}

/// Long-poll for unseen changes on a watcher.
async fn next(request_id: Option<&Value>, params: &JsonMap, deployer: &dyn Deployer) -> Value {
    let Some(watcher_id) = params.get("WatcherId").and_then(Value::as_str) else {
        return error_envelope(request_id, "invalid request: invalid data parameters");
    };
    match deployer.next(watcher_id).await {
        Some(changes) => response_envelope(request_id, json!({"Changes": changes})),
        None => error_envelope(request_id, "invalid request: invalid watcher identifier"),
    }
}

/// Snapshot of the last change of every deployment.
fn status(request_id: Option<&Value>, deployer: &dyn Deployer) -> Value {
    response_envelope(request_id, json!({"LastChanges": deployer.status()}))
}

#[cfg(test)]
#[path = "ops_tests.rs"]
mod ops_tests;
