// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Change set computation: answers "what would change" for a bundle document
//! without touching the backend. Pure and synchronous.

use serde_json::{json, Value};
use serde_yaml::Mapping;

use crate::codec::{error_envelope, response_envelope, JsonMap};

/// Handle a `GetChanges` request and return the full response envelope.
pub fn process_request(request_id: Option<&Value>, params: &JsonMap) -> Value {
    let Some(contents) = params.get("YAML").and_then(Value::as_str) else {
        return error_envelope(request_id, "invalid request: invalid data parameters");
    };
    let bundle: serde_yaml::Value = match serde_yaml::from_str(contents) {
        Ok(value) => value,
        Err(err) => {
            return error_envelope(request_id, format!("invalid request: invalid YAML contents: {err}"));
        }
    };
    let Some(bundle) = bundle.as_mapping() else {
        return error_envelope(request_id, "invalid request: invalid YAML contents: not a bundle document");
    };
    response_envelope(request_id, json!({"Changes": build_changes(bundle)}))
}

/// Compute the ordered change list for a bundle.
///
/// For each service (document order): an `addCharm` change, a `deploy` change
/// requiring it, and one `addUnit` per requested unit. Relations follow as
/// `addRelation` changes requiring the deploys of both endpoints. Change ids
/// share one running counter.
pub fn build_changes(bundle: &Mapping) -> Vec<Value> {
    let mut changes = Vec::new();
    let mut counter = 0usize;
    let mut deploy_ids: Vec<(String, String)> = Vec::new();

    let empty = Mapping::new();
    let services =
        bundle.get("services").and_then(serde_yaml::Value::as_mapping).unwrap_or(&empty);

    for (name, service) in services {
        let Some(name) = name.as_str() else { continue };
        let charm = service
            .get("charm")
            .and_then(serde_yaml::Value::as_str)
            .unwrap_or(name)
            .to_owned();

        let charm_id = format!("addCharm-{counter}");
        counter += 1;
        changes.push(json!({
            "id": charm_id.clone(),
            "method": "addCharm",
            "args": [charm.clone()],
            "requires": [],
        }));

        let deploy_id = format!("deploy-{counter}");
        counter += 1;
        let options = service
            .get("options")
            .and_then(|v| serde_json::to_value(v).ok())
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}));
        changes.push(json!({
            "id": deploy_id.clone(),
            "method": "deploy",
            "args": [charm, name, options],
            "requires": [charm_id],
        }));

        let num_units = service
            .get("num_units")
            .and_then(serde_yaml::Value::as_u64)
            .unwrap_or(1);
        for _ in 0..num_units {
            let unit_id = format!("addUnit-{counter}");
            counter += 1;
            changes.push(json!({
                "id": unit_id,
                "method": "addUnit",
                "args": [name, 1],
                "requires": [deploy_id.clone()],
            }));
        }
        deploy_ids.push((name.to_owned(), deploy_id));
    }

    let relations = bundle.get("relations").and_then(serde_yaml::Value::as_sequence);
    for pair in relations.into_iter().flatten() {
        let Some(pair) = pair.as_sequence() else { continue };
        let endpoints: Vec<&str> = pair.iter().filter_map(serde_yaml::Value::as_str).collect();
        let [first, second] = endpoints[..] else { continue };
        let requires: Vec<&str> = deploy_ids
            .iter()
            .filter(|(name, _)| {
                service_of(first) == name.as_str() || service_of(second) == name.as_str()
            })
            .map(|(_, id)| id.as_str())
            .collect();
        changes.push(json!({
            "id": format!("addRelation-{counter}"),
            "method": "addRelation",
            "args": [first, second],
            "requires": requires,
        }));
        counter += 1;
    }

    changes
}

/// The service part of a `service:interface` relation endpoint.
fn service_of(endpoint: &str) -> &str {
    endpoint.split(':').next().unwrap_or(endpoint)
}

#[cfg(test)]
#[path = "changeset_tests.rs"]
mod changeset_tests;
