// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use crate::auth::Credentials;
use crate::bundles::deployer::{BundleDeployer, Changes};
use crate::codec::DeployOp;

const WAIT: Duration = Duration::from_secs(2);

const BUNDLES_YAML: &str = "\
wordpress:
  services:
    blog:
      charm: cs:precise/wordpress-15
      num_units: 1
";

/// Deployer double recording whether validation was reached.
#[derive(Default)]
struct MockDeployer {
    validate_called: AtomicBool,
    validate_error: Option<String>,
}

impl Deployer for MockDeployer {
    fn validate<'a>(
        &'a self,
        _user: &'a SessionUser,
        _name: &'a str,
        _bundle: &'a serde_yaml::Value,
    ) -> futures_util::future::BoxFuture<'a, Option<String>> {
        self.validate_called.store(true, Ordering::SeqCst);
        let result = self.validate_error.clone();
        Box::pin(async move { result })
    }

    fn import_bundle(&self, _user: &SessionUser, _name: &str, _bundle: serde_yaml::Value) -> String {
        "mock-deployment".to_owned()
    }

    fn watch(&self, _deployment_id: &str) -> Option<String> {
        None
    }

    fn next<'a>(&'a self, _watcher_id: &'a str) -> futures_util::future::BoxFuture<'a, Option<Changes>> {
        Box::pin(async { None })
    }

    fn status(&self) -> Changes {
        Vec::new()
    }
}

fn authenticated_user() -> Arc<SessionUser> {
    let user = Arc::new(SessionUser::new());
    user.set_authenticated(Credentials {
        username: "user-admin".to_owned(),
        password: "secret".to_owned(),
    });
    user
}

fn import_params(name: &str, yaml: &str) -> JsonMap {
    let mut params = JsonMap::new();
    params.insert("Name".to_owned(), json!(name));
    params.insert("YAML".to_owned(), json!(yaml));
    params
}

/// Run one operation and return the written reply.
async fn call(
    op: DeployOp,
    params: JsonMap,
    user: Arc<SessionUser>,
    deployer: Arc<dyn Deployer>,
) -> Value {
    let (writer, mut rx) = ClientWriter::channel();
    handle_request(op, Some(json!(1)), params, user, deployer, writer).await;
    let reply = match rx.try_recv() {
        Ok(axum::extract::ws::Message::Text(text)) => {
            serde_json::from_str(text.as_str()).unwrap()
        }
        other => panic!("expected a text frame, got {other:?}"),
    };
    assert_envelope(&reply);
    reply
}

/// Every locally produced reply carries exactly one of Response/Error.
fn assert_envelope(reply: &Value) {
    let has_response = reply.get("Response").is_some();
    let has_error = reply.get("Error").is_some();
    assert!(has_response != has_error, "bad envelope: {reply}");
}

// ── auth guard ────────────────────────────────────────────────────────

#[tokio::test]
async fn unauthenticated_import_never_reaches_the_deployer() {
    let deployer = Arc::new(MockDeployer::default());
    let reply = call(
        DeployOp::Import,
        import_params("wordpress", BUNDLES_YAML),
        Arc::new(SessionUser::new()),
        Arc::clone(&deployer) as Arc<dyn Deployer>,
    )
    .await;

    assert_eq!(reply["Error"], json!("unauthorized access: no user logged in"));
    assert!(!deployer.validate_called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn all_operations_require_authentication() {
    for op in [DeployOp::Import, DeployOp::Watch, DeployOp::Next, DeployOp::Status] {
        let reply = call(
            op,
            JsonMap::new(),
            Arc::new(SessionUser::new()),
            Arc::new(MockDeployer::default()),
        )
        .await;
        assert_eq!(reply["Error"], json!("unauthorized access: no user logged in"));
    }
}

// ── import ────────────────────────────────────────────────────────────

#[tokio::test]
async fn import_returns_unique_deployment_ids() {
    let deployer: Arc<dyn Deployer> = Arc::new(BundleDeployer::new());
    let user = authenticated_user();

    let first = call(
        DeployOp::Import,
        import_params("wordpress", BUNDLES_YAML),
        Arc::clone(&user),
        Arc::clone(&deployer),
    )
    .await;
    let second = call(
        DeployOp::Import,
        import_params("wordpress", BUNDLES_YAML),
        user,
        deployer,
    )
    .await;

    let first_id = first["Response"]["DeploymentId"].as_str().unwrap();
    let second_id = second["Response"]["DeploymentId"].as_str().unwrap();
    assert!(!first_id.is_empty());
    assert!(!second_id.is_empty());
    assert_ne!(first_id, second_id);
}

#[tokio::test]
async fn import_with_missing_params_fails() {
    let reply = call(
        DeployOp::Import,
        JsonMap::new(),
        authenticated_user(),
        Arc::new(BundleDeployer::new()),
    )
    .await;
    assert_eq!(reply["Error"], json!("invalid request: invalid data parameters"));
}

#[tokio::test]
async fn import_with_unparsable_yaml_fails() {
    let reply = call(
        DeployOp::Import,
        import_params("wordpress", "wordpress: [unclosed"),
        authenticated_user(),
        Arc::new(BundleDeployer::new()),
    )
    .await;
    let err = reply["Error"].as_str().unwrap();
    assert!(err.starts_with("invalid request: invalid YAML contents:"), "got: {err}");
}

#[tokio::test]
async fn import_with_unknown_bundle_name_fails() {
    let reply = call(
        DeployOp::Import,
        import_params("missing", "other:\n  services:\n    app: {}\n"),
        authenticated_user(),
        Arc::new(BundleDeployer::new()),
    )
    .await;
    assert_eq!(reply["Error"], json!("invalid request: bundle not found"));
}

#[tokio::test]
async fn validation_failures_surface_verbatim() {
    let deployer = Arc::new(MockDeployer {
        validate_called: AtomicBool::new(false),
        validate_error: Some("machine 42 not found".to_owned()),
    });
    let reply = call(
        DeployOp::Import,
        import_params("wordpress", BUNDLES_YAML),
        authenticated_user(),
        deployer,
    )
    .await;
    assert_eq!(reply["Error"], json!("machine 42 not found"));
}

#[tokio::test]
async fn structurally_invalid_bundle_fails_validation() {
    let reply = call(
        DeployOp::Import,
        import_params("empty", "empty:\n  description: no services\n"),
        authenticated_user(),
        Arc::new(BundleDeployer::new()),
    )
    .await;
    assert_eq!(reply["Error"], json!("invalid bundle: services not found"));
}

// ── watch ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn watch_with_missing_id_fails() {
    let reply = call(
        DeployOp::Watch,
        JsonMap::new(),
        authenticated_user(),
        Arc::new(BundleDeployer::new()),
    )
    .await;
    assert_eq!(reply["Error"], json!("invalid request: invalid data parameters"));
}

#[tokio::test]
async fn watch_with_unknown_deployment_fails() {
    let mut params = JsonMap::new();
    params.insert("DeploymentId".to_owned(), json!("does-not-exist"));
    let reply = call(
        DeployOp::Watch,
        params,
        authenticated_user(),
        Arc::new(BundleDeployer::new()),
    )
    .await;
    assert_eq!(reply["Error"], json!("invalid request: deployment not found"));
}

// ── next ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn next_with_invalid_watcher_fails() {
    let mut params = JsonMap::new();
    params.insert("WatcherId".to_owned(), json!("bogus"));
    let reply = call(
        DeployOp::Next,
        params,
        authenticated_user(),
        Arc::new(BundleDeployer::new()),
    )
    .await;
    assert_eq!(reply["Error"], json!("invalid request: invalid watcher identifier"));
}

#[tokio::test]
async fn watch_then_next_delivers_the_scheduled_change() {
    let deployer = Arc::new(BundleDeployer::new());
    let user = authenticated_user();

    let imported = call(
        DeployOp::Import,
        import_params("wordpress", BUNDLES_YAML),
        Arc::clone(&user),
        Arc::clone(&deployer) as Arc<dyn Deployer>,
    )
    .await;
    let deployment_id = imported["Response"]["DeploymentId"].as_str().unwrap().to_owned();

    let mut params = JsonMap::new();
    params.insert("DeploymentId".to_owned(), json!(deployment_id));
    let watched = call(
        DeployOp::Watch,
        params,
        Arc::clone(&user),
        Arc::clone(&deployer) as Arc<dyn Deployer>,
    )
    .await;
    let watcher_id = watched["Response"]["WatcherId"].as_str().unwrap().to_owned();

    let mut params = JsonMap::new();
    params.insert("WatcherId".to_owned(), json!(watcher_id));
    let reply = call(
        DeployOp::Next,
        params,
        user,
        Arc::clone(&deployer) as Arc<dyn Deployer>,
    )
    .await;
    let changes = reply["Response"]["Changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["Status"], json!("scheduled"));
    assert_eq!(changes[0]["DeploymentId"], json!(deployment_id));
}

#[tokio::test]
async fn next_suspends_until_the_deployer_posts_a_change() {
    let deployer = Arc::new(BundleDeployer::new());
    let user = authenticated_user();

    let imported = call(
        DeployOp::Import,
        import_params("wordpress", BUNDLES_YAML),
        Arc::clone(&user),
        Arc::clone(&deployer) as Arc<dyn Deployer>,
    )
    .await;
    let deployment_id = imported["Response"]["DeploymentId"].as_str().unwrap().to_owned();

    let mut params = JsonMap::new();
    params.insert("DeploymentId".to_owned(), json!(deployment_id));
    let watched = call(
        DeployOp::Watch,
        params,
        Arc::clone(&user),
        Arc::clone(&deployer) as Arc<dyn Deployer>,
    )
    .await;
    let watcher_id = watched["Response"]["WatcherId"].as_str().unwrap().to_owned();

    // Drain the scheduled change so the next call has to wait.
    let mut params = JsonMap::new();
    params.insert("WatcherId".to_owned(), json!(watcher_id.clone()));
    call(
        DeployOp::Next,
        params.clone(),
        Arc::clone(&user),
        Arc::clone(&deployer) as Arc<dyn Deployer>,
    )
    .await;

    let poster = Arc::clone(&deployer);
    let posted_id = deployment_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        poster.post_change(
            &posted_id,
            BundleDeployer::change_doc(&posted_id, "started", None),
        );
    });

    let reply = timeout(
        WAIT,
        call(DeployOp::Next, params, user, Arc::clone(&deployer) as Arc<dyn Deployer>),
    )
    .await
    .unwrap();
    let changes = reply["Response"]["Changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["Status"], json!("started"));
}

// ── status ────────────────────────────────────────────────────────────

#[tokio::test]
async fn status_snapshots_last_changes() {
    let deployer = Arc::new(BundleDeployer::new());
    let user = authenticated_user();

    call(
        DeployOp::Import,
        import_params("wordpress", BUNDLES_YAML),
        Arc::clone(&user),
        Arc::clone(&deployer) as Arc<dyn Deployer>,
    )
    .await;

    let reply = call(
        DeployOp::Status,
        JsonMap::new(),
        user,
        Arc::clone(&deployer) as Arc<dyn Deployer>,
    )
    .await;
    let last = reply["Response"]["LastChanges"].as_array().unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0]["Status"], json!("scheduled"));
    assert_eq!(last[0]["Queue"], json!(0));
}
