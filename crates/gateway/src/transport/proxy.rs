// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP(S) proxy handlers: plain forwarding to the backend API and the
//! content service, cloning method, headers, query string and body.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};

use crate::state::GatewayState;

/// Upper bound on proxied request bodies.
const BODY_LIMIT: usize = 32 * 1024 * 1024;

/// `ANY /juju-core/{*path}` — proxy to the backend HTTP API.
///
/// Special case: a 404 for a charm icon request redirects to the fallback
/// icon on the content service instead of surfacing the miss.
pub async fn api_proxy(
    State(state): State<Arc<GatewayState>>,
    Path(path): Path<String>,
    req: Request,
) -> Response {
    let is_icon = charm_icon_requested(&path, req.uri().query());
    let base = state.api_http_base();
    let upstream = match forward(&state.api_client, &base, &path, req).await {
        Ok(resp) => resp,
        Err(diagnostic) => return proxy_error(diagnostic),
    };
    if upstream.status() == StatusCode::NOT_FOUND && is_icon {
        return Redirect::to(&state.fallback_icon_url()).into_response();
    }
    relay_response(upstream).await
}

/// `ANY /content/{*path}` — plain proxy to the content service.
pub async fn content_proxy(
    State(state): State<Arc<GatewayState>>,
    Path(path): Path<String>,
    req: Request,
) -> Response {
    match forward(&state.content_client, &state.config.content_url, &path, req).await {
        Ok(resp) => relay_response(resp).await,
        Err(diagnostic) => proxy_error(diagnostic),
    }
}

/// Clone the incoming request onto the upstream target and send it.
///
/// On a transport-level failure (no upstream response at all) returns the
/// diagnostic message for the 500 body.
async fn forward(
    client: &reqwest::Client,
    base: &str,
    path: &str,
    req: Request,
) -> Result<reqwest::Response, String> {
    let (parts, body) = req.into_parts();
    let url = join_url(base, path, parts.uri.query());

    let bytes = axum::body::to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|err| format!("error reading request body for {url}: {err}"))?;

    let mut headers = parts.headers.clone();
    // Hop-by-hop and recomputed headers stay local.
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONNECTION);

    client
        .request(parts.method, &url)
        .headers(headers)
        .body(bytes)
        .send()
        .await
        .map_err(|err| format!("error fetching data from {url}: {err}"))
}

/// Relay an upstream response to the client, status, headers and body.
async fn relay_response(resp: reqwest::Response) -> Response {
    let status = resp.status();
    let headers = filter_headers(resp.headers());
    let body = match resp.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => return proxy_error(format!("error reading upstream response: {err}")),
    };
    let mut builder = axum::http::Response::builder().status(status);
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(body)).unwrap_or_default()
}

fn filter_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    out.remove(header::TRANSFER_ENCODING);
    out.remove(header::CONNECTION);
    out.remove(header::CONTENT_LENGTH);
    out
}

/// 500 with a diagnostic body, for upstream errors without a response.
fn proxy_error(diagnostic: String) -> Response {
    tracing::error!("{diagnostic}");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("Internal server error:\n{diagnostic}"))
        .into_response()
}

fn join_url(base: &str, path: &str, query: Option<&str>) -> String {
    let base = base.trim_end_matches('/');
    match query {
        Some(query) if !query.is_empty() => format!("{base}/{path}?{query}"),
        _ => format!("{base}/{path}"),
    }
}

/// True when the request asks for a local charm's icon file.
fn charm_icon_requested(path: &str, query: Option<&str>) -> bool {
    if path != "charms" {
        return false;
    }
    let query = query.unwrap_or_default();
    let mut has_url = false;
    let mut is_icon = false;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("url=") {
            has_url = !value.is_empty();
        } else if let Some(value) = pair.strip_prefix("file=") {
            is_icon = value == "icon.svg";
        }
    }
    has_url && is_icon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_appends_path_and_query() {
        assert_eq!(join_url("http://h:1/", "a/b", Some("x=1")), "http://h:1/a/b?x=1");
        assert_eq!(join_url("http://h:1", "a", None), "http://h:1/a");
        assert_eq!(join_url("http://h:1", "a", Some("")), "http://h:1/a");
    }

    #[test]
    fn charm_icon_detection() {
        assert!(charm_icon_requested("charms", Some("url=local:trusty/django&file=icon.svg")));
        assert!(!charm_icon_requested("charms", Some("url=local:trusty/django&file=readme")));
        assert!(!charm_icon_requested("charms", Some("file=icon.svg")));
        assert!(!charm_icon_requested("charms", Some("url=&file=icon.svg")));
        assert!(!charm_icon_requested("other", Some("url=x&file=icon.svg")));
        assert!(!charm_icon_requested("charms", None));
    }
}
