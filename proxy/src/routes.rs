// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! HTTP route handlers for the ECR proxy.
//!
//! | Method | Path | Handler | Description |
//! |--------|------|---------|-------------|
//! | GET | `/`, `/healthz` | [`health`] | Liveness |
//! | GET | `/readyz` | [`ready`] | Healthy iff a valid registry token is cached |
//! | any | `/v2`, `/v2/*` | [`proxy`] | Authenticated proxy to the registry |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Method, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::application::AppState;
use crate::constants::HEALTH_BODY;
use crate::director;
use crate::errors::AppError;

/// Liveness endpoint. Always 200.
pub async fn health() -> impl IntoResponse {
    HEALTH_BODY
}

/// Readiness endpoint.
///
/// Reads the cache state only; never triggers a token refresh.
#[tracing::instrument(skip(state))]
pub async fn ready(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    if state.cache.is_healthy().await {
        return Ok(Json(json!({"status": "ok"})));
    }

    let message = match state.cache.expires_at().await {
        Some(expires_at) => {
            let ago = SystemTime::now()
                .duration_since(expires_at)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            format!("ECR token expired {ago}s ago and has not been refreshed")
        }
        None => "ECR token has not been obtained".to_string(),
    };
    tracing::warn!("[proxy] not ready: {}", message);

    Err(AppError::NotReady(message))
}

/// Proxies a registry API request.
///
/// # Request Flow
///
/// 1. Check the caller address against the IP allow-list
/// 2. Check client credentials when a users file is configured
/// 3. Get the current registry token (refreshing if expired)
/// 4. Rewrite the request toward the registry with the token
/// 5. Forward and stream the response back
///
/// # Errors
///
/// - [`AppError::Forbidden`] - caller not in the allow-list
/// - [`AppError::Unauthorized`] - missing or wrong client credentials
/// - [`AppError::CredentialUnavailable`] - no valid token could be obtained
/// - [`AppError::Upstream`] - the registry could not be reached
#[tracing::instrument(skip_all, fields(remote = %peer))]
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request,
) -> Result<Response, AppError> {
    // 1. Access gate
    if !state.rules.is_allowed(&peer.to_string()) {
        log_request(request.method(), request.uri().path(), peer, "Denied request from IP (not in whitelist)");
        return Err(AppError::Forbidden);
    }

    // 2. Local client authentication
    if let Some(users) = &state.users
        && !users.authorize(request.headers().get(header::AUTHORIZATION)).await
    {
        log_request(request.method(), request.uri().path(), peer, "Denied request (invalid client credentials)");
        return Err(AppError::Unauthorized);
    }

    if request.uri().path() != "/v2/" {
        log_request(request.method(), request.uri().path(), peer, "Proxying request to ECR");
    }

    // 3. Registry token
    let credential = state.cache.current().await?;

    // 4. Rewrite toward the registry
    director::rewrite(&mut request, credential.secret(), credential.endpoint())?;

    // 5. Forward
    state.upstream.forward(request).await
}

/// Structured request log entry.
fn log_request(method: &Method, path: &str, peer: SocketAddr, msg: &str) {
    tracing::info!(
        method = %method,
        path = %path,
        ip = %peer.ip(),
        port = peer.port(),
        "{}",
        msg
    );
}
