// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Rewrites an inbound request into an authenticated registry request.

use axum::http::uri::{PathAndQuery, Scheme};
use axum::http::{HeaderValue, Request, Uri, header};

use crate::errors::AppError;

/// Points `request` at `https://<target_host>` and sets `Authorization: Basic <secret>`.
///
/// Path and query are kept. Any previous `Host` and `Authorization` values are
/// replaced. Applying it twice with the same inputs is a no-op.
pub fn rewrite<B>(request: &mut Request<B>, secret: &str, target_host: &str) -> Result<(), AppError> {
    let path_and_query = request
        .uri()
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    let uri = Uri::builder()
        .scheme(Scheme::HTTPS)
        .authority(target_host)
        .path_and_query(path_and_query)
        .build()?;

    let host = HeaderValue::from_str(target_host)
        .map_err(|e| AppError::InvalidRequest(format!("invalid target host: {e}")))?;
    let mut authorization = HeaderValue::from_str(&format!("Basic {secret}"))
        .map_err(|_| AppError::InvalidRequest("invalid authorization token".to_string()))?;
    authorization.set_sensitive(true);

    *request.uri_mut() = uri;
    let headers = request.headers_mut();
    headers.insert(header::HOST, host);
    headers.insert(header::AUTHORIZATION, authorization);

    Ok(())
}
