// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Forwarding of rewritten requests to the registry.
//!
//! Bodies are streamed in both directions. Hop-by-hop headers are dropped and
//! redirects are passed back to the client untouched (blob downloads redirect
//! to S3 and must not carry the registry credential).

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Request, Response, header};
use futures_util::TryStreamExt;

use crate::constants::UPSTREAM_CONNECT_TIMEOUT;
use crate::errors::AppError;
use crate::tls::install_crypto_provider;

const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const PROTECTED_HEADERS: [HeaderName; 2] = [header::AUTHORIZATION, header::HOST];

#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
}

impl Upstream {
    pub fn new() -> Result<Self, AppError> {
        install_crypto_provider();
        let client = reqwest::Client::builder()
            .connect_timeout(UPSTREAM_CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .tcp_nodelay(true)
            .build()?;
        Ok(Self { client })
    }

    /// Sends an already rewritten request and streams the response back.
    #[tracing::instrument(skip(self, request), fields(method = %request.method(), uri = %request.uri()))]
    pub async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, AppError> {
        let (mut parts, body) = request.into_parts();
        let has_body = parts.headers.contains_key(header::CONTENT_LENGTH)
            || parts.headers.contains_key(header::TRANSFER_ENCODING);
        strip_hop_by_hop(&mut parts.headers);

        let body = if has_body {
            reqwest::Body::wrap_stream(body.into_data_stream())
        } else {
            reqwest::Body::from(Vec::new())
        };

        let outbound = reqwest::Request::try_from(Request::from_parts(parts, body))?;
        let response = self.client.execute(outbound).await?;

        tracing::debug!("[proxy] upstream responded with {}", response.status());

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(response.headers().clone());
            strip_hop_by_hop(headers);
        }

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(builder.body(Body::from_stream(stream))?)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are hop-by-hop as well, except the ones
    // the director sets for the registry.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .filter(|name| !PROTECTED_HEADERS.contains(name))
        .collect();

    for name in named.iter().chain(HOP_BY_HOP_HEADERS.iter()) {
        headers.remove(name);
    }
}
