// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::constants::AUTH_REALM;

/// Failures raised while obtaining an authorization token from the registry.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("authorization request failed: {0}")]
    Request(String),
    #[error("no authorization data returned for account {0}")]
    EmptyResponse(String),
    #[error("authorization data is missing {0}")]
    MissingField(&'static str),
    #[error("unable to determine caller account: {0}")]
    CallerIdentity(String),
}

/// Startup configuration errors. These are fatal.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid ECR_TARGET format: {0}")]
    InvalidTarget(String),
    #[error("AWS_ACCOUNT_ID is required and could not be determined: {0}")]
    MissingAccount(String),
    #[error("AWS region must not be empty")]
    MissingRegion,
    #[error("unable to load users file {0}: {1}")]
    UsersFile(String, String),
    #[error("unable to prepare TLS identity: {0}")]
    Tls(String),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum AppError {
    #[error("forbidden")]
    Forbidden,
    #[error("unauthorized")]
    Unauthorized,
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(#[from] ProviderError),
    #[error("credential expired before use")]
    CredentialExpired,
    #[error("not ready: {0}")]
    NotReady(String),
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            Self::Unauthorized => {
                let body = Json(json!({"code": 401, "message": "Unauthorized"}));
                return (
                    StatusCode::UNAUTHORIZED,
                    [(header::WWW_AUTHENTICATE, AUTH_REALM)],
                    body,
                )
                    .into_response();
            }
            Self::CredentialUnavailable(_) | Self::CredentialExpired => (
                StatusCode::BAD_GATEWAY,
                "Failed to refresh ECR token".to_string(),
            ),
            Self::NotReady(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "Upstream error".to_string()),
        };

        let body = Json(json!({"code": status.as_u16(), "message": message}));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(source: reqwest::Error) -> Self {
        tracing::error!("[proxy] upstream request failed: {:?}", source);
        AppError::Upstream(source.to_string())
    }
}

impl From<axum::http::Error> for AppError {
    fn from(source: axum::http::Error) -> Self {
        tracing::error!("[proxy] unable to build request: {:?}", source);
        AppError::InvalidRequest(source.to_string())
    }
}
