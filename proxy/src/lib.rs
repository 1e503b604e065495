// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! # ECR Proxy
//!
//! An authenticating HTTPS reverse proxy in front of an Amazon ECR registry.
//!
//! Registry clients talk to the proxy without any AWS credentials. The proxy
//! obtains a registry authorization token with its own IAM identity, caches it,
//! and injects it into every proxied request.
//!
//! ## Architecture
//!
//! ```text
//! Client -> HTTPS -> access gate -> (users) -> director -> ECR
//!                                                 |
//!                                                 +-> credential cache -> ecr:GetAuthorizationToken
//! ```
//!
//! ## Modules
//!
//! - [`access`]: IP allow-list admission check
//! - [`application`]: HTTPS server setup with Axum and graceful shutdown
//! - [`cache`]: Registry token cache with single-flight refresh
//! - [`configuration`]: CLI argument parsing with clap
//! - [`constants`]: Configuration constants for the application
//! - [`director`]: Request rewrite toward the registry
//! - [`errors`]: Application error types with HTTP response mapping
//! - [`models`]: Credential and target types
//! - [`provider`]: ECR and STS clients
//! - [`routes`]: HTTP route handlers (health, readiness, proxy)
//! - [`tls`]: Self-signed certificate bootstrap
//! - [`upstream`]: Streaming forwarder to the registry
//! - [`users`]: Optional local client authentication
//!
//! ## Usage
//!
//! ```bash
//! AWS_ACCOUNT_ID=123456789012 AWS_REGION=us-east-1 IP_WHITELIST=10.0.0.0/8 ecr-proxy
//! ```
//!
//! ## Security Considerations
//!
//! - Tokens are treated as expired 6 hours before the registry says they are
//! - Tokens and user passwords are zeroized on drop and redacted in logs
//! - An empty `IP_WHITELIST` admits every caller

pub mod access;
pub mod application;
pub mod cache;
pub mod configuration;
pub mod constants;
pub mod director;
pub mod errors;
pub mod models;
pub mod provider;
pub mod routes;
pub mod tls;
pub mod upstream;
pub mod users;
