// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::time::Duration;

/// ECR authorization tokens are valid for 12 hours; treat them as expired 6 hours early.
pub const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60 * 60; // 1 hour, must stay below the margin
pub const USERS_RELOAD_INTERVAL: Duration = Duration::from_secs(30);
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);
pub const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const ECR_SERVICE_LABEL: &str = "ecr";
pub const ECR_DEFAULT_DOMAIN: &str = "amazonaws.com";
pub const ECR_MIN_HOST_LABELS: usize = 6;

pub const HEALTH_BODY: &str = "AWS ECR Proxy is running\n";
pub const AUTH_REALM: &str = "Basic realm=\"ecr-proxy\"";

// Self-signed fallback identity
pub const SELF_SIGNED_COMMON_NAME: &str = "localhost";
pub const SELF_SIGNED_ORGANIZATION: &str = "Self-Signed Certificate";
pub const SELF_SIGNED_VALIDITY_DAYS: i64 = 3650;
