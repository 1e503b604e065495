// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::constants::DEFAULT_REFRESH_INTERVAL_SECS;
use crate::errors::ConfigError;
use crate::models::RegistryTarget;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct ProxyOptions {
    #[arg(long, default_value = "0.0.0.0", env("PROXY_HTTP_HOST"))]
    pub host: String,
    #[arg(long, default_value = "5000", env("PORT"))]
    pub port: u16,
    /// Explicit registry host, `<account>.dkr.ecr.<region>.amazonaws.com`
    #[arg(long, env("ECR_TARGET"))]
    pub target: Option<String>,
    #[arg(long, default_value = "us-east-1", env("AWS_REGION"))]
    pub region: String,
    #[arg(long, env("AWS_ACCOUNT_ID"))]
    pub account: Option<String>,
    /// Comma-separated IPs or CIDR prefixes; empty admits everyone
    #[arg(long, default_value = "", env("IP_WHITELIST"))]
    pub ip_whitelist: String,
    #[arg(long, default_value = "/app/tls/tls.crt", env("TLS_CERT_FILE"))]
    pub tls_cert_file: PathBuf,
    #[arg(long, default_value = "/app/tls/tls.key", env("TLS_KEY_FILE"))]
    pub tls_key_file: PathBuf,
    /// JSON list of `{"username", "password"}` allowed to use the proxy
    #[arg(long, env("USERS_FILE"))]
    pub users_file: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_REFRESH_INTERVAL_SECS, env("TOKEN_REFRESH_INTERVAL_SECS"))]
    pub refresh_interval_secs: u64,
    #[arg(long, default_value = "false", env("SKIP_BACKGROUND_REFRESH"), action = ArgAction::SetTrue)]
    pub skip_background_refresh: bool,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        ProxyOptions {
            host: "127.0.0.1".to_string(),
            port: 5000,
            target: None,
            region: "us-east-1".to_string(),
            account: None,
            ip_whitelist: String::new(),
            tls_cert_file: PathBuf::from("/app/tls/tls.crt"),
            tls_key_file: PathBuf::from("/app/tls/tls.key"),
            users_file: None,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            skip_background_refresh: true,
        }
    }
}

impl ProxyOptions {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    /// Resolves the registry target from the options alone.
    ///
    /// Returns `Ok(None)` when neither `ECR_TARGET` nor `AWS_ACCOUNT_ID` is set,
    /// in which case the account has to be discovered from the caller identity.
    pub fn static_target(&self) -> Result<Option<RegistryTarget>, ConfigError> {
        if let Some(target) = self.target.as_deref().filter(|t| !t.trim().is_empty()) {
            let target = RegistryTarget::parse(target)?;
            tracing::info!(
                "[proxy] using ECR_TARGET: {}, AWS region: {}, AWS account: {}",
                target.host,
                target.region,
                target.account
            );
            return Ok(Some(target));
        }

        let region = self.region.trim();
        if region.is_empty() {
            return Err(ConfigError::MissingRegion);
        }

        Ok(self
            .account
            .as_deref()
            .map(str::trim)
            .filter(|account| !account.is_empty())
            .map(|account| RegistryTarget::from_account(account, region)))
    }
}
