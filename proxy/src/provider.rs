// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Registry authorization token providers.
//!
//! The [`CredentialProvider`] trait is the seam between the credential cache
//! and the authority that issues tokens. [`EcrCredentialProvider`] calls
//! `ecr:GetAuthorizationToken` for the configured account and region using the
//! default AWS credential chain of the host.

use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_ecr::error::DisplayErrorContext;

use crate::errors::ProviderError;
use crate::models::{IssuedToken, RegistryTarget};

/// Issues time-bounded registry tokens. Expected to be slow and network bound.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch(&self) -> Result<IssuedToken, ProviderError>;
}

pub struct EcrCredentialProvider {
    client: aws_sdk_ecr::Client,
    account: String,
}

impl EcrCredentialProvider {
    pub async fn new(target: &RegistryTarget) -> Self {
        let config = load_sdk_config(&target.region).await;
        Self::from_config(&config, &target.account)
    }

    pub fn from_config(config: &SdkConfig, account: &str) -> Self {
        Self {
            client: aws_sdk_ecr::Client::new(config),
            account: account.to_string(),
        }
    }
}

#[async_trait]
impl CredentialProvider for EcrCredentialProvider {
    #[tracing::instrument(skip(self), fields(account = %self.account))]
    async fn fetch(&self) -> Result<IssuedToken, ProviderError> {
        #[allow(deprecated)]
        let output = self
            .client
            .get_authorization_token()
            .registry_ids(&self.account)
            .send()
            .await
            .map_err(|e| ProviderError::Request(DisplayErrorContext(&e).to_string()))?;

        let data = output
            .authorization_data()
            .first()
            .ok_or_else(|| ProviderError::EmptyResponse(self.account.clone()))?;

        let secret = data
            .authorization_token()
            .ok_or(ProviderError::MissingField("authorizationToken"))?
            .to_string();

        let expires_at = data
            .expires_at()
            .ok_or(ProviderError::MissingField("expiresAt"))
            .and_then(|at| {
                SystemTime::try_from(*at).map_err(|_| ProviderError::MissingField("expiresAt"))
            })?;

        tracing::debug!("[proxy] received authorization token, expires_at: {:?}", expires_at);

        Ok(IssuedToken {
            secret,
            expires_at,
            endpoint: data.proxy_endpoint().map(str::to_string),
        })
    }
}

/// Looks up the account of the caller's AWS identity through STS.
#[tracing::instrument]
pub async fn caller_account(region: &str) -> Result<String, ProviderError> {
    let config = load_sdk_config(region).await;
    let identity = aws_sdk_sts::Client::new(&config)
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| ProviderError::CallerIdentity(DisplayErrorContext(&e).to_string()))?;

    identity
        .account()
        .map(str::to_string)
        .ok_or_else(|| ProviderError::CallerIdentity("no account in response".to_string()))
}

async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}
