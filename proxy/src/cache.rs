// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Registry credential cache.
//!
//! [`CredentialCache`] owns the current registry token, its effective expiry
//! and the upstream endpoint. Readers go through [`CredentialCache::current`],
//! which refreshes synchronously when the cached token is missing or expired.
//!
//! # Locking
//!
//! - The credential itself sits behind a [`RwLock`] and is always replaced as a
//!   whole, so a reader never sees a secret paired with the wrong expiry.
//! - Refreshes are serialized by a separate [`Mutex`]. Callers that find the
//!   token expired queue on it and re-check after acquiring it, so concurrent
//!   readers collapse into a single provider call.
//!
//! An optional background task ([`CredentialCache::spawn_refresher`]) refreshes
//! on a fixed interval through the same path.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::constants;
use crate::errors::{AppError, ProviderError};
use crate::models::{Credential, IssuedToken};
use crate::provider::CredentialProvider;

pub struct CredentialCache {
    provider: Arc<dyn CredentialProvider>,
    /// Used when the provider does not report an endpoint.
    default_endpoint: String,
    cached: RwLock<Option<Credential>>,
    refresh_lock: Mutex<()>,
}

impl CredentialCache {
    pub fn new(provider: Arc<dyn CredentialProvider>, default_endpoint: impl Into<String>) -> Self {
        Self {
            provider,
            default_endpoint: default_endpoint.into(),
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns a credential that is valid right now, refreshing first if needed.
    ///
    /// # Errors
    ///
    /// - [`AppError::CredentialUnavailable`] - the refresh failed
    /// - [`AppError::CredentialExpired`] - the provider issued a token that is
    ///   already inside the safety margin
    pub async fn current(&self) -> Result<Credential, AppError> {
        // Fast path: check if cached credential is still valid
        if let Some(credential) = self.valid_credential().await {
            return Ok(credential);
        }

        let _guard = self.refresh_lock.lock().await;

        // Double-check after acquiring the refresh lock (another task may have refreshed)
        if let Some(credential) = self.valid_credential().await {
            return Ok(credential);
        }

        tracing::info!("[proxy] ECR token expired or about to expire, refreshing");
        self.refresh_locked().await.map_err(|e| {
            tracing::error!("[proxy] failed to refresh ECR token: {}", e);
            AppError::from(e)
        })?;

        self.valid_credential()
            .await
            .ok_or(AppError::CredentialExpired)
    }

    /// Fetches a new token and replaces the cached credential.
    ///
    /// On failure the previous credential is left untouched.
    pub async fn refresh(&self) -> Result<(), ProviderError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// True iff a non-expired credential is cached. Never calls the provider.
    pub async fn is_healthy(&self) -> bool {
        let now = SystemTime::now();
        self.cached
            .read()
            .await
            .as_ref()
            .is_some_and(|credential| !credential.is_expired_at(now))
    }

    /// Effective expiry of the cached credential, if any.
    pub async fn expires_at(&self) -> Option<SystemTime> {
        self.cached.read().await.as_ref().map(Credential::expires_at)
    }

    /// Overrides the effective expiry of the cached credential.
    ///
    /// Setting it in the past forces the next [`current`](Self::current) call
    /// to refresh.
    pub async fn force_expiry(&self, expires_at: SystemTime) {
        if let Some(credential) = self.cached.write().await.as_mut() {
            credential.set_expires_at(expires_at);
        }
    }

    /// Starts a task that refreshes every `interval` until `shutdown` is cancelled.
    ///
    /// The first refresh happens one full interval after the call.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("[proxy] stopping background token refresh");
                        break;
                    }
                    _ = ticker.tick() => {
                        match cache.refresh().await {
                            Ok(()) => tracing::debug!(
                                "[proxy] refreshed ECR token, sleeping for {:#?}",
                                interval
                            ),
                            Err(e) => tracing::warn!("[proxy] background token refresh failed: {}", e),
                        }
                    }
                }
            }
        })
    }

    async fn valid_credential(&self) -> Option<Credential> {
        let now = SystemTime::now();
        let cache = self.cached.read().await;
        cache
            .as_ref()
            .filter(|credential| !credential.is_expired_at(now))
            .cloned()
    }

    /// Must be called with `refresh_lock` held.
    async fn refresh_locked(&self) -> Result<(), ProviderError> {
        let issued = self.provider.fetch().await?;
        let credential = self.to_credential(&issued).await;

        tracing::info!(
            "[proxy] refreshed ECR authorization token, endpoint: {}, expires_at: {:?}",
            credential.endpoint(),
            credential.expires_at()
        );

        *self.cached.write().await = Some(credential);
        Ok(())
    }

    async fn to_credential(&self, issued: &IssuedToken) -> Credential {
        let expires_at = issued
            .expires_at
            .checked_sub(constants::TOKEN_SAFETY_MARGIN)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let endpoint = match issued.endpoint.as_deref().and_then(endpoint_host) {
            Some(host) => host.to_string(),
            None => self
                .cached
                .read()
                .await
                .as_ref()
                .map(|credential| credential.endpoint().to_string())
                .unwrap_or_else(|| self.default_endpoint.clone()),
        };

        Credential::new(issued.secret.clone(), expires_at, endpoint)
    }
}

/// Strips the scheme and any trailing slash from a reported endpoint.
fn endpoint_host(endpoint: &str) -> Option<&str> {
    let host = endpoint
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    (!host.is_empty()).then_some(host)
}
