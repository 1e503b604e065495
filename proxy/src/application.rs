// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::{any, get};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::access::AccessRules;
use crate::cache::CredentialCache;
use crate::configuration::ProxyOptions;
use crate::constants;
use crate::models::RegistryTarget;
use crate::provider::{self, CredentialProvider, EcrCredentialProvider};
use crate::routes;
use crate::tls;
use crate::upstream::Upstream;
use crate::users::UserStore;

pub struct AppState {
    pub target: RegistryTarget,
    pub cache: Arc<CredentialCache>,
    pub rules: AccessRules,
    pub users: Option<Arc<UserStore>>,
    pub upstream: Upstream,
}

pub struct Application {
    address: SocketAddr,
    tls: RustlsConfig,
    router: Router,
    handle: Handle,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Application {
    /// Resolves the target, obtains the first registry token and prepares the listener.
    ///
    /// Any failure here is fatal: a bad target, an unknown account, a failed
    /// initial token refresh, an unreadable users file or a missing TLS identity.
    pub async fn build(options: ProxyOptions) -> anyhow::Result<Self> {
        tls::install_crypto_provider();

        let target = resolve_target(&options).await?;
        let provider: Arc<dyn CredentialProvider> = Arc::new(EcrCredentialProvider::new(&target).await);
        let cache = Arc::new(CredentialCache::new(provider, target.host.clone()));

        cache
            .refresh()
            .await
            .context("initial token refresh failed")?;

        let users = match &options.users_file {
            Some(path) => Some(Arc::new(UserStore::load(path).await?)),
            None => None,
        };

        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        if !options.skip_background_refresh {
            tracing::info!(
                "[proxy] refreshing ECR token every {:#?}",
                options.refresh_interval()
            );
            tasks.push(cache.spawn_refresher(options.refresh_interval(), shutdown.clone()));
        } else {
            tracing::warn!("[proxy] skipping background token refresh");
        }

        if let Some(users) = &users {
            tasks.push(users.spawn_reloader(constants::USERS_RELOAD_INTERVAL, shutdown.clone()));
        }

        tls::ensure_identity(&options.tls_cert_file, &options.tls_key_file)?;
        let tls = RustlsConfig::from_pem_file(&options.tls_cert_file, &options.tls_key_file)
            .await
            .context("unable to load TLS certificate and key")?;

        let state = AppState {
            target,
            cache,
            rules: AccessRules::parse(&options.ip_whitelist),
            users,
            upstream: Upstream::new()?,
        };

        let address: SocketAddr = format!("{}:{}", options.host, options.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", options.host, options.port))?;

        tracing::info!(
            "[proxy] starting HTTPS ECR proxy on {} for {}",
            address,
            state.target.host
        );

        Ok(Self {
            address,
            tls,
            router: create_router(state),
            handle: Handle::new(),
            shutdown,
            tasks,
        })
    }

    /// Serves until SIGINT/SIGTERM, then stops the background tasks.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        let handle = self.handle.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("[proxy] shutting down");
            shutdown.cancel();
            handle.graceful_shutdown(Some(constants::SHUTDOWN_GRACE_PERIOD));
        });

        let result = axum_server::bind_rustls(self.address, self.tls)
            .handle(self.handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await;

        self.shutdown.cancel();
        for task in self.tasks {
            let _ = task.await;
        }

        result
    }
}

/// Builds the router. Handlers need `ConnectInfo<SocketAddr>` to be available.
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/", get(routes::health))
        .route("/healthz", get(routes::health))
        .route("/readyz", get(routes::ready))
        .route("/v2", any(routes::proxy))
        .route("/v2/", any(routes::proxy))
        .route("/v2/{*path}", any(routes::proxy))
        .with_state(state)
}

async fn resolve_target(options: &ProxyOptions) -> anyhow::Result<RegistryTarget> {
    if let Some(target) = options.static_target()? {
        return Ok(target);
    }

    let account = provider::caller_account(&options.region)
        .await
        .map_err(|e| crate::errors::ConfigError::MissingAccount(e.to_string()))?;
    tracing::info!("[proxy] AWS_ACCOUNT_ID not set, using value from STS: {}", account);

    Ok(RegistryTarget::from_account(&account, options.region.trim()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[proxy] unable to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("[proxy] unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
