// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Local client authentication from a JSON users file.
//!
//! The file holds `[{"username": "...", "password": "..."}, ...]`. It is read
//! once at startup and then reloaded periodically; a failed reload keeps the
//! previous table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::ConfigError;
use crate::models::User;

pub struct UserStore {
    path: PathBuf,
    users: RwLock<HashMap<String, String>>,
}

impl UserStore {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let users = read_users(&path).await?;
        tracing::info!("[proxy] loaded {} users from {}", users.len(), path.display());
        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }

    pub async fn reload(&self) -> Result<(), ConfigError> {
        let users = read_users(&self.path).await?;
        *self.users.write().await = users;
        Ok(())
    }

    pub async fn is_valid(&self, username: &str, password: &str) -> bool {
        self.users
            .read()
            .await
            .get(username)
            .is_some_and(|expected| passwords_match(expected, password))
    }

    /// Checks an `Authorization: Basic ...` header against the table.
    pub async fn authorize(&self, header: Option<&HeaderValue>) -> bool {
        match header.and_then(basic_credentials) {
            Some((username, password)) => self.is_valid(&username, &password).await,
            None => false,
        }
    }

    pub fn spawn_reloader(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = store.reload().await {
                            tracing::warn!("[proxy] keeping previous users, reload failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

async fn read_users(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let error = |e: String| ConfigError::UsersFile(path.display().to_string(), e);

    let contents = tokio::fs::read(path).await.map_err(|e| error(e.to_string()))?;
    let list: Vec<User> = serde_json::from_slice(&contents).map_err(|e| error(e.to_string()))?;

    Ok(list
        .iter()
        .map(|user| (user.username.clone(), user.password.clone()))
        .collect())
}

/// Constant-time string comparison.
fn passwords_match(expected: &str, given: &str) -> bool {
    expected.as_bytes().ct_eq(given.as_bytes()).into()
}

/// Decodes `Basic base64(username:password)`.
pub fn basic_credentials(header: &HeaderValue) -> Option<(String, String)> {
    let value = header.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
