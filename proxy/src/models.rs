// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::fmt;
use std::time::SystemTime;

use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{ECR_DEFAULT_DOMAIN, ECR_MIN_HOST_LABELS, ECR_SERVICE_LABEL};
use crate::errors::ConfigError;

/// Token as issued by a [`CredentialProvider`](crate::provider::CredentialProvider),
/// before the safety margin is applied.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct IssuedToken {
    pub secret: String,
    #[zeroize(skip)]
    pub expires_at: SystemTime,
    /// Registry endpoint reported by the provider, e.g. `https://<host>`.
    pub endpoint: Option<String>,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// The registry credential held by the cache.
///
/// `expires_at` is the effective expiry: the provider's expiry minus the
/// safety margin.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    secret: String,
    #[zeroize(skip)]
    expires_at: SystemTime,
    endpoint: String,
}

impl Credential {
    pub fn new(secret: String, expires_at: SystemTime, endpoint: String) -> Self {
        Self {
            secret,
            expires_at,
            endpoint,
        }
    }

    /// Opaque basic-auth blob, used verbatim in the `Authorization` header.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    pub(crate) fn set_expires_at(&mut self, expires_at: SystemTime) {
        self.expires_at = expires_at;
    }
}

// Custom Debug implementation to prevent accidental logging of sensitive data
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// The single upstream registry this proxy fronts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryTarget {
    pub host: String,
    pub account: String,
    pub region: String,
}

impl RegistryTarget {
    /// Parses an explicit registry host of the form
    /// `<account>.dkr.ecr.<region>.amazonaws.com`.
    pub fn parse(host: &str) -> Result<Self, ConfigError> {
        let host = host.trim();
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() < ECR_MIN_HOST_LABELS
            || labels[2] != ECR_SERVICE_LABEL
            || labels.iter().any(|label| label.is_empty())
        {
            return Err(ConfigError::InvalidTarget(host.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            account: labels[0].to_string(),
            region: labels[3].to_string(),
        })
    }

    pub fn from_account(account: &str, region: &str) -> Self {
        Self {
            host: format!("{account}.dkr.{ECR_SERVICE_LABEL}.{region}.{ECR_DEFAULT_DOMAIN}"),
            account: account.to_string(),
            region: region.to_string(),
        }
    }
}

/// Entry of the local users file.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct User {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_target_extracts_account_and_region() {
        let target = RegistryTarget::parse("123456789012.dkr.ecr.eu-west-1.amazonaws.com").unwrap();
        assert_eq!(target.account, "123456789012");
        assert_eq!(target.region, "eu-west-1");
        assert_eq!(target.host, "123456789012.dkr.ecr.eu-west-1.amazonaws.com");
    }

    #[test]
    fn test_parse_target_accepts_partition_domains() {
        let target =
            RegistryTarget::parse("123456789012.dkr.ecr.cn-north-1.amazonaws.com.cn").unwrap();
        assert_eq!(target.region, "cn-north-1");
    }

    #[test]
    fn test_parse_target_rejects_other_hosts() {
        for host in [
            "registry.example.com",
            "123456789012.dkr.s3.us-east-1.amazonaws.com",
            "123456789012..ecr.us-east-1.amazonaws.com",
            "",
        ] {
            assert!(
                matches!(RegistryTarget::parse(host), Err(ConfigError::InvalidTarget(_))),
                "{host} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_account_builds_canonical_host() {
        let target = RegistryTarget::from_account("210987654321", "us-east-1");
        assert_eq!(target.host, "210987654321.dkr.ecr.us-east-1.amazonaws.com");
        assert_eq!(RegistryTarget::parse(&target.host).unwrap(), target);
    }

    #[test]
    fn test_credential_debug_redacts_secret() {
        let credential = Credential::new(
            "c2VjcmV0".to_string(),
            SystemTime::UNIX_EPOCH,
            "example.com".to_string(),
        );
        let debug = format!("{credential:?}");
        assert!(!debug.contains("c2VjcmV0"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_credential_expiry_is_inclusive() {
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let credential = Credential::new("s".into(), at, "h".into());
        assert!(!credential.is_expired_at(at - Duration::from_secs(1)));
        assert!(credential.is_expired_at(at));
    }
}
