// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! TLS identity bootstrap for the HTTPS listener.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{Datelike, Duration, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, PKCS_ECDSA_P256_SHA256, date_time_ymd,
};

use crate::constants::{
    SELF_SIGNED_COMMON_NAME, SELF_SIGNED_ORGANIZATION, SELF_SIGNED_VALIDITY_DAYS,
};
use crate::errors::ConfigError;

/// Installs aws-lc-rs as the process-wide rustls provider. Safe to call repeatedly.
pub fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_some() {
        return;
    }
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        tracing::debug!("[proxy] rustls crypto provider already installed: {:?}", e);
    }
}

/// Makes sure a certificate and key exist at the given paths.
///
/// When either file is missing a self-signed pair is generated and written.
/// Returns `true` if files were generated.
pub fn ensure_identity(cert_file: &Path, key_file: &Path) -> Result<bool, ConfigError> {
    if cert_file.exists() && key_file.exists() {
        return Ok(false);
    }

    tracing::warn!(
        "[proxy] generating self-signed certificate at {} and {}",
        cert_file.display(),
        key_file.display()
    );

    let (cert_pem, key_pem) = generate_self_signed()?;
    write_file(cert_file, cert_pem.as_bytes(), 0o644)?;
    write_file(key_file, key_pem.as_bytes(), 0o600)?;

    Ok(true)
}

/// Generates a P-256 key and a self-signed `localhost` server certificate, both PEM encoded.
pub fn generate_self_signed() -> Result<(String, String), ConfigError> {
    let tls_error = |e: rcgen::Error| ConfigError::Tls(e.to_string());

    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).map_err(tls_error)?;

    let mut params = CertificateParams::default();
    let mut name = DistinguishedName::new();
    name.push(DnType::OrganizationName, SELF_SIGNED_ORGANIZATION);
    name.push(DnType::CommonName, SELF_SIGNED_COMMON_NAME);
    params.distinguished_name = name;

    let now = Utc::now();
    let until = now + Duration::days(SELF_SIGNED_VALIDITY_DAYS);
    params.not_before = date_time_ymd(now.year(), now.month() as u8, now.day() as u8);
    params.not_after = date_time_ymd(until.year(), until.month() as u8, until.day() as u8);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let certificate = params.self_signed(&key_pair).map_err(tls_error)?;

    Ok((certificate.pem(), key_pair.serialize_pem()))
}

fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<(), ConfigError> {
    let io_error = |e: std::io::Error| ConfigError::Tls(format!("{}: {}", path.display(), e));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path).map_err(io_error)?;
    file.write_all(contents).map_err(io_error)
}
