// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! IP allow-list admission check.
//!
//! The allow-list is a comma-separated list of CIDR prefixes or bare IPs.
//! Bare entries are widened to a host prefix (`/32`, or `/128` when the entry
//! contains a `:`). Entries that do not parse are skipped.
//!
//! An allow-list with no entries disables the gate and admits every caller.
//! A caller address that cannot be parsed is always denied while the gate is
//! enabled.

use std::net::{IpAddr, SocketAddr};

use ipnet::IpNet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRules {
    networks: Vec<IpNet>,
    enabled: bool,
}

impl AccessRules {
    pub fn parse(whitelist: &str) -> Self {
        let mut enabled = false;
        let mut networks = Vec::new();

        for entry in whitelist.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            enabled = true;
            match normalize_entry(entry) {
                Some(network) => networks.push(network),
                None => tracing::warn!("[proxy] ignoring malformed whitelist entry: {}", entry),
            }
        }

        Self { networks, enabled }
    }

    /// False when the allow-list had no entries at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn networks(&self) -> &[IpNet] {
        &self.networks
    }

    /// Decides whether a caller at `remote_addr` (`ip`, `ip:port` or `[ipv6]:port`) is admitted.
    pub fn is_allowed(&self, remote_addr: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let Some(ip) = extract_ip(remote_addr) else {
            tracing::warn!("[proxy] failed to parse IP from remote address: {}", remote_addr);
            return false;
        };

        if self.contains(ip) {
            return true;
        }

        tracing::info!("[proxy] IP {} is not in the whitelist", ip);
        false
    }

    fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.networks.iter().any(|network| network.contains(&ip))
    }
}

/// One-shot form of [`AccessRules::is_allowed`].
pub fn is_allowed(remote_addr: &str, whitelist: &str) -> bool {
    AccessRules::parse(whitelist).is_allowed(remote_addr)
}

/// Turns a whitelist entry into its canonical prefix.
pub fn normalize_entry(entry: &str) -> Option<IpNet> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let cidr = if entry.contains('/') {
        entry.to_string()
    } else if entry.contains(':') {
        format!("{entry}/128")
    } else {
        format!("{entry}/32")
    };

    cidr.parse::<IpNet>().ok().map(|network| network.trunc())
}

/// Strips the port and IPv6 brackets from a caller address.
pub fn extract_ip(remote_addr: &str) -> Option<IpAddr> {
    let remote_addr = remote_addr.trim();

    if let Ok(ip) = remote_addr.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(socket) = remote_addr.parse::<SocketAddr>() {
        return Some(socket.ip());
    }
    if let Some(rest) = remote_addr.strip_prefix('[') {
        let end = rest.rfind(']')?;
        return rest[..end].parse().ok();
    }

    let (host, _port) = remote_addr.rsplit_once(':')?;
    host.parse().ok()
}
