//! Egress safety: validation of caller-supplied URLs before any fetch.
//!
//! The service dereferences attacker-influenced URLs (webhook targets,
//! URL-to-PDF sources) from a privileged network position. Every such URL
//! must pass [`assert_safe_url`] before a socket is opened towards it.
//!
//! The check resolves the hostname and classifies every returned address.
//! It is advisory against DNS rebinding: a host can re-resolve to a
//! private address between validation and fetch. The resolved addresses
//! are returned so a caller that wants to close that window can pin its
//! connection to them.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tokio::net::lookup_host;
use url::{Host, Url};

use crate::errors::{Error, Result};

/// Hostname suffixes that are rejected outright, without a DNS lookup.
const BLOCKED_HOST_SUFFIXES: &[&str] = &[".local", ".internal", ".localhost"];

/// Validate a caller-supplied URL for egress safety.
///
/// Returns the resolved addresses on success so the fetch can be pinned
/// to them. Fails with [`Error::InvalidRequest`] on any of:
/// unparseable URL, non-http(s) scheme, well-known internal hostname,
/// resolution failure, or any resolved address in a blocked range.
pub async fn assert_safe_url(raw_url: &str) -> Result<Vec<IpAddr>> {
    let url = Url::parse(raw_url).map_err(|_| Error::InvalidRequest {
        message: format!("Invalid URL: {raw_url}"),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::InvalidRequest {
                message: format!("URL scheme '{other}' is not allowed; use http or https"),
            });
        }
    }

    let host = url.host().ok_or_else(|| Error::InvalidRequest {
        message: "URL has no host".to_string(),
    })?;

    match host {
        Host::Ipv4(addr) => {
            reject_if_blocked(IpAddr::V4(addr))?;
            Ok(vec![IpAddr::V4(addr)])
        }
        Host::Ipv6(addr) => {
            reject_if_blocked(IpAddr::V6(addr))?;
            Ok(vec![IpAddr::V6(addr)])
        }
        Host::Domain(name) => {
            reject_internal_hostname(name)?;
            let port = url.port_or_known_default().unwrap_or(80);
            let addrs: Vec<IpAddr> = lookup_host((name, port))
                .await
                .map_err(|e| Error::InvalidRequest {
                    message: format!("Could not resolve host '{name}': {e}"),
                })?
                .map(|sock| sock.ip())
                .collect();

            if addrs.is_empty() {
                return Err(Error::InvalidRequest {
                    message: format!("Host '{name}' resolved to no addresses"),
                });
            }

            // Every returned address must be safe; a single private A/AAAA
            // record fails the whole URL.
            for addr in &addrs {
                reject_if_blocked(*addr)?;
            }
            Ok(addrs)
        }
    }
}

/// Reject well-known internal hostnames before touching DNS.
fn reject_internal_hostname(name: &str) -> Result<()> {
    let lower = name.trim_end_matches('.').to_ascii_lowercase();

    if lower == "localhost" || BLOCKED_HOST_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix)) {
        return Err(Error::InvalidRequest {
            message: format!("Host '{name}' refers to an internal address"),
        });
    }
    Ok(())
}

fn reject_if_blocked(addr: IpAddr) -> Result<()> {
    if is_blocked(addr) {
        return Err(Error::InvalidRequest {
            message: format!("Address {addr} is in a private or reserved range"),
        });
    }
    Ok(())
}

/// Classify an address against the blocked ranges.
fn is_blocked(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => {
            // An IPv4-mapped address smuggles a v4 target through a v6
            // literal; classify the embedded address.
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_blocked_v4(mapped);
            }
            is_blocked_v6(v6)
        }
    }
}

fn is_blocked_v4(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();

    addr.is_loopback()
        || addr.is_private()
        // Link-local, including the cloud metadata endpoint 169.254.169.254
        || addr.is_link_local()
        // CGNAT 100.64.0.0/10
        || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
        // "This network" 0.0.0.0/8
        || octets[0] == 0
        || addr.is_broadcast()
        || addr.is_unspecified()
}

fn is_blocked_v6(addr: Ipv6Addr) -> bool {
    let segments = addr.segments();

    addr.is_loopback()
        || addr.is_unspecified()
        // Unique-local fc00::/7
        || (segments[0] & 0xfe00) == 0xfc00
        // Link-local fe80::/10
        || (segments[0] & 0xffc0) == 0xfe80
}
