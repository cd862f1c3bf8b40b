//! Target validation and DNS pinning.
//!
//! Every URL the proxy is about to contact, the caller's and every redirect
//! `Location`, goes through [`validate`]:
//! 1. Scheme must be http or https
//! 2. Host must not be `localhost` or a private literal
//! 3. Public literals are pinned as-is
//! 4. Hostnames resolve A and AAAA; any private record rejects the target
//! 5. One address is pinned; the transport connects to it and nothing else
use std::net::IpAddr;

use tracing::{debug, warn};
use url::Url;

use crate::address::{is_private_host, is_private_ip, parse_literal};
use crate::resolver::{ResolveFailure, Resolver};
use crate::types::{ErrorCode, PinnedAddress, ProxyError, Target};

/// A target that passed validation, with the address to connect to.
#[derive(Debug, Clone)]
pub struct Validated {
    pub target: Target,
    pub pinned: PinnedAddress,
}

/// Validate a URL and pin the address the connection must use.
///
/// # Errors
///
/// - `BadProtocol` / `MalformedUrl` from [`Target::from_url`]
/// - `PrivateNetwork` if the host or any resolved address is private
/// - `DnsFailure` if no address could be obtained
pub async fn validate(url: Url, resolver: &dyn Resolver) -> Result<Validated, ProxyError> {
    let target = Target::from_url(url)?;
    let host = target.host();

    if is_private_host(host) {
        return Err(private_network_error(host, None));
    }

    if let Some(literal) = parse_literal(host) {
        // is_private_host already rejected malformed literals
        let ip = literal
            .ip()
            .ok_or_else(|| private_network_error(host, None))?;
        debug!(url = %target, pinned = %ip, "pinned literal address");
        return Ok(Validated {
            pinned: PinnedAddress::new(ip),
            target,
        });
    }

    let pinned = resolve_and_pin(host, resolver).await?;
    debug!(url = %target, pinned = %pinned, "pinned resolved address");
    Ok(Validated { target, pinned })
}

async fn resolve_and_pin(host: &str, resolver: &dyn Resolver) -> Result<PinnedAddress, ProxyError> {
    let (v4, v6) = tokio::join!(resolver.lookup_ipv4(host), resolver.lookup_ipv6(host));

    // An A failure is fatal. An AAAA failure is tolerated only once A has
    // produced addresses.
    let v4: Vec<IpAddr> = match v4 {
        Ok(lookup) => lookup.into_records().into_iter().map(IpAddr::V4).collect(),
        Err(e) => return Err(dns_failure(host, &e)),
    };
    let v6: Vec<IpAddr> = match v6 {
        Ok(lookup) => lookup.into_records().into_iter().map(IpAddr::V6).collect(),
        Err(e) if v4.is_empty() => return Err(dns_failure(host, &e)),
        Err(e) => {
            warn!(
                host,
                error = %e,
                "AAAA lookup failed after A succeeded; continuing with IPv4"
            );
            Vec::new()
        }
    };

    if let Some(ip) = v4.iter().chain(&v6).copied().find(|ip| is_private_ip(*ip)) {
        return Err(private_network_error(host, Some(ip)));
    }

    let Some(pinned) = v4.first().or_else(|| v6.first()).copied() else {
        return Err(
            ProxyError::new(ErrorCode::DnsFailure, "dns lookup returned no addresses")
                .with_detail("host", host),
        );
    };

    Ok(PinnedAddress::new(pinned))
}

fn dns_failure(host: &str, err: &ResolveFailure) -> ProxyError {
    ProxyError::new(ErrorCode::DnsFailure, format!("dns lookup failed: {err}"))
        .with_detail("host", host)
        .with_detail("error", err.0.as_str())
}

fn private_network_error(host: &str, resolved: Option<IpAddr>) -> ProxyError {
    let err = ProxyError::new(
        ErrorCode::PrivateNetwork,
        "access to private network addresses is not allowed",
    )
    .with_detail("host", host);
    match resolved {
        Some(ip) => err.with_detail("resolved_ip", ip.to_string()),
        None => err,
    }
}
