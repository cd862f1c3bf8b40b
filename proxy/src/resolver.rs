//! DNS resolution behind an injectable interface.
//!
//! The validator never talks to DNS directly; it asks a [`Resolver`] for the
//! A and AAAA records of a hostname. "This family has no records" is an
//! ordinary [`Lookup::NoRecords`] result, distinct from a resolver failure.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::pin::Pin;

use hickory_resolver::TokioResolver;
use thiserror::Error;

use crate::types::IpFamily;

/// Resolver future type alias.
pub type ResolveFut<'a, T> =
    Pin<Box<dyn Future<Output = Result<Lookup<T>, ResolveFailure>> + Send + 'a>>;

/// Records of one address family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Records(Vec<T>),
    /// NXDOMAIN or NODATA for this family.
    NoRecords,
}

impl<T> Lookup<T> {
    pub fn into_records(self) -> Vec<T> {
        match self {
            Lookup::Records(records) => records,
            Lookup::NoRecords => Vec::new(),
        }
    }
}

/// Resolution failed for a reason other than "no records".
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ResolveFailure(pub String);

pub trait Resolver: Send + Sync {
    fn lookup_ipv4<'a>(&'a self, host: &'a str) -> ResolveFut<'a, Ipv4Addr>;

    fn lookup_ipv6<'a>(&'a self, host: &'a str) -> ResolveFut<'a, Ipv6Addr>;
}

/// System-configured resolver backed by hickory.
pub struct HickoryResolver {
    inner: TokioResolver,
}

impl HickoryResolver {
    /// Build from the system resolver configuration (`/etc/resolv.conf` on Unix).
    pub fn from_system_conf() -> Result<Self, ResolveFailure> {
        let inner = TokioResolver::builder_tokio()
            .map_err(|e| ResolveFailure(format!("failed to load resolver config: {e}")))?
            .build();
        Ok(Self { inner })
    }
}

impl fmt::Debug for HickoryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HickoryResolver").finish_non_exhaustive()
    }
}

impl Resolver for HickoryResolver {
    fn lookup_ipv4<'a>(&'a self, host: &'a str) -> ResolveFut<'a, Ipv4Addr> {
        Box::pin(async move {
            match self.inner.ipv4_lookup(host).await {
                Ok(lookup) => Ok(records(lookup.iter().map(|a| a.0).collect())),
                Err(e) if e.is_no_records_found() => Ok(Lookup::NoRecords),
                Err(e) => Err(ResolveFailure(e.to_string())),
            }
        })
    }

    fn lookup_ipv6<'a>(&'a self, host: &'a str) -> ResolveFut<'a, Ipv6Addr> {
        Box::pin(async move {
            match self.inner.ipv6_lookup(host).await {
                Ok(lookup) => Ok(records(lookup.iter().map(|aaaa| aaaa.0).collect())),
                Err(e) if e.is_no_records_found() => Ok(Lookup::NoRecords),
                Err(e) => Err(ResolveFailure(e.to_string())),
            }
        })
    }
}

fn records<T>(found: Vec<T>) -> Lookup<T> {
    if found.is_empty() {
        Lookup::NoRecords
    } else {
        Lookup::Records(found)
    }
}

/// Fixed host table. Unknown hosts have no records.
///
/// Deterministic stand-in for DNS in tests and embedded setups.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
    failures: HashSet<(String, IpFamily)>,
}

impl StaticResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address record for `host`.
    pub fn with_address(mut self, host: &str, ip: IpAddr) -> Self {
        self.hosts
            .entry(host.to_ascii_lowercase())
            .or_default()
            .push(ip);
        self
    }

    /// Make lookups of `family` for `host` fail outright.
    pub fn with_failure(mut self, host: &str, family: IpFamily) -> Self {
        self.failures.insert((host.to_ascii_lowercase(), family));
        self
    }

    fn lookup(&self, host: &str, family: IpFamily) -> Result<Vec<IpAddr>, ResolveFailure> {
        let host = host.to_ascii_lowercase();
        if self.failures.contains(&(host.clone(), family)) {
            return Err(ResolveFailure(format!("SERVFAIL for {host}")));
        }
        Ok(self
            .hosts
            .get(&host)
            .map(|ips| {
                ips.iter()
                    .copied()
                    .filter(|ip| IpFamily::of(*ip) == family)
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl Resolver for StaticResolver {
    fn lookup_ipv4<'a>(&'a self, host: &'a str) -> ResolveFut<'a, Ipv4Addr> {
        let result = self.lookup(host, IpFamily::V4).map(|ips| {
            records(
                ips.into_iter()
                    .filter_map(|ip| match ip {
                        IpAddr::V4(v4) => Some(v4),
                        IpAddr::V6(_) => None,
                    })
                    .collect(),
            )
        });
        Box::pin(async move { result })
    }

    fn lookup_ipv6<'a>(&'a self, host: &'a str) -> ResolveFut<'a, Ipv6Addr> {
        let result = self.lookup(host, IpFamily::V6).map(|ips| {
            records(
                ips.into_iter()
                    .filter_map(|ip| match ip {
                        IpAddr::V6(v6) => Some(v6),
                        IpAddr::V4(_) => None,
                    })
                    .collect(),
            )
        });
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver_splits_families() {
        let resolver = StaticResolver::new()
            .with_address("media.example", "93.184.216.34".parse().unwrap())
            .with_address("media.example", "2606:2800:220:1::".parse().unwrap());

        let v4 = resolver.lookup_ipv4("media.example").await.unwrap();
        assert_eq!(v4, Lookup::Records(vec![Ipv4Addr::new(93, 184, 216, 34)]));

        let v6 = resolver.lookup_ipv6("MEDIA.example").await.unwrap();
        assert_eq!(v6.into_records().len(), 1);
    }

    #[tokio::test]
    async fn test_static_resolver_unknown_host_has_no_records() {
        let resolver = StaticResolver::new();
        assert_eq!(
            resolver.lookup_ipv4("nowhere.example").await.unwrap(),
            Lookup::NoRecords
        );
        assert_eq!(
            resolver.lookup_ipv6("nowhere.example").await.unwrap(),
            Lookup::NoRecords
        );
    }

    #[tokio::test]
    async fn test_static_resolver_failure() {
        let resolver = StaticResolver::new().with_failure("broken.example", IpFamily::V6);
        assert_eq!(
            resolver.lookup_ipv4("broken.example").await.unwrap(),
            Lookup::NoRecords
        );
        assert!(resolver.lookup_ipv6("broken.example").await.is_err());
    }
}
