//! Hostname and IP classification.
//!
//! Pure functions: parse a hostname into an IP literal and decide whether an
//! address is private or reserved. Anything that fails to parse as the
//! family it claims to be is treated as private.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::types::IpFamily;

/// An IP literal recognized in a hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpLiteral {
    pub family: IpFamily,
    /// Dotted quad for IPv4 (including decoded IPv4-mapped forms), lower-cased
    /// text without brackets for IPv6.
    pub address: String,
}

impl IpLiteral {
    fn v4(address: impl Into<String>) -> Self {
        Self {
            family: IpFamily::V4,
            address: address.into(),
        }
    }

    /// The literal as a typed address, `None` if it is malformed.
    #[must_use]
    pub fn ip(&self) -> Option<IpAddr> {
        match self.family {
            IpFamily::V4 => parse_dotted_quad(&self.address).map(|o| IpAddr::V4(Ipv4Addr::from(o))),
            IpFamily::V6 => self.address.parse::<Ipv6Addr>().ok().map(IpAddr::V6),
        }
    }
}

/// Parse a hostname as an IP literal.
///
/// Recognized, in order: `::ffff:a.b.c.d`, `::ffff:HHHH:HHHH`, dotted IPv4,
/// and any string containing `:` as IPv6. Ordinary hostnames return `None`
/// and must go through DNS.
#[must_use]
pub fn parse_literal(hostname: &str) -> Option<IpLiteral> {
    let host = strip_brackets(hostname.trim());
    let lower = host.to_ascii_lowercase();

    if let Some(rest) = lower.strip_prefix("::ffff:") {
        if looks_dotted(rest) {
            return Some(IpLiteral::v4(rest));
        }
        if let Some(octets) = decode_mapped_hex(rest) {
            let [a, b, c, d] = octets;
            return Some(IpLiteral::v4(format!("{a}.{b}.{c}.{d}")));
        }
    }

    if looks_dotted(host) {
        return Some(IpLiteral::v4(host));
    }

    if host.contains(':') {
        return Some(IpLiteral {
            family: IpFamily::V6,
            address: lower,
        });
    }

    None
}

/// Loopback, RFC 1918, link-local, "this network", CGN, benchmarking, and
/// everything from 224.0.0.0 up. Malformed input is private.
#[must_use]
pub fn is_private_ipv4(addr: &str) -> bool {
    parse_dotted_quad(addr).is_none_or(octets_private)
}

/// Loopback, unspecified, ULA (`fc00::/7`), link-local (`fe80::/10`),
/// multicast, any IPv4-mapped form, and IPv4-compatible, NAT64, or 6to4
/// addresses whose embedded IPv4 is private. Malformed input is private.
#[must_use]
pub fn is_private_ipv6(addr: &str) -> bool {
    strip_brackets(addr.trim())
        .parse::<Ipv6Addr>()
        .map_or(true, ipv6_private)
}

/// `localhost` and private literals. Non-literal hostnames are not private
/// here; DNS resolution decides for them.
#[must_use]
pub fn is_private_host(hostname: &str) -> bool {
    let host = hostname.trim().trim_end_matches('.');
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    match parse_literal(host) {
        Some(literal) => match literal.family {
            IpFamily::V4 => is_private_ipv4(&literal.address),
            IpFamily::V6 => is_private_ipv6(&literal.address),
        },
        None => false,
    }
}

/// Typed form used for resolver output.
#[must_use]
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => octets_private(v4.octets()),
        IpAddr::V6(v6) => ipv6_private(v6),
    }
}

fn octets_private([a, b, _, _]: [u8; 4]) -> bool {
    match a {
        0 | 10 | 127 => true,
        100 => (64..=127).contains(&b),
        169 => b == 254,
        172 => (16..=31).contains(&b),
        192 => b == 168,
        198 => b == 18 || b == 19,
        224.. => true,
        _ => false,
    }
}

fn ipv6_private(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.to_ipv4_mapped().is_some() {
        return true;
    }

    if let Some(embedded) = embedded_ipv4(ip) {
        return octets_private(embedded);
    }

    let [first, second, ..] = ip.octets();
    // fc00::/7
    if first & 0xfe == 0xfc {
        return true;
    }
    // fe80::/10 covers fe80 through febf
    if first == 0xfe && (0x80..=0xbf).contains(&second) {
        return true;
    }
    first == 0xff
}

/// IPv4 carried inside IPv4-compatible (`::a.b.c.d`), NAT64
/// (`64:ff9b::/96`), and 6to4 (`2002::/16`) addresses.
fn embedded_ipv4(ip: Ipv6Addr) -> Option<[u8; 4]> {
    let o = ip.octets();
    let tail = [o[12], o[13], o[14], o[15]];
    match ip.segments() {
        [0, 0, 0, 0, 0, 0, _, _] | [0x64, 0xff9b, 0, 0, 0, 0, _, _] => Some(tail),
        [0x2002, ..] => Some([o[2], o[3], o[4], o[5]]),
        _ => None,
    }
}

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

fn looks_dotted(host: &str) -> bool {
    host.contains('.') && host.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn parse_dotted_quad(addr: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = addr.split('.');
    for slot in &mut octets {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}

fn decode_mapped_hex(rest: &str) -> Option<[u8; 4]> {
    let (high, low) = rest.split_once(':')?;
    let high = parse_hex_group(high)?;
    let low = parse_hex_group(low)?;
    let [a, b] = high.to_be_bytes();
    let [c, d] = low.to_be_bytes();
    Some([a, b, c, d])
}

fn parse_hex_group(group: &str) -> Option<u16> {
    if group.is_empty() || group.len() > 4 {
        return None;
    }
    u16::from_str_radix(group, 16).ok()
}
