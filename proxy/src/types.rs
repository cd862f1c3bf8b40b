//! Domain types for the fetch proxy.
//!
//! Targets, pinned addresses, and the structured error every stage returns.

use std::fmt;
use std::net::IpAddr;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// A parsed upstream URL whose scheme is known to be http or https.
///
/// Built fresh for the origin request and for every redirect hop; a hop
/// never mutates a `Target`, it replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
}

impl Target {
    /// # Errors
    ///
    /// - `BadProtocol` if the scheme is not http or https
    /// - `MalformedUrl` if the URL has no host
    pub fn from_url(url: Url) -> Result<Self, ProxyError> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ProxyError::new(
                    ErrorCode::BadProtocol,
                    format!("scheme '{scheme}' not allowed; only http and https are supported"),
                )
                .with_detail("scheme", scheme));
            }
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(
                ProxyError::new(ErrorCode::MalformedUrl, "URL has no host")
                    .with_detail("url", url.as_str()),
            );
        }

        Ok(Self { url })
    }

    /// Parse a caller-supplied absolute URL.
    ///
    /// # Errors
    ///
    /// `MalformedUrl` for anything `url::Url` rejects, then the checks of
    /// [`Target::from_url`].
    pub fn parse(raw: &str) -> Result<Self, ProxyError> {
        let url = Url::parse(raw.trim()).map_err(|e| {
            ProxyError::new(ErrorCode::MalformedUrl, format!("invalid URL: {e}"))
                .with_detail("url", raw)
        })?;
        Self::from_url(url)
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host as it appears in the URL; IPv6 literals keep their brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Host for DNS and connection pinning, with IPv6 brackets removed.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.url.domain()
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    #[must_use]
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{query}", self.url.path()),
            None => self.url.path().to_string(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Address family of an IP address or literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    #[must_use]
    pub const fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    /// The numeric family, 4 or 6.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::V4 => 4,
            Self::V6 => 6,
        }
    }
}

/// The single validated address all I/O for one hop must use.
///
/// Produced by the validator and handed to the transport as-is; the
/// hostname is never resolved again for that hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinnedAddress {
    pub ip: IpAddr,
    pub family: IpFamily,
}

impl PinnedAddress {
    #[must_use]
    pub const fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            family: IpFamily::of(ip),
        }
    }
}

impl fmt::Display for PinnedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.ip.fmt(f)
    }
}

/// Proxy error with a stable code and structured details.
///
/// The `message` is what the caller sees in the `{"error": ...}` body;
/// `details` only reach the logs.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProxyError {
    pub code: ErrorCode,
    pub message: String,
    pub details: ErrorDetails,
}

impl ProxyError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: ErrorDetails::default(),
        }
    }

    /// Add a detail field.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.0.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.code.status()
    }

    /// Body sent to the caller.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.message })
    }
}

/// Error codes. Every code is terminal for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// `url` query parameter absent or empty.
    MissingUrl,
    /// URL could not be parsed or has no host.
    MalformedUrl,
    /// Non-http(s) scheme.
    BadProtocol,
    /// Host or a resolved address is private, loopback, link-local or multicast.
    PrivateNetwork,
    /// DNS produced no usable address.
    DnsFailure,
    /// Connect failed or timed out.
    UpstreamUnreachable,
    /// Redirect limit exceeded.
    TooManyRedirects,
    /// Redirect without a usable `Location`.
    InvalidRedirect,
    /// Upstream answered with a non-2xx final status.
    UpstreamStatus,
    /// Declared body larger than the limit.
    PayloadTooLarge,
    /// Method other than GET.
    MethodNotAllowed,
    /// No route for the request path.
    NotFound,
}

impl ErrorCode {
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::MissingUrl | Self::MalformedUrl | Self::BadProtocol | Self::DnsFailure => {
                StatusCode::BAD_REQUEST
            }
            Self::PrivateNetwork => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UpstreamUnreachable
            | Self::TooManyRedirects
            | Self::InvalidRedirect
            | Self::UpstreamStatus => StatusCode::BAD_GATEWAY,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingUrl => "missing_url",
            Self::MalformedUrl => "malformed_url",
            Self::BadProtocol => "bad_protocol",
            Self::PrivateNetwork => "private_network",
            Self::DnsFailure => "dns_failure",
            Self::UpstreamUnreachable => "upstream_unreachable",
            Self::TooManyRedirects => "too_many_redirects",
            Self::InvalidRedirect => "invalid_redirect",
            Self::UpstreamStatus => "upstream_status",
            Self::PayloadTooLarge => "payload_too_large",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error details as key-value pairs.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetails(pub Vec<(String, String)>);

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}
