//! Redirect handling with validation at every hop.
//!
//! The transport never follows redirects. This loop reads each `Location`,
//! resolves it against the current URL, and runs the full target validation
//! on it before any connection to the new destination is made.
use reqwest::header::LOCATION;
use tracing::debug;

use crate::resolver::Resolver;
use crate::transport::Transport;
use crate::types::{ErrorCode, ProxyError, Target};
use crate::validate::{Validated, validate};

/// The non-3xx response that ends a chain.
#[derive(Debug)]
pub struct FinalResponse {
    /// URL that produced `response`.
    pub target: Target,
    pub response: reqwest::Response,
    /// Redirects followed to get here.
    pub redirects: u32,
}

/// Drive the request through at most `max_redirects` redirects.
///
/// # Errors
///
/// - anything [`validate`] or the transport returns for a hop
/// - `InvalidRedirect` for a missing or unresolvable `Location`
/// - `TooManyRedirects` when another redirect arrives after `max_redirects`
pub async fn walk(
    origin: Validated,
    resolver: &dyn Resolver,
    transport: &dyn Transport,
    max_redirects: u32,
) -> Result<FinalResponse, ProxyError> {
    let mut current = origin;
    let mut redirects = 0u32;

    loop {
        let response = transport.send(&current.target, current.pinned).await?;
        let status = response.status();

        if !status.is_redirection() {
            return Ok(FinalResponse {
                target: current.target,
                response,
                redirects,
            });
        }

        redirects += 1;
        if redirects > max_redirects {
            return Err(
                ProxyError::new(ErrorCode::TooManyRedirects, "too many redirects")
                    .with_detail("max", max_redirects.to_string())
                    .with_detail("url", current.target.url().as_str()),
            );
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();
        if location.is_empty() {
            return Err(
                ProxyError::new(ErrorCode::InvalidRedirect, "redirect missing Location header")
                    .with_detail("url", current.target.url().as_str())
                    .with_detail("status", status.as_u16().to_string()),
            );
        }

        let next_url = current.target.url().join(location).map_err(|e| {
            ProxyError::new(ErrorCode::InvalidRedirect, "invalid redirect URL")
                .with_detail("location", location)
                .with_detail("error", e.to_string())
        })?;

        // Per-hop clients are not pooled; dropping releases the socket.
        drop(response);

        debug!(
            hop = redirects,
            from = %current.target,
            to = %next_url,
            "following redirect"
        );
        current = validate(next_url, resolver).await?;
    }
}
