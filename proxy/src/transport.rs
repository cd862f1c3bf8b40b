//! HTTP transport pinned to a pre-validated address.
//!
//! The socket goes to the pinned IP; the URL keeps the requested hostname so
//! `Host` and TLS SNI/certificate checks stay correct. Redirects are never
//! followed here: 3xx responses come back to the caller untouched.
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use reqwest::redirect::Policy;
use tokio::time::timeout;
use tracing::debug;

use crate::resolved::ResolvedConfig;
use crate::types::{ErrorCode, PinnedAddress, ProxyError, Target};

/// Transport future type alias.
pub type TransportFut<'a> =
    Pin<Box<dyn Future<Output = Result<reqwest::Response, ProxyError>> + Send + 'a>>;

pub trait Transport: Send + Sync {
    /// Issue a GET for `target`, connecting only to `pinned`.
    fn send<'a>(&'a self, target: &'a Target, pinned: PinnedAddress) -> TransportFut<'a>;
}

/// reqwest-backed transport. Builds one client per hop, so a connection is
/// never reused across a changed pinned address.
#[derive(Debug, Clone)]
pub struct PinnedTransport {
    user_agent: String,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl PinnedTransport {
    #[must_use]
    pub fn new(config: &ResolvedConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            connect_timeout: config.connect_timeout,
            response_timeout: config.limits.idle_timeout,
        }
    }

    fn build_client(&self, target: &Target, addr: SocketAddr) -> Result<reqwest::Client, ProxyError> {
        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            .no_proxy()
            .user_agent(&self.user_agent)
            .connect_timeout(self.connect_timeout);

        // Literal hosts already connect to the pinned address.
        if let Some(domain) = target.domain() {
            builder = builder.resolve(domain, addr);
        }

        builder.build().map_err(|e| {
            ProxyError::new(
                ErrorCode::UpstreamUnreachable,
                format!("failed to build HTTP client: {e}"),
            )
        })
    }
}

impl Transport for PinnedTransport {
    fn send<'a>(&'a self, target: &'a Target, pinned: PinnedAddress) -> TransportFut<'a> {
        Box::pin(async move {
            let addr = SocketAddr::new(pinned.ip, target.port());
            let client = self.build_client(target, addr)?;

            debug!(url = %target, addr = %addr, "connecting to pinned address");
            let request = client.get(target.url().clone()).send();
            let response = timeout(self.response_timeout, request)
                .await
                .map_err(|_| {
                    ProxyError::new(ErrorCode::UpstreamUnreachable, "upstream did not respond")
                        .with_detail("url", target.url().as_str())
                        .with_detail("addr", addr.to_string())
                })?
                .map_err(|e| unreachable_error(target, addr, &e))?;

            debug!(url = %target, status = response.status().as_u16(), "upstream responded");
            Ok(response)
        })
    }
}

fn unreachable_error(target: &Target, addr: SocketAddr, err: &reqwest::Error) -> ProxyError {
    let message = if err.is_timeout() {
        "upstream connection timed out"
    } else {
        "upstream unreachable"
    };
    ProxyError::new(ErrorCode::UpstreamUnreachable, message)
        .with_detail("url", target.url().as_str())
        .with_detail("addr", addr.to_string())
        .with_detail("error", err.to_string())
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, TcpListener};

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::ProxyConfig;

    fn transport() -> PinnedTransport {
        let config = ResolvedConfig::from_config(&ProxyConfig::default()).unwrap();
        PinnedTransport::new(&config)
    }

    #[tokio::test]
    async fn test_connects_to_pinned_address_not_dns() {
        let server = MockServer::start().await;
        let port = server.address().port();
        Mock::given(method("GET"))
            .and(path("/track.wav"))
            .and(header("host", format!("media.invalid:{port}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("RIFF"))
            .expect(1)
            .mount(&server)
            .await;

        // .invalid never resolves, so this only succeeds if the pin is used.
        let target = Target::parse(&format!("http://media.invalid:{port}/track.wav")).unwrap();
        let pinned = PinnedAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let response = transport().send(&target, pinned).await.unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text().await.unwrap(), "RIFF");
    }

    #[tokio::test]
    async fn test_does_not_follow_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/moved"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "http://127.0.0.1:1/"),
            )
            .mount(&server)
            .await;

        let target = Target::parse(&format!("{}/moved", server.uri())).unwrap();
        let pinned = PinnedAddress::new(server.address().ip());
        let response = transport().send(&target, pinned).await.unwrap();

        assert_eq!(response.status().as_u16(), 302);
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = Target::parse(&format!("http://gone.invalid:{port}/")).unwrap();
        let pinned = PinnedAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let err = transport().send(&target, pinned).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::UpstreamUnreachable);
    }
}
