//! HTTP surface: the proxy endpoint, liveness route, and listener.
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::handler::HandlerWithoutStateExt;
use axum::http::Method;
use axum::http::header::CONTENT_TYPE;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use tokio::net::{TcpListener, TcpSocket};
use tower_http::services::ServeDir;
use tracing::{info, warn};
use url::form_urlencoded;

use crate::envelope::{self, Envelope};
use crate::redirect::{FinalResponse, walk};
use crate::resolved::{HEALTH_PATH, ResolvedConfig};
use crate::resolver::Resolver;
use crate::stream::{check_declared_length, guard};
use crate::transport::Transport;
use crate::types::{ErrorCode, ProxyError, Target};
use crate::validate::validate;

/// Shared state for every request.
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<ResolvedConfig>,
    pub resolver: Arc<dyn Resolver>,
    pub transport: Arc<dyn Transport>,
}

impl ProxyState {
    pub fn new(
        config: ResolvedConfig,
        resolver: Arc<dyn Resolver>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            transport,
        }
    }
}

/// Build the router. Every route, the fallback included, gets the envelope.
///
/// With a static directory configured, unmatched paths are served from it
/// and files it does not have fall through to the JSON 404.
pub fn router(state: ProxyState) -> Router {
    let wrap = Envelope {
        isolation_headers: state.config.isolation_headers,
    };
    let proxy_path = state.config.path.clone();

    let routes = Router::new()
        .route(&proxy_path, any(proxy))
        .route(HEALTH_PATH, get(healthz));
    let routes = match &state.config.static_dir {
        Some(dir) => {
            routes.fallback_service(ServeDir::new(dir).not_found_service(not_found.into_service()))
        }
        None => routes.fallback(not_found),
    };

    routes
        .layer(middleware::map_response_with_state(wrap, envelope::apply))
        .with_state(state)
}

/// Bind with `SO_REUSEADDR` so a restarted host can reclaim its port.
pub fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(1024)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(listener: TcpListener, state: ProxyState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn proxy(
    State(state): State<ProxyState>,
    method: Method,
    RawQuery(query): RawQuery,
) -> Response {
    match fetch(&state, &method, query.as_deref()).await {
        Ok(response) => response,
        Err(err) => {
            warn!(
                code = %err.code,
                status = err.status().as_u16(),
                details = %err.details,
                "rejected: {}",
                err.message
            );
            err.into_response()
        }
    }
}

async fn fetch(
    state: &ProxyState,
    method: &Method,
    query: Option<&str>,
) -> Result<Response, ProxyError> {
    if method != Method::GET {
        return Err(
            ProxyError::new(ErrorCode::MethodNotAllowed, "method not allowed")
                .with_detail("method", method.as_str()),
        );
    }

    let raw = query_param(query, "url")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ProxyError::new(ErrorCode::MissingUrl, "missing url parameter"))?;
    let requested = Target::parse(&raw)?;

    let origin = validate(requested.url().clone(), state.resolver.as_ref()).await?;
    let FinalResponse {
        target,
        response,
        redirects,
    } = walk(
        origin,
        state.resolver.as_ref(),
        state.transport.as_ref(),
        state.config.max_redirects,
    )
    .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProxyError::new(
            ErrorCode::UpstreamStatus,
            format!("upstream returned status {}", status.as_u16()),
        )
        .with_detail("url", target.url().as_str()));
    }

    let limits = state.config.limits;
    let content_length = response.content_length();
    check_declared_length(content_length, limits.max_bytes)
        .map_err(|e| e.with_detail("url", target.url().as_str()))?;

    let content_type = response.headers().get(CONTENT_TYPE).cloned();
    info!(
        url = %target,
        status = status.as_u16(),
        redirects,
        content_length,
        "relaying upstream body"
    );

    let body = Body::from_stream(guard(response.bytes_stream(), limits));
    Ok(envelope::relay(content_type.as_ref(), content_length, body))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn not_found() -> ProxyError {
    ProxyError::new(ErrorCode::NotFound, "not found")
}

/// First value of `key` in a raw query string, percent-decoded.
fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_decodes() {
        let query = "url=https%3A%2F%2Fcdn.example.com%2Fa.flac%3Fsig%3Dabc&x=1";
        assert_eq!(
            query_param(Some(query), "url").as_deref(),
            Some("https://cdn.example.com/a.flac?sig=abc")
        );
    }

    #[test]
    fn test_query_param_first_wins() {
        assert_eq!(
            query_param(Some("url=a&url=b"), "url").as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_query_param_absent() {
        assert_eq!(query_param(None, "url"), None);
        assert_eq!(query_param(Some("src=x"), "url"), None);
        assert_eq!(query_param(Some("url="), "url").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_bind_reports_address() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }
}
