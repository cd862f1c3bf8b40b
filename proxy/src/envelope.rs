//! Headers and bodies wrapped around every response.
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_SECURITY_POLICY,
    CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::types::ProxyError;

const NO_STORE: &str = "no-store";
const NOSNIFF: &str = "nosniff";
const CSP_NONE: &str = "default-src 'none'";
const OCTET_STREAM: &str = "application/octet-stream";

const COEP: &str = "cross-origin-embedder-policy";
const COOP: &str = "cross-origin-opener-policy";

/// Envelope settings shared by every route.
#[derive(Debug, Clone, Copy, Default)]
pub struct Envelope {
    /// Also send COEP `require-corp` and COOP `same-origin`.
    pub isolation_headers: bool,
}

impl Envelope {
    fn stamp(self, headers: &mut HeaderMap) {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static(NOSNIFF));
        headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP_NONE));
        if self.isolation_headers {
            headers.insert(
                HeaderName::from_static(COEP),
                HeaderValue::from_static("require-corp"),
            );
            headers.insert(
                HeaderName::from_static(COOP),
                HeaderValue::from_static("same-origin"),
            );
        }
    }
}

/// Response middleware: stamp the envelope onto whatever the route produced.
pub async fn apply(State(envelope): State<Envelope>, mut response: Response) -> Response {
    envelope.stamp(response.headers_mut());
    response
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_json())).into_response()
    }
}

/// 200 response relaying an upstream body.
///
/// Only the media type and length cross over from upstream; every other
/// upstream header is dropped.
pub fn relay(content_type: Option<&HeaderValue>, content_length: Option<u64>, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        content_type
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(OCTET_STREAM)),
    );
    if let Some(len) = content_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}
