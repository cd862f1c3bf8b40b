//! Bounded relay of the upstream body.
//!
//! The body is forwarded chunk by chunk and never buffered whole. Two timers
//! run per response: an idle timer reset on every chunk and an absolute
//! deadline fixed when streaming starts. Whichever fires first ends the
//! stream with an error, which makes the server drop the connection; the
//! status line has already gone out by then.
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use thiserror::Error;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::types::{ErrorCode, ProxyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    /// Longest allowed gap between chunks.
    pub idle_timeout: Duration,
    /// Wall-clock budget for the whole body.
    pub max_duration: Duration,
    /// Largest body relayed.
    pub max_bytes: u64,
}

/// Why a relay was cut short after headers were sent.
#[derive(Debug, Error)]
pub enum StreamAbort {
    #[error("upstream sent nothing for {0:?}")]
    Idle(Duration),
    #[error("stream exceeded its {0:?} budget")]
    Deadline(Duration),
    #[error("body exceeded {0} bytes")]
    TooLarge(u64),
    #[error("upstream read failed: {0}")]
    Upstream(String),
}

/// Reject a declared `Content-Length` over the limit before any byte is sent.
pub fn check_declared_length(declared: Option<u64>, max_bytes: u64) -> Result<(), ProxyError> {
    match declared {
        Some(len) if len > max_bytes => Err(ProxyError::new(
            ErrorCode::PayloadTooLarge,
            "response exceeds size limit",
        )
        .with_detail("size", len.to_string())
        .with_detail("max_bytes", max_bytes.to_string())),
        _ => Ok(()),
    }
}

struct StreamSession<S> {
    upstream: Pin<Box<S>>,
    limits: StreamLimits,
    deadline: Instant,
    relayed: u64,
    finished: bool,
}

impl<S> Drop for StreamSession<S> {
    fn drop(&mut self) {
        if !self.finished {
            // Dropping `upstream` here closes the upstream connection.
            debug!(relayed = self.relayed, "client went away; upstream aborted");
        }
    }
}

/// Wrap an upstream byte stream with the idle, deadline, and size guards.
///
/// The deadline starts now. Dropping the returned stream (client
/// disconnect) drops the upstream with it.
pub fn guard<S, E>(
    upstream: S,
    limits: StreamLimits,
) -> impl Stream<Item = Result<Bytes, StreamAbort>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + 'static,
{
    let session = StreamSession {
        upstream: Box::pin(upstream),
        limits,
        deadline: Instant::now() + limits.max_duration,
        relayed: 0,
        finished: false,
    };

    stream::unfold(session, |mut session| async move {
        if session.finished {
            return None;
        }

        let idle_at = Instant::now() + session.limits.idle_timeout;
        let wake_at = idle_at.min(session.deadline);

        let item = match timeout_at(wake_at, session.upstream.next()).await {
            Ok(Some(Ok(chunk))) => {
                session.relayed += chunk.len() as u64;
                if session.relayed > session.limits.max_bytes {
                    Err(StreamAbort::TooLarge(session.limits.max_bytes))
                } else {
                    return Some((Ok(chunk), session));
                }
            }
            Ok(Some(Err(e))) => Err(StreamAbort::Upstream(e.to_string())),
            Ok(None) => {
                session.finished = true;
                info!(bytes = session.relayed, "relay complete");
                return None;
            }
            Err(_) if wake_at == session.deadline => {
                Err(StreamAbort::Deadline(session.limits.max_duration))
            }
            Err(_) => Err(StreamAbort::Idle(session.limits.idle_timeout)),
        };

        session.finished = true;
        if let Err(abort) = &item {
            warn!(bytes = session.relayed, reason = %abort, "relay aborted");
        }
        Some((item, session))
    })
}
