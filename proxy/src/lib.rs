//! SSRF-hardened fetch proxy.
//!
//! Fetches a caller-supplied http(s) URL and relays the body. Every target,
//! the first one and every redirect hop, is validated and pinned to a single
//! public address before a socket is opened; the body is streamed under
//! idle, wall-clock, and size limits.

pub mod address;
pub mod config;
mod envelope;
pub mod redirect;
mod resolved;
pub mod resolver;
mod server;
pub mod stream;
pub mod transport;
pub mod types;
pub mod validate;

pub use config::{CONFIG_ENV_VAR, ConfigError, ProxyConfig};
pub use envelope::Envelope;
pub use redirect::{FinalResponse, walk};
pub use resolved::ResolvedConfig;
pub use resolver::{HickoryResolver, Lookup, ResolveFailure, Resolver, StaticResolver};
pub use server::{ProxyState, bind, router, serve};
pub use stream::StreamLimits;
pub use transport::{PinnedTransport, Transport, TransportFut};
pub use types::{ErrorCode, ErrorDetails, IpFamily, PinnedAddress, ProxyError, Target};
pub use validate::{Validated, validate};
