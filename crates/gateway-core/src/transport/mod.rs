//! Outbound transport to upstream services (§2 component 8, §4.8).

pub mod http;
pub mod ws;

pub use http::{classify_failure, HttpTransport};
pub use ws::{build_backend_url, dial_backend, BackendMessage, BackendWsStream};
