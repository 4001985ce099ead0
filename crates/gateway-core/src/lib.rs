//! # Aussie Gateway core
//!
//! The request-handling pipeline for a programmable API gateway: route
//! resolution, authentication/authorization, rate limiting, request
//! preparation, and HTTP/WebSocket transport, backed by a cache-and-store
//! service registry and a pluggable rate-limit engine.
//!
//! ## Module organization
//!
//! - [`model`] — value types shared across the pipeline (services, routes,
//!   rate-limit records, requests/responses, tokens, WS sessions).
//! - [`routing`] — the glob path matcher and the service registry.
//! - [`net`] — trusted-proxy validation and forwarding-header construction.
//! - [`auth`] — credential extraction, token validation, RBAC, downstream
//!   token minting.
//! - [`ratelimit`] — the token-bucket algorithm and its in-memory/distributed
//!   backends.
//! - [`prepare`] — outbound request preparation (header filtering, Host
//!   rewrite, forwarding headers).
//! - [`pipeline`] — the HTTP and WebSocket gateway pipelines that orchestrate
//!   the above.
//! - [`transport`] — outbound HTTP client and WebSocket dialer.
//! - [`ports`] — trait contracts for the external collaborators (registry
//!   repository, auth stores, metrics, tracing, rate-limit backend).
//! - [`session_table`] — the process-wide table of live WebSocket sessions.
//! - [`config`] — gateway configuration loading and validation.
//! - [`logs`] — structured logging setup.
//! - [`error`] — the central error vocabulary.

pub mod auth;
pub mod config;
pub mod error;
pub mod logs;
pub mod model;
pub mod net;
pub mod pipeline;
pub mod ports;
pub mod prepare;
pub mod ratelimit;
pub mod routing;
pub mod session_table;
pub mod transport;

pub use error::GatewayError;
