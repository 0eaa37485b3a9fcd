//! Edge Forwarder - a domain-aware redirect proxy for URL shorteners.
//!
//! Custom domains pointed at the forwarder are resolved by a single upstream origin: every
//! request is classified (health / debug / forward), forwarded with a strict header
//! allow-list plus forwarding headers that tell the upstream which custom domain was hit,
//! and the upstream's answer is mapped back to the client. Redirects are relayed
//! byte-for-byte, successes are decorated with CORS and identity headers, and anything else
//! becomes a branded "Link Not Found" page.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use edge_forwarder::{
//!     ForwarderService, HttpClientAdapter, HttpHandler,
//!     config::{ConfigOverrides, load_config},
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = Arc::new(load_config(Some("config.toml"), &ConfigOverrides::default()).await?);
//! let client = Arc::new(HttpClientAdapter::new(&config.upstream)?);
//! let forwarder = Arc::new(ForwarderService::new(config, client)?);
//! let handler = HttpHandler::new(forwarder);
//! // Mount `handler` behind `ForwarderServer` (see the binary crate)
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (hyper/axum implementations)
//! while keeping the forwarding rules inside `core`, which performs no I/O of its own.
//! Configuration is loaded once at startup and injected as an immutable value; there is no
//! mutable global state.
//!
//! # Error Handling
//! Module seams use `thiserror` enums; application-level code returns `eyre::Result<T>`
//! with `WrapErr` context. Request handling never fails: every error is rendered.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{ForwarderServer, HttpClientAdapter, HttpHandler},
    core::ForwarderService,
    ports::{HttpClient, HttpServer, RequestHandler},
    utils::GracefulShutdown,
};
