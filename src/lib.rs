//! Courier - a single-backend HTTP forwarding gateway.
//!
//! Courier accepts HTTP traffic on one listener and relays `POST` requests on a
//! configured set of paths to a single backend, answering the caller with the
//! backend's status and body. Everything else is permanently redirected to the
//! backend, and `GET /ping` answers a liveness probe.
//!
//! # Features
//! - Cancellation-safe forwarding: a caller that disconnects never blocks or
//!   leaks the backend call serving it
//! - Uniform JSON error envelope for backend failures
//! - Graceful drain with a configurable grace period, then forced close
//! - Structured logging via `tracing`, metrics via the `metrics` facade
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier::{Gateway, GatewayServer, HttpClientAdapter, HttpHandler, ShutdownCoordinator};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = courier::config::load_config("conf/config.yaml").await?;
//! let client = Arc::new(HttpClientAdapter::new()?);
//! let gateway = Arc::new(Gateway::new(&cfg, client));
//! let server = GatewayServer::new(Arc::new(HttpHandler::new(gateway)));
//!
//! let shutdown = ShutdownCoordinator::with_grace_period(cfg.shutdown.grace_period()?);
//! let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
//! server.serve(listener, shutdown.shutdown_token()).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while
//! keeping routing and forwarding logic inside `core`.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{GatewayServer, HttpClientAdapter, HttpHandler, ShutdownError},
    core::{Gateway, LifecycleState},
    ports::http_client::HttpClient,
    utils::{ShutdownCoordinator, ShutdownReason, ShutdownToken},
};
