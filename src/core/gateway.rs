//! Core gateway state.
//!
//! `Gateway` joins the immutable route table, the backend target and the
//! forwarding protocol. It performs no socket I/O itself; the HTTP adapter calls
//! into it for routing decisions and forwarding.
use std::sync::Arc;

use crate::{
    config::GatewayConfig,
    core::{
        forwarding::ForwardingProtocol,
        route_table::{BackendTarget, RouteTable},
    },
    ports::http_client::HttpClient,
};

/// Path answered by the liveness check. Not configurable.
pub const PING_PATH: &str = "/ping";

pub struct Gateway {
    routes: RouteTable,
    forwarding: ForwardingProtocol,
    preserve_query: bool,
    max_body_bytes: usize,
}

impl Gateway {
    /// Build the gateway from a validated configuration.
    pub fn new(config: &GatewayConfig, client: Arc<dyn HttpClient>) -> Self {
        let routes = RouteTable::new(config.routes.iter().cloned());
        let backend = BackendTarget::new(&config.backend_host);

        if routes.is_empty() {
            tracing::warn!("No forwarded routes configured; every request except /ping redirects");
        }
        if routes.contains(PING_PATH) {
            tracing::warn!("{PING_PATH} is also a forwarded route; POST is forwarded, GET answers the health check");
        }
        tracing::info!(
            backend = %backend,
            routes = routes.len(),
            "Gateway initialised"
        );

        Self {
            routes,
            forwarding: ForwardingProtocol::new(client, backend),
            preserve_query: config.redirect.preserve_query,
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn backend(&self) -> &BackendTarget {
        self.forwarding.backend()
    }

    pub fn forwarding(&self) -> &ForwardingProtocol {
        &self.forwarding
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Redirect target for a request that matched nothing: backend + path, plus the
    /// query string only when configured to keep it.
    pub fn redirect_location(&self, path: &str, query: Option<&str>) -> String {
        if self.preserve_query {
            self.backend().join_with_query(path, query)
        } else {
            self.backend().join(path)
        }
    }
}
