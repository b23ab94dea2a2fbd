//! Axum middleware used by the gateway router.
use std::{net::SocketAddr, time::Instant};

use axum::{
    extract::{ConnectInfo, MatchedPath, Request},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::{metrics, tracing_setup};

/// Label used for requests that matched no registered route.
const UNMATCHED_ROUTE: &str = "<unmatched>";

/// One structured log line per request, plus request metrics and an `X-Request-ID`
/// response header.
///
/// Metrics are labelled with the matched route pattern rather than the raw path so
/// that redirected traffic cannot grow label cardinality without bound.
pub async fn access_log_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();

    let span = tracing_setup::create_request_span(method.as_str(), &path, &request_id);
    let mut response = next.run(req).instrument(span.clone()).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();
    span.record("http.status_code", status);
    span.record("duration_ms", latency.as_millis() as u64);

    tracing::info!(
        parent: &span,
        request_id = %request_id,
        status,
        method = %method,
        path = %path,
        query = %query,
        ip = %ip,
        latency_ms = latency.as_secs_f64() * 1000.0,
        "Request completed"
    );

    metrics::increment_request_total(&route, method.as_str(), status);
    metrics::record_request_duration(&route, method.as_str(), latency);

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", header_value);
    }

    response
}
