//! Lightweight metrics helpers for Courier.
//!
//! Thin wrappers over the `metrics` crate macros. No exporter is embedded; the
//! embedding application may install any compatible recorder, otherwise every
//! call is a no-op.
//!
//! Provided metrics:
//! * `courier_requests_total` (counter: path, method, status)
//! * `courier_request_duration_seconds` (histogram: path, method)
//! * `courier_backend_requests_total` (counter: path, status)
//! * `courier_backend_request_duration_seconds` (histogram: path)
//! * `courier_discarded_responses_total` (counter: path)
//! * `courier_in_flight_forwards` (gauge)
//!
//! The timer structs use `Drop` so durations are recorded on every exit path,
//! including cancellation.
use std::time::{Duration, Instant};

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

pub const COURIER_REQUESTS_TOTAL: &str = "courier_requests_total";
pub const COURIER_REQUEST_DURATION_SECONDS: &str = "courier_request_duration_seconds";
pub const COURIER_BACKEND_REQUESTS_TOTAL: &str = "courier_backend_requests_total";
pub const COURIER_BACKEND_REQUEST_DURATION_SECONDS: &str =
    "courier_backend_request_duration_seconds";
pub const COURIER_DISCARDED_RESPONSES_TOTAL: &str = "courier_discarded_responses_total";
pub const COURIER_IN_FLIGHT_FORWARDS: &str = "courier_in_flight_forwards";

static DESCRIBED: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        COURIER_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests processed by the gateway."
    );
    describe_histogram!(
        COURIER_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests processed by the gateway."
    );
    describe_counter!(
        COURIER_BACKEND_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of requests forwarded to the backend."
    );
    describe_histogram!(
        COURIER_BACKEND_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of requests forwarded to the backend."
    );
    describe_counter!(
        COURIER_DISCARDED_RESPONSES_TOTAL,
        Unit::Count,
        "Backend responses produced after their caller had gone away."
    );
    describe_gauge!(
        COURIER_IN_FLIGHT_FORWARDS,
        "Backend calls currently in progress."
    );
});

/// Increment the total request counter for an inbound gateway request.
pub fn increment_request_total(path: &str, method: &str, status: u16) {
    counter!(
        COURIER_REQUESTS_TOTAL,
        "path" => path.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed inbound request's duration.
pub fn record_request_duration(path: &str, method: &str, duration: Duration) {
    histogram!(
        COURIER_REQUEST_DURATION_SECONDS,
        "path" => path.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Count one completed backend call. Synthesized failures are recorded with status 500.
pub fn increment_backend_request_total(path: &str, status: u16) {
    counter!(
        COURIER_BACKEND_REQUESTS_TOTAL,
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_backend_request_duration(path: &str, duration: Duration) {
    histogram!(
        COURIER_BACKEND_REQUEST_DURATION_SECONDS,
        "path" => path.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn increment_discarded_responses(path: &str) {
    counter!(COURIER_DISCARDED_RESPONSES_TOTAL, "path" => path.to_string()).increment(1);
}

/// RAII helper measuring backend call duration and the in-flight gauge.
pub struct BackendRequestTimer {
    start: Instant,
    path: String,
}

impl BackendRequestTimer {
    pub fn new(path: &str) -> Self {
        gauge!(COURIER_IN_FLIGHT_FORWARDS).increment(1.0);
        Self {
            start: Instant::now(),
            path: path.to_string(),
        }
    }
}

impl Drop for BackendRequestTimer {
    fn drop(&mut self) {
        gauge!(COURIER_IN_FLIGHT_FORWARDS).decrement(1.0);
        record_backend_request_duration(&self.path, self.start.elapsed());
    }
}

/// Register metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    Lazy::force(&DESCRIBED);
    tracing::debug!("Courier metric descriptions registered");
    Ok(())
}
