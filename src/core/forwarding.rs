//! Cancellation-safe request forwarding.
//!
//! Each forwarded request owns a single-use delivery slot (a `oneshot` channel).
//! The backend call runs as an independent task holding the sending half; the
//! caller awaits the receiving half. A caller that goes away simply drops the
//! `forward` future, which is how the server reports a disconnect and how a
//! caller-side deadline (`tokio::time::timeout`) expires.
//!
//! Properties that follow from this shape:
//! * The producer never blocks on delivery. `oneshot::Sender::send` returns
//!   immediately, and fails harmlessly once the receiver is gone.
//! * At most one value ever crosses the slot, and the caller observes at most one
//!   outcome.
//! * Neither side closes the slot explicitly. Dropping either half is the only
//!   signal the other side needs.
//! * A backend call started for a caller that then disconnects still runs to
//!   completion; its response is discarded and counted.
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use http_body_util::BodyExt;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::{
    core::{
        envelope::{RequestEnvelope, ResponseEnvelope},
        route_table::BackendTarget,
    },
    metrics,
    ports::http_client::{HttpClient, HttpClientError},
    tracing_setup,
};

/// Reasons a backend call fails to yield a response.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to build backend request: {0}")]
    Construct(#[from] http::Error),

    #[error(transparent)]
    Transport(#[from] HttpClientError),

    #[error("failed to read backend response body: {0}")]
    ReadBody(String),
}

#[derive(Debug, Default)]
struct ForwardingStats {
    delivered: AtomicU64,
    abandoned: AtomicU64,
    discarded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the forwarding counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardingSnapshot {
    pub delivered: u64,
    pub abandoned: u64,
    pub discarded: u64,
    pub failed: u64,
}

/// Forwards captured requests to the single backend.
pub struct ForwardingProtocol {
    client: Arc<dyn HttpClient>,
    backend: BackendTarget,
    tasks: TaskTracker,
    stats: Arc<ForwardingStats>,
}

impl ForwardingProtocol {
    pub fn new(client: Arc<dyn HttpClient>, backend: BackendTarget) -> Self {
        Self {
            client,
            backend,
            tasks: TaskTracker::new(),
            stats: Arc::new(ForwardingStats::default()),
        }
    }

    pub fn backend(&self) -> &BackendTarget {
        &self.backend
    }

    /// Tracker owning every spawned backend call. Closing and awaiting it lets
    /// shutdown wait for calls whose callers have already gone.
    pub fn background_tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub fn stats(&self) -> ForwardingSnapshot {
        ForwardingSnapshot {
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            abandoned: self.stats.abandoned.load(Ordering::Relaxed),
            discarded: self.stats.discarded.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Forward `envelope` to the backend and wait for its response.
    ///
    /// Dropping the returned future abandons the delivery: nothing is returned to
    /// the caller, while the backend call keeps running and its result is
    /// discarded on arrival.
    pub async fn forward(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let path = envelope.path.clone();
        let url = self.backend.join(&path);
        let span =
            tracing_setup::create_backend_span(self.backend.as_str(), envelope.method.as_str(), &path);

        let (slot, delivery) = oneshot::channel::<ResponseEnvelope>();

        let client = Arc::clone(&self.client);
        let stats = Arc::clone(&self.stats);
        let producer_path = path.clone();
        self.tasks.spawn(
            async move {
                let path = producer_path;
                let response = dispatch(client.as_ref(), &url, &path, envelope, &stats).await;
                if let Err(unclaimed) = slot.send(response) {
                    stats.discarded.fetch_add(1, Ordering::Relaxed);
                    metrics::increment_discarded_responses(&path);
                    tracing::debug!(
                        path = %path,
                        status = unclaimed.status.as_u16(),
                        "Caller gone; discarding backend response"
                    );
                }
            }
            .instrument(span),
        );

        let mut pending = PendingDelivery::new(&self.stats, delivery, path);
        let outcome = (&mut pending.slot).await;
        pending.settle();

        let response = outcome.unwrap_or_else(|_| {
            tracing::error!("Backend task ended without producing a response");
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            ResponseEnvelope::error("backend call terminated unexpectedly")
        });
        self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        response
    }
}

/// Receiving half of a delivery slot that records an abandonment when dropped
/// before a response was taken.
struct PendingDelivery<'a> {
    stats: &'a ForwardingStats,
    slot: oneshot::Receiver<ResponseEnvelope>,
    path: String,
    settled: bool,
}

impl<'a> PendingDelivery<'a> {
    fn new(
        stats: &'a ForwardingStats,
        slot: oneshot::Receiver<ResponseEnvelope>,
        path: String,
    ) -> Self {
        Self {
            stats,
            slot,
            path,
            settled: false,
        }
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for PendingDelivery<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
        tracing::info!(path = %self.path, "Caller went away before the backend responded");

        // The producer may have filled the slot in the same instant; that value is lost too.
        if self.slot.try_recv().is_ok() {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            metrics::increment_discarded_responses(&self.path);
        }
    }
}

async fn dispatch(
    client: &dyn HttpClient,
    url: &str,
    path: &str,
    envelope: RequestEnvelope,
    stats: &ForwardingStats,
) -> ResponseEnvelope {
    let _timer = metrics::BackendRequestTimer::new(path);

    let response = match call_backend(client, url, envelope).await {
        Ok(response) => response,
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, url = %url, "Backend call failed");
            ResponseEnvelope::error(e.to_string())
        }
    };

    tracing::Span::current().record("http.status_code", response.status.as_u16());
    metrics::increment_backend_request_total(path, response.status.as_u16());
    response
}

async fn call_backend(
    client: &dyn HttpClient,
    url: &str,
    envelope: RequestEnvelope,
) -> Result<ResponseEnvelope, ForwardError> {
    let request = envelope.into_request(url)?;
    let response = client.send_request(request).await?;
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| ForwardError::ReadBody(e.to_string()))?
        .to_bytes();
    Ok(ResponseEnvelope::new(status, body))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body as AxumBody;
    use bytes::Bytes;
    use hyper::{HeaderMap, Method, Request, Response, StatusCode};
    use tokio::sync::Notify;

    use super::*;
    use crate::ports::http_client::HttpClientResult;

    /// Backend double: echoes the request body back with the configured status,
    /// optionally after waiting for `release`.
    struct MockBackend {
        status: StatusCode,
        release: Option<Arc<Notify>>,
        delay: Option<Duration>,
        fail: bool,
        seen: std::sync::Mutex<Vec<(String, HeaderMap)>>,
    }

    impl MockBackend {
        fn answering(status: StatusCode) -> Self {
            Self {
                status,
                release: None,
                delay: None,
                fail: false,
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn gated(release: Arc<Notify>) -> Self {
            Self {
                release: Some(release),
                ..Self::answering(StatusCode::OK)
            }
        }

        fn delayed(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::answering(StatusCode::OK)
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::answering(StatusCode::OK)
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockBackend {
        async fn send_request(
            &self,
            req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            self.seen
                .lock()
                .unwrap()
                .push((req.uri().to_string(), req.headers().clone()));
            if let Some(release) = &self.release {
                release.notified().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(HttpClientError::ConnectionError(
                    "connection refused".to_string(),
                ));
            }
            let body = req.into_body().collect().await.unwrap().to_bytes();
            Ok(Response::builder()
                .status(self.status)
                .body(AxumBody::from(body))
                .unwrap())
        }
    }

    fn envelope(path: &str, body: &'static str) -> RequestEnvelope {
        let mut headers = HeaderMap::new();
        headers.insert("x-source-host", "gw.example.com".parse().unwrap());
        RequestEnvelope {
            method: Method::POST,
            path: path.to_string(),
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn protocol(backend: Arc<MockBackend>) -> ForwardingProtocol {
        ForwardingProtocol::new(backend, BackendTarget::new("http://sap.internal"))
    }

    #[tokio::test]
    async fn delivers_backend_status_and_body() {
        let backend = Arc::new(MockBackend::answering(StatusCode::CREATED));
        let forwarding = protocol(backend.clone());

        let response = forwarding.forward(envelope("/orders", "hello")).await;

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body, Bytes::from_static(b"hello"));

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].0, "http://sap.internal/orders");
        assert_eq!(seen[0].1.get("x-source-host").unwrap(), "gw.example.com");
        drop(seen);

        assert_eq!(
            forwarding.stats(),
            ForwardingSnapshot {
                delivered: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn backend_status_passes_through_unchanged() {
        let backend = Arc::new(MockBackend::answering(StatusCode::BAD_GATEWAY));
        let forwarding = protocol(backend);

        let response = forwarding.forward(envelope("/x", "{}")).await;
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(forwarding.stats().failed, 0);
    }

    #[tokio::test]
    async fn transport_failure_becomes_error_envelope() {
        let forwarding = protocol(Arc::new(MockBackend::failing()));

        let response = forwarding.forward(envelope("/x", "{}")).await;

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let value: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(value["SUCCESS"], "false");
        assert!(
            value["ERROR_MESSAGE"]
                .as_str()
                .unwrap()
                .contains("connection refused")
        );
        assert_eq!(forwarding.stats().failed, 1);
    }

    #[tokio::test]
    async fn caller_deadline_abandons_and_backend_still_completes() {
        let release = Arc::new(Notify::new());
        let backend = Arc::new(MockBackend::gated(release.clone()));
        let forwarding = protocol(backend.clone());

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            forwarding.forward(envelope("/slow", "x")),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(forwarding.stats().abandoned, 1);

        // The backend call is still outstanding; let it finish and confirm the
        // producer neither blocks nor panics on the abandoned slot.
        release.notify_one();
        forwarding.background_tasks().close();
        tokio::time::timeout(Duration::from_secs(1), forwarding.background_tasks().wait())
            .await
            .expect("backend task should finish after release");

        assert_eq!(
            forwarding.stats(),
            ForwardingSnapshot {
                abandoned: 1,
                discarded: 1,
                ..Default::default()
            }
        );
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn response_already_in_slot_is_discarded_on_drop() {
        let forwarding = protocol(Arc::new(MockBackend::answering(StatusCode::OK)));

        let mut call = Box::pin(forwarding.forward(envelope("/fast", "x")));
        // First poll spawns the backend call and parks on the empty slot.
        assert!(poll_once(call.as_mut()).await.is_none());

        forwarding.background_tasks().close();
        forwarding.background_tasks().wait().await;
        drop(call);

        let stats = forwarding.stats();
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.discarded, 1);
    }

    async fn poll_once<F: std::future::Future + Unpin>(
        mut fut: F,
    ) -> Option<F::Output> {
        std::future::poll_fn(|cx| {
            std::task::Poll::Ready(match std::pin::Pin::new(&mut fut).poll(cx) {
                std::task::Poll::Ready(out) => Some(out),
                std::task::Poll::Pending => None,
            })
        })
        .await
    }

    #[tokio::test]
    async fn concurrent_callers_get_their_own_responses() {
        let forwarding = Arc::new(protocol(Arc::new(MockBackend::answering(StatusCode::OK))));

        let mut handles = Vec::new();
        for i in 0..32 {
            let forwarding = Arc::clone(&forwarding);
            handles.push(tokio::spawn(async move {
                let body: &'static str = Box::leak(format!("caller-{i}").into_boxed_str());
                let response = forwarding.forward(envelope("/echo", body)).await;
                (body, response.body)
            }));
        }

        for handle in handles {
            let (sent, received) = handle.await.unwrap();
            assert_eq!(received, Bytes::from_static(sent.as_bytes()));
        }
        assert_eq!(forwarding.stats().delivered, 32);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn exactly_one_outcome_whatever_the_caller_deadline() {
        let forwarding = Arc::new(protocol(Arc::new(MockBackend::delayed(
            Duration::from_millis(5),
        ))));

        let mut handles = Vec::new();
        for round in 0..10u64 {
            for offset_us in (0..10_000u64).step_by(500) {
                let forwarding = Arc::clone(&forwarding);
                handles.push(tokio::spawn(async move {
                    tokio::time::timeout(
                        Duration::from_micros(offset_us + round),
                        forwarding.forward(envelope("/race", "x")),
                    )
                    .await
                    .ok()
                }));
            }
        }

        let runs = handles.len() as u64;
        let mut delivered = 0;
        for handle in handles {
            if let Some(response) = handle.await.unwrap() {
                assert_eq!(response.status, StatusCode::OK);
                assert_eq!(response.body, Bytes::from_static(b"x"));
                delivered += 1;
            }
        }

        // Every producer finishes even though many of their callers left.
        forwarding.background_tasks().close();
        tokio::time::timeout(Duration::from_secs(5), forwarding.background_tasks().wait())
            .await
            .expect("no backend task may hang on an abandoned slot");

        let stats = forwarding.stats();
        assert_eq!(stats.delivered, delivered);
        assert_eq!(stats.delivered + stats.abandoned, runs);
        assert!(stats.discarded <= stats.abandoned);
    }
}
