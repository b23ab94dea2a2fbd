#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::post,
};
use courier::{
    Gateway, GatewayServer, HttpClientAdapter, HttpHandler, LifecycleState, ShutdownCoordinator,
    ShutdownError, config::GatewayConfig,
};
use tokio::{net::TcpListener, sync::watch, task::JoinHandle};

/// Counters shared with the fake backend.
#[derive(Clone, Default)]
pub struct BackendProbe {
    pub started: Arc<AtomicUsize>,
    pub finished: Arc<AtomicUsize>,
}

impl BackendProbe {
    pub async fn wait_started(&self, n: usize) {
        wait_until(|| self.started.load(Ordering::SeqCst) >= n).await;
    }

    pub async fn wait_finished(&self, n: usize) {
        wait_until(|| self.finished.load(Ordering::SeqCst) >= n).await;
    }
}

pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    (
        StatusCode::CREATED,
        [("x-backend-only", "1")],
        Json(serde_json::json!({
            "method": method.as_str(),
            "body": String::from_utf8_lossy(&body),
            "source": header("x-source-host"),
            "custom": header("x-custom"),
            "host": header("host"),
        })),
    )
}

async fn status(Path(code): Path<u16>) -> impl IntoResponse {
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::IM_A_TEAPOT),
        format!("{{\"code\":{code}}}"),
    )
}

async fn slow(
    State((probe, hold)): State<(BackendProbe, Duration)>,
    body: Bytes,
) -> impl IntoResponse {
    probe.started.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(hold).await;
    probe.finished.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, body)
}

/// Fake backend on an ephemeral port. `/slow` holds each request for `hold`.
pub async fn spawn_backend(hold: Duration) -> (SocketAddr, BackendProbe) {
    let probe = BackendProbe::default();
    let app = Router::new()
        .route("/echo", post(echo))
        .route("/status/{code}", post(status))
        .route("/slow", post(slow))
        .with_state((probe.clone(), hold));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, probe)
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    pub shutdown: ShutdownCoordinator,
    pub lifecycle: watch::Receiver<LifecycleState>,
    pub server: JoinHandle<Result<(), ShutdownError>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn_gateway(backend: SocketAddr, grace: &str) -> TestGateway {
    let config = GatewayConfig::builder()
        .listen_addr("127.0.0.1:0")
        .backend_host(format!("http://{backend}"))
        .route("/echo")
        .route("/status/{code}")
        .route("/slow")
        .grace_period(grace)
        .build()
        .unwrap();

    let gateway = Arc::new(Gateway::new(
        &config,
        Arc::new(HttpClientAdapter::new().unwrap()),
    ));
    let server = GatewayServer::new(Arc::new(HttpHandler::new(Arc::clone(&gateway))));
    let mut lifecycle = server.lifecycle();

    let shutdown =
        ShutdownCoordinator::with_grace_period(config.shutdown.grace_period().unwrap());
    let token = shutdown.shutdown_token();

    let listener = TcpListener::bind(&config.listen_addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move { server.serve(listener, token).await });

    lifecycle
        .wait_for(|s| *s == LifecycleState::Serving)
        .await
        .unwrap();

    TestGateway {
        addr,
        gateway,
        shutdown,
        lifecycle,
        server,
    }
}

/// Client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
