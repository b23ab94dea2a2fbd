//! Connection-level server: accept loop, graceful drain and forced close.
//!
//! Each accepted connection is served by `hyper_util`'s auto builder (HTTP/1.1 and
//! cleartext HTTP/2) on its own task inside a `JoinSet`, and registered with a
//! `GracefulShutdown` watcher. On shutdown the listener is dropped first, then open
//! connections and detached backend calls get the grace period to finish before
//! the remaining connection tasks are aborted.
use std::{net::SocketAddr, sync::Arc};

use axum::extract::ConnectInfo;
use hyper::{Request, body::Incoming};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto, graceful::GracefulShutdown},
    service::TowerToHyperService,
};
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch, task::JoinSet};
use tower::ServiceExt;

use crate::{
    adapters::HttpHandler,
    core::{Lifecycle, LifecycleState},
    utils::ShutdownToken,
};

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("failed to force-close {count} connection(s): {details}")]
    ForceClose { count: usize, details: String },
}

pub struct GatewayServer {
    handler: Arc<HttpHandler>,
    lifecycle: Lifecycle,
}

impl GatewayServer {
    pub fn new(handler: Arc<HttpHandler>) -> Self {
        Self {
            handler,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Observe lifecycle transitions.
    pub fn lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    /// Serve on `listener` until `shutdown` fires, then drain.
    ///
    /// Returns an error only when connections that outlived the grace period could
    /// not be closed cleanly.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: ShutdownToken,
    ) -> Result<(), ShutdownError> {
        let router = self.handler.router();
        let builder = auto::Builder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let mut connections: JoinSet<()> = JoinSet::new();

        self.lifecycle.advance(LifecycleState::Serving);
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "Courier gateway listening");
        }

        let reason = loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    let service = router.clone().map_request(move |mut req: Request<Incoming>| {
                        req.extensions_mut().insert(ConnectInfo::<SocketAddr>(remote));
                        req
                    });
                    let conn = builder
                        .serve_connection_with_upgrades(
                            TokioIo::new(stream),
                            TowerToHyperService::new(service),
                        )
                        .into_owned();
                    let conn = graceful.watch(conn);

                    connections.spawn(async move {
                        if let Err(e) = conn.await {
                            tracing::debug!(%remote, error = %e, "Connection closed with error");
                        }
                    });
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Connection task panicked");
                        }
                    }
                }
                reason = shutdown.wait_for_shutdown() => break reason,
            }
        };

        drop(listener);
        self.lifecycle.advance(LifecycleState::Draining);

        let grace = shutdown.grace_period();
        let background = self.handler.gateway().forwarding().background_tasks();
        background.close();
        tracing::info!(
            %reason,
            grace_period = ?grace,
            connections = connections.len(),
            backend_calls = background.len(),
            "Stopped accepting connections; draining"
        );

        let drained = tokio::time::timeout(grace, async {
            graceful.shutdown().await;
            background.wait().await;
        })
        .await;

        let result = match drained {
            Ok(()) => {
                tracing::info!("All connections drained");
                reap(&mut connections).await;
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    grace_period = ?grace,
                    connections = connections.len(),
                    backend_calls = background.len(),
                    "Grace period elapsed; force-closing remaining connections"
                );
                connections.abort_all();
                force_close(&mut connections).await
            }
        };

        self.lifecycle.advance(LifecycleState::Stopped);
        result
    }
}

async fn reap(connections: &mut JoinSet<()>) {
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            tracing::warn!(error = %e, "Connection task failed during drain");
        }
    }
}

/// Join aborted connection tasks. Cancellation is the expected outcome; anything
/// else means the connection could not be closed cleanly.
async fn force_close(connections: &mut JoinSet<()>) -> Result<(), ShutdownError> {
    let mut failures = Vec::new();
    while let Some(joined) = connections.join_next().await {
        match joined {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => failures.push(e.to_string()),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ShutdownError::ForceClose {
            count: failures.len(),
            details: failures.join("; "),
        })
    }
}
