use std::{any::Any, collections::BTreeSet, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::Request,
    http::{StatusCode, Uri, header},
    middleware,
    routing::MethodRouter,
};
use eyre::{Result, WrapErr};
use hyper::Response;
use tower_http::catch_panic::CatchPanicLayer;

use crate::{
    adapters::middleware::access_log_middleware,
    core::{
        ErrorEnvelope, Gateway, RequestEnvelope, ResponseEnvelope, gateway::PING_PATH,
    },
};

/// HTTP handler for the Courier gateway.
///
/// Owns nothing but the shared [`Gateway`]; every request-scoped value lives in the
/// handler future.
pub struct HttpHandler {
    gateway: Arc<Gateway>,
}

impl HttpHandler {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Build the axum router.
    ///
    /// One `MethodRouter` is installed per distinct path in the route table plus
    /// `/ping`: POST forwards on configured paths, GET answers on `/ping`. Every
    /// other method at those paths, and every unregistered path, redirects.
    pub fn router(self: &Arc<Self>) -> Router {
        let mut paths: BTreeSet<&str> = self.gateway.routes().iter().collect();
        paths.insert(PING_PATH);

        let mut router = Router::new();
        for path in paths {
            let mut method_router = MethodRouter::new();

            if self.gateway.routes().contains(path) {
                let handler = Arc::clone(self);
                method_router = method_router.post(move |req: Request| async move {
                    respond(handler.handle_forward(req).await)
                });
                tracing::info!(path, backend = %self.gateway.backend(), "Registered forwarded route");
            }

            if path == PING_PATH {
                let handler = Arc::clone(self);
                method_router =
                    method_router.get(move || async move { respond(handler.handle_ping()) });
                // `get` would also answer HEAD; only GET is the health check.
                let handler = Arc::clone(self);
                method_router = method_router
                    .head(move |uri: Uri| async move { respond(handler.handle_redirect(&uri)) });
            }

            let handler = Arc::clone(self);
            method_router = method_router
                .fallback(move |uri: Uri| async move { respond(handler.handle_redirect(&uri)) });

            router = router.route(path, method_router);
        }

        let handler = Arc::clone(self);
        router
            .fallback(move |uri: Uri| async move { respond(handler.handle_redirect(&uri)) })
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn(access_log_middleware))
    }

    /// `GET /ping`: liveness probe with the current local time.
    pub fn handle_ping(&self) -> Result<Response<AxumBody>> {
        let body = serde_json::json!({
            "pong": chrono::Local::now().to_rfc3339(),
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(AxumBody::from(body.to_string()))
            .wrap_err("Failed to build ping response")
    }

    /// `POST` on a configured path: capture, forward, and pass the backend's answer through.
    pub async fn handle_forward(&self, req: Request) -> Result<Response<AxumBody>> {
        let envelope = match RequestEnvelope::capture(req, self.gateway.max_body_bytes()).await {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting request with unreadable body");
                // Answered with 200, matching the established wire behaviour.
                return envelope_response(ResponseEnvelope::new(
                    StatusCode::OK,
                    ErrorEnvelope::failure(e.to_string()).to_bytes(),
                ));
            }
        };

        // A caller that disconnects drops this future, which abandons the delivery.
        let response = self.gateway.forwarding().forward(envelope).await;
        envelope_response(response)
    }

    /// Anything not otherwise matched: 301 to the backend at the same path.
    pub fn handle_redirect(&self, uri: &Uri) -> Result<Response<AxumBody>> {
        let location = self.gateway.redirect_location(uri.path(), uri.query());
        tracing::debug!(path = uri.path(), location = %location, "Redirecting to backend");

        Response::builder()
            .status(StatusCode::MOVED_PERMANENTLY)
            .header(header::LOCATION, location)
            .body(AxumBody::empty())
            .wrap_err("Failed to build redirect response")
    }
}

fn envelope_response(envelope: ResponseEnvelope) -> Result<Response<AxumBody>> {
    Response::builder()
        .status(envelope.status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(AxumBody::from(envelope.body))
        .wrap_err("Failed to build forwarded response")
}

fn respond(result: Result<Response<AxumBody>>) -> Response<AxumBody> {
    match result {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Request handling error: {:?}", e);
            internal_error(e.to_string())
        }
    }
}

fn internal_error(message: String) -> Response<AxumBody> {
    let mut response = Response::new(AxumBody::from(ErrorEnvelope::failure(message).to_bytes()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<AxumBody> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "Handler panicked");
    internal_error(detail)
}
