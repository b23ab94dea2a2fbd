//! Captured request and produced response of one forwarding operation, plus the
//! uniform JSON error body returned when the backend call fails.
use axum::body::Body as AxumBody;
use bytes::Bytes;
use hyper::{
    HeaderMap, Method, Request, StatusCode,
    header::{self, HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header carrying the host the caller originally addressed.
pub const SOURCE_HOST_HEADER: HeaderName = HeaderName::from_static("x-source-host");

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to read request body: {0}")]
    Body(String),
}

/// Inbound request captured in full, owned by the unit of work that forwards it.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestEnvelope {
    /// Read the whole inbound request (body bounded by `body_limit`) and stamp
    /// `x-source-host` with the host the caller addressed.
    pub async fn capture(
        request: Request<AxumBody>,
        body_limit: usize,
    ) -> Result<Self, CaptureError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, body_limit)
            .await
            .map_err(|e| CaptureError::Body(e.to_string()))?;

        let source_host = parts
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        let mut envelope = Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            headers: parts.headers,
            body,
        };
        envelope.set_source_host(&source_host);
        Ok(envelope)
    }

    /// Overwrite every existing `x-source-host` value with `host`.
    pub fn set_source_host(&mut self, host: &str) {
        let value = HeaderValue::from_str(host).unwrap_or_else(|_| HeaderValue::from_static(""));
        self.headers.insert(SOURCE_HOST_HEADER, value);
    }

    pub fn source_host(&self) -> Option<&str> {
        self.headers
            .get(SOURCE_HOST_HEADER)
            .and_then(|v| v.to_str().ok())
    }

    /// Build the outbound request for `url`, carrying method, headers and body unchanged.
    pub fn into_request(self, url: &str) -> Result<Request<AxumBody>, http::Error> {
        let mut builder = Request::builder().method(self.method).uri(url);
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers;
        }
        builder.body(AxumBody::from(self.body))
    }
}

/// Status and body handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ResponseEnvelope {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Synthesized 500 carrying `message` in the uniform error body.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorEnvelope::failure(message).to_bytes(),
        )
    }
}

/// Uniform JSON error body. Only `SUCCESS` and `ERROR_MESSAGE` are filled; the other
/// fields are reserved and always serialized empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "SUCCESS")]
    pub success: String,
    #[serde(rename = "ERROR_CODE", default)]
    pub error_code: String,
    #[serde(rename = "ERROR_MESSAGE")]
    pub error_message: String,
    #[serde(rename = "EXCEPTION_CODE", default)]
    pub exception_code: String,
    #[serde(rename = "EXCEPTION_MESSAGE", default)]
    pub exception_message: String,
    #[serde(rename = "EXCEPTION_STACK", default)]
    pub exception_stack: String,
    #[serde(rename = "API_STATUS", default)]
    pub api_status: String,
    #[serde(rename = "LOG_ID", default)]
    pub log_id: String,
}

impl ErrorEnvelope {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: "false".to_string(),
            error_message: message.into(),
            ..Self::default()
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        match serde_json::to_vec(self) {
            Ok(json) => Bytes::from(json),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize error envelope");
                Bytes::from_static(br#"{"SUCCESS":"false"}"#)
            }
        }
    }
}
