//! Ports (traits) the core depends on. Adapters provide the implementations.
pub mod http_client;

pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
