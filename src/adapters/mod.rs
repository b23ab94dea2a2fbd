pub mod http_client;
pub mod http_handler;
pub mod http_server;
pub mod middleware;

pub use http_client::HttpClientAdapter;
pub use http_handler::HttpHandler;
pub use http_server::{GatewayServer, ShutdownError};
pub use middleware::access_log_middleware;
