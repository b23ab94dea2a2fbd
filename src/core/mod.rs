pub mod envelope;
pub mod forwarding;
pub mod gateway;
pub mod lifecycle;
pub mod route_table;

pub use envelope::{ErrorEnvelope, RequestEnvelope, ResponseEnvelope};
pub use forwarding::{ForwardError, ForwardingProtocol, ForwardingSnapshot};
pub use gateway::Gateway;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use route_table::{BackendTarget, RouteTable};
