pub mod graceful_shutdown;

pub use graceful_shutdown::{ShutdownCoordinator, ShutdownReason, ShutdownToken};
