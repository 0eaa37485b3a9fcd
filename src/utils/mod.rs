pub mod body_timeout;
pub mod graceful_shutdown;

pub use body_timeout::IdleTimeoutBody;
pub use graceful_shutdown::{GracefulShutdown, ShutdownReason};
