pub mod classifier;
pub mod error_page;
pub mod forwarder;
pub mod headers;
pub mod outcome;
pub mod upstream;

pub use classifier::{Route, classify};
pub use error_page::ErrorPage;
pub use forwarder::{ForwardError, ForwarderService};
pub use headers::HeaderPolicy;
pub use outcome::UpstreamOutcome;
pub use upstream::{UpstreamError, UpstreamTarget};
