use std::net::SocketAddr;

use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response};

/// HttpServer defines the port for running the listening side of the proxy
pub trait HttpServer: Send + Sync + 'static {
    /// Run the HTTP server
    ///
    /// # Returns
    /// A future that resolves when the server has shut down or failed to bind
    fn run(&self) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// RequestHandler defines the port for answering one inbound request
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle an incoming HTTP request
    ///
    /// Every request gets exactly one response; failures are rendered, never returned.
    ///
    /// # Arguments
    /// * `req` - The inbound request
    /// * `client_addr` - Peer address when the listener recorded one
    fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> impl std::future::Future<Output = Response<AxumBody>> + Send;
}
