use std::{any::Any, future::IntoFuture, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request},
    middleware,
    routing::any,
};
use eyre::{Result, WrapErr};
use hyper::{Response, StatusCode, header::HeaderValue};
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::{
    adapters::middleware::request_timing_middleware,
    core::error_page::ErrorPage,
    ports::http_server::{HttpServer, RequestHandler},
    utils::GracefulShutdown,
};

/// Message shown when a handler panicked; the panic payload itself is only logged.
pub const PANIC_MESSAGE: &str = "Internal proxy error";

/// Listening side of the forwarder: one catch-all route in front of a [`RequestHandler`].
pub struct ForwarderServer<H: RequestHandler> {
    listen_addr: SocketAddr,
    handler: Arc<H>,
    powered_by: HeaderValue,
    shutdown: Arc<GracefulShutdown>,
}

impl<H: RequestHandler> ForwarderServer<H> {
    pub fn new(
        listen_addr: SocketAddr,
        handler: Arc<H>,
        powered_by: HeaderValue,
        shutdown: Arc<GracefulShutdown>,
    ) -> Self {
        Self {
            listen_addr,
            handler,
            powered_by,
            shutdown,
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Build the router. Every method and path reaches the handler.
    pub fn router(&self) -> Router {
        let handler = self.handler.clone();
        let route = move |req: Request| {
            let handler = handler.clone();
            async move {
                let client_addr = req
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| *addr);
                handler.handle_request(req, client_addr).await
            }
        };

        let powered_by = self.powered_by.clone();
        Router::new()
            .route("/", any(route.clone()))
            .route("/{*path}", any(route))
            .layer(middleware::from_fn(request_timing_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::custom(move |err: Box<dyn Any + Send + 'static>| {
                panic_response(err, &powered_by)
            }))
    }

    /// Serve on an already bound listener until shutdown is triggered.
    ///
    /// In-flight requests get the drain timeout to finish before the call returns.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .wrap_err("Failed to read local address")?;
        tracing::info!("Edge forwarder listening on {}", local_addr);

        let shutdown = self.shutdown.clone();
        let server = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let reason = shutdown.wait_for_shutdown_signal().await;
            tracing::info!("Shutdown signal received: {:?}, draining connections", reason);
        });

        let drain = self.shutdown.clone();
        tokio::select! {
            result = server.into_future() => result.wrap_err("Server error")?,
            _ = async move {
                drain.wait_for_shutdown_signal().await;
                tokio::time::sleep(drain.drain_timeout()).await;
            } => {
                tracing::warn!("Drain timeout exceeded, dropping remaining connections");
            }
        }

        tracing::info!("Graceful shutdown completed");
        Ok(())
    }
}

impl<H: RequestHandler> HttpServer for ForwarderServer<H> {
    async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .wrap_err_with(|| format!("Failed to bind to address {}", self.listen_addr))?;
        self.serve(listener).await
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>, powered_by: &HeaderValue) -> Response<AxumBody> {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic message".to_string()
    };
    tracing::error!("Request handler panicked: {}", details);

    ErrorPage::new(
        crate::core::headers::UNKNOWN,
        crate::core::headers::UNKNOWN,
        StatusCode::INTERNAL_SERVER_ERROR,
        PANIC_MESSAGE,
    )
    .into_response(powered_by)
}
