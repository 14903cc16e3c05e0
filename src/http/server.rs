//! HTTP server implementation.

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::guard::enforce;
use super::service::router;
use crate::error::Result;
use crate::ratelimit::{RateLimiter, RateLimiterBackend};

/// HTTP server for the rate limit service.
pub struct HttpServer<R: RateLimiterBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter backend
    backend: Arc<R>,
    /// Optional per-client limit on the service's own endpoints
    guard: Option<Arc<RateLimiter>>,
}

impl<R: RateLimiterBackend + 'static> HttpServer<R> {
    /// Create a new HTTP server over `backend`.
    pub fn new(addr: SocketAddr, backend: Arc<R>) -> Self {
        Self {
            addr,
            backend,
            guard: None,
        }
    }

    /// Limit each client's calls to the service itself.
    pub fn with_guard(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.guard = Some(limiter);
        self
    }

    /// Get the configured bind address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn app(&self) -> Router {
        let app = router(self.backend.clone());
        match &self.guard {
            Some(limiter) => app.layer(axum::middleware::from_fn_with_state(
                limiter.clone(),
                enforce,
            )),
            None => app,
        }
    }

    /// Bind and serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!(
            addr = %listener.local_addr()?,
            guarded = self.guard.is_some(),
            "Starting HTTP server for rate limit service"
        );

        axum::serve(listener, self.app())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}
