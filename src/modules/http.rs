//! HTTP server module.
//!
//! # Responsibilities
//! - Bind the configured address at construction time, unless disabled
//! - Serve an Axum router until the serve scope is cancelled
//! - Wire up middleware (tracing, timeout, request ID) and `/healthz`
//!
//! # Design Decisions
//! - Binding happens in the constructor so address errors surface during
//!   bootstrap and the identity carries the real port
//! - `http.disable = true` leaves the port untouched
//! - Graceful: in-flight requests finish after cancellation

use std::net::SocketAddr;
use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ConfigAccessor, ConfigAccessorExt, HttpConfig};
use crate::lifecycle::{Module, ModuleIdentity, ModuleKind};
use crate::modules::listener::Socket;
use crate::BoxError;

/// HTTP server for `http.addr`.
pub struct HttpModule {
    identity: ModuleIdentity,
    socket: Socket,
    router: Router,
}

impl HttpModule {
    /// Bind `config.addr` and prepare `router` for serving.
    pub fn bind(config: &HttpConfig, router: Router) -> Result<Self, std::io::Error> {
        let socket = Socket::bind(config.addr)?;
        tracing::info!(address = %socket.local_addr(), "HTTP listener bound");
        Ok(Self::with_socket(socket, config, router))
    }

    /// Prepare `router` without taking the port; `run` binds it.
    pub fn unbound(config: &HttpConfig, router: Router) -> Self {
        Self::with_socket(Socket::pending(config.addr), config, router)
    }

    /// Build from the `[http]` section of `conf`. A disabled section is
    /// never bound.
    pub fn from_config(conf: &dyn ConfigAccessor, router: Router) -> Result<Self, BoxError> {
        let config: HttpConfig = conf.unmarshal_or_default("http")?;
        if config.disable {
            tracing::info!(address = %config.addr, "HTTP module disabled, listener not bound");
            return Ok(Self::unbound(&config, router));
        }
        Ok(Self::bind(&config, router)?)
    }

    fn with_socket(socket: Socket, config: &HttpConfig, router: Router) -> Self {
        Self {
            identity: ModuleIdentity::new(ModuleKind::Http, socket.local_addr().to_string()),
            socket,
            router: Self::build_router(router, config.request_timeout),
        }
    }

    /// Bound address (resolves port 0), or the configured one when unbound.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    pub fn is_bound(&self) -> bool {
        self.socket.is_bound()
    }

    /// Add the health route and middleware layers.
    #[allow(deprecated)]
    fn build_router(router: Router, timeout: Duration) -> Router {
        router.route("/healthz", get(healthz)).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(timeout)),
        )
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

impl Module for HttpModule {
    fn identity(&self) -> ModuleIdentity {
        self.identity.clone()
    }

    fn run(&self, shutdown: CancellationToken) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(async move {
            let listener = self.socket.take()?;
            let addr = listener.local_addr()?;

            tracing::info!(address = %addr, "HTTP server starting");

            axum::serve(listener, self.router.clone())
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await?;

            tracing::info!(address = %addr, "HTTP server stopped");
            Ok(())
        })
    }
}
