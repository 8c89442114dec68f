//! Network module with deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until shutdown. Binding separately lets the
//! binary learn the real port (and fail fast on a taken one) before the
//! dispatcher is started.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::config::NetworkConfig;
use super::handlers::{
    clear_handler, health_handler, liveness_handler, missing_id_handler, readiness_handler,
    status_handler, submit_async_handler, submit_sync_handler, ApiDoc, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::SubmissionGateway;

/// Assembles the gateway router with all routes and middleware.
///
/// Routes:
/// - `POST /operation/sync/{id}` and `POST /operation/async/{id}`
/// - `GET /status/{id}`
/// - `POST /clear`
/// - `GET /health`, `/health/live`, `/health/ready`
/// - `GET /api-docs` (Swagger UI) and `GET /api-docs/openapi.json`
pub fn build_router(state: AppState, config: &NetworkConfig) -> Router {
    Router::new()
        .route("/operation/sync/{id}", post(submit_sync_handler))
        .route("/operation/async/{id}", post(submit_async_handler))
        .route("/operation/sync/", post(missing_id_handler))
        .route("/operation/async/", post(missing_id_handler))
        .route("/status/{id}", get(status_handler))
        .route("/clear", post(clear_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Manages the gateway's HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    gateway: SubmissionGateway,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, gateway: SubmissionGateway) -> Self {
        Self {
            config,
            listener: None,
            gateway,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Shared handle to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Builds the router over this module's gateway and shutdown controller.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            gateway: self.gateway.clone(),
            shutdown: Arc::clone(&self.shutdown),
            start_time: Instant::now(),
        };
        build_router(state, &self.config)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured one
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then drains.
    ///
    /// On the signal the health state moves to Draining (readiness turns
    /// 503), axum stops accepting connections and finishes open ones, and
    /// the controller waits for any tracked in-flight request.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let shutdown_ctrl = self.shutdown;

        shutdown_ctrl.set_ready();

        let signal_ctrl = Arc::clone(&shutdown_ctrl);
        let signal = async move {
            shutdown.await;
            info!("shutdown signal received, draining HTTP requests");
            signal_ctrl.begin_drain();
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        if shutdown_ctrl
            .wait_for_drain(self.config.request_timeout)
            .await
        {
            info!("all HTTP requests drained");
        } else {
            warn!(
                in_flight = shutdown_ctrl.in_flight_count(),
                "drain timeout expired with requests remaining"
            );
        }
        Ok(())
    }
}
