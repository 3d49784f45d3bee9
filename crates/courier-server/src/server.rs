//! `CourierServer`: axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use courier_auth::Authenticator;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::handlers::deliveries::{create_delivery, get_delivery, update_status};
use crate::handlers::location::{
    get_customer_location, get_driver_location, post_customer_location, post_driver_location,
};
use crate::handlers::ws::ws_handler;
use crate::health::{self, HealthResponse};
use crate::hub::{HubRegistry, spawn_reaper};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::store::DeliveryStore;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session hubs.
    pub registry: Arc<HubRegistry>,
    /// Delivery records.
    pub store: Arc<dyn DeliveryStore>,
    /// Credential issuer and verifier.
    pub auth: Arc<dyn Authenticator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The courier relay server.
pub struct CourierServer {
    state: AppState,
}

/// Background tasks of a listening server.
pub struct ServerHandle {
    /// Bound address (with the real port when configured with `0`).
    pub addr: SocketAddr,
    server: JoinHandle<()>,
    reaper: JoinHandle<()>,
}

impl ServerHandle {
    /// Tasks to await during shutdown.
    pub fn into_tasks(self) -> Vec<JoinHandle<()>> {
        vec![self.server, self.reaper]
    }
}

impl CourierServer {
    /// Create a server around a delivery store and a credential authority.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn DeliveryStore>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        let registry = HubRegistry::with_max_dropped(config.session.max_dropped_messages);
        Self {
            state: AppState {
                registry: Arc::new(registry),
                store,
                auth,
                config: Arc::new(config),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics: None,
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/v1/deliveries", post(create_delivery))
            .route("/v1/deliveries/{id}", get(get_delivery))
            .route("/v1/deliveries/{id}/status", post(update_status))
            .route(
                "/v1/deliveries/{id}/driver/location",
                post(post_driver_location).get(get_driver_location),
            )
            .route(
                "/v1/deliveries/{id}/customer/location",
                post(post_customer_location).get(get_customer_location),
            )
            .route("/v1/ws/{id}", get(ws_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address, start serving and start the hub reaper.
    ///
    /// Both tasks stop when the shutdown coordinator fires.
    pub async fn listen(&self) -> std::io::Result<ServerHandle> {
        let config = &self.state.config;
        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;

        let reaper = spawn_reaper(
            Arc::clone(&self.state.registry),
            config.session.reap_interval,
            config.session.idle_ttl,
            self.state.shutdown.token(),
        );

        let router = self.router();
        let token = self.state.shutdown.token();
        let server = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %err, "server error");
            }
            info!("server stopped");
        });

        info!(%addr, "courier server listening");
        Ok(ServerHandle {
            addr,
            server,
            reaper,
        })
    }

    /// Session hubs.
    pub fn registry(&self) -> &Arc<HubRegistry> {
        &self.state.registry
    }

    /// Delivery records.
    pub fn store(&self) -> &Arc<dyn DeliveryStore> {
        &self.state.store
    }

    /// Credential authority.
    pub fn auth(&self) -> &Arc<dyn Authenticator> {
        &self.state.auth
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /healthz
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.connection_count(),
        state.registry.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics::render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
