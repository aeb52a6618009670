//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, logging, instrumentation, panic recovery, timeout)
//! - Bind server to listener
//! - Stop accepting and drain on shutdown

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServiceConfig;
use crate::http::handlers::{self, AppState};
use crate::http::middleware::instrument_request;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response::ApiError;
use crate::items::{ItemService, ItemStore};
use crate::observability::Telemetry;

/// HTTP server for the items API.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServiceConfig, telemetry: Telemetry) -> Self {
        let store = ItemStore::new(telemetry.clone());
        let items = Arc::new(ItemService::new(store, telemetry.clone()));
        let state = AppState { telemetry, items };

        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let telemetry = state.telemetry.clone();

        let routes = Router::new()
            .route("/items", get(handlers::list_items).post(handlers::create_item))
            .route(
                "/items/{id}",
                get(handlers::read_item)
                    .put(handlers::update_item)
                    .delete(handlers::delete_item),
            )
            .route("/healthz", get(handlers::healthz))
            .with_state(state);

        Self::with_middleware(routes, config, telemetry)
    }

    /// Wrap `routes` in the service middleware stack.
    ///
    /// Layers run outermost first: request id, logging, id propagation,
    /// instrumentation, panic recovery, then timeout. A panic or a timeout
    /// is already a response when instrumentation sees it.
    #[allow(deprecated)]
    pub fn with_middleware(routes: Router, config: &ServiceConfig, telemetry: Telemetry) -> Router {
        let on_panic = {
            let telemetry = telemetry.clone();
            move |panic: Box<dyn Any + Send + 'static>| {
                ApiError::from_panic(&telemetry, panic).into_response()
            }
        };

        routes
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(CatchPanicLayer::custom(on_panic))
            .layer(from_fn_with_state(telemetry, instrument_request))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The assembled router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}
