// HTTP front end for the recommendation pipeline

mod routes;


use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::OnceCell;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::query::RecommendationService;

pub use routes::{ApiError, RecommendParams};

/// Shared state handed to every request
///
/// The service is built on first use and reused afterwards. A failed build is
/// not remembered, so the next request tries again.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    service: Arc<OnceCell<Arc<RecommendationService>>>,
}

impl AppState {
    #[inline]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(OnceCell::new()),
        }
    }

    /// State with an already constructed service
    #[inline]
    pub fn with_service(config: Config, service: Arc<RecommendationService>) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(OnceCell::new_with(Some(service))),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub async fn service(&self) -> crate::Result<Arc<RecommendationService>> {
        self.service
            .get_or_try_init(|| async {
                info!("Initializing recommendation service");
                RecommendationService::from_config(&self.config)
                    .await
                    .map(Arc::new)
            })
            .await
            .map(Arc::clone)
    }
}

#[inline]
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);

    Router::new()
        .route("/", post(routes::recommend))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(origins)
}

/// Bind the configured address and serve until Ctrl-C
#[inline]
pub async fn serve(config: Config) -> Result<()> {
    let addr = config
        .server
        .socket_addr()
        .context("Invalid server address")?;

    if !config.vector_database_path().is_dir() {
        warn!(
            "No vector store at {}; requests will fail until `triage-rag index` has run",
            config.vector_database_path().display()
        );
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let local_addr = listener.local_addr().context("Failed to read bound address")?;

    info!("Recommendation service listening on http://{}", local_addr);

    axum::serve(listener, router(AppState::new(config)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
