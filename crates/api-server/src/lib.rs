//! REST API for facial emotion prediction
//!
//! - `POST /predict`: multipart image upload, returns `{"emotion", "confidence"}`
//! - `GET /`: greeting
//! - `GET /health`: status and version

pub mod config;
mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use mood_tracker_emotion_detection::EmotionPipeline;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::{ClassifierBackend, ServerConfig, DEFAULT_BODY_LIMIT};
pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// Face locator and classifier, loaded once at startup
    pub pipeline: Arc<EmotionPipeline>,
    /// Maximum request body size in bytes
    pub body_limit: usize,
}

impl ApiState {
    #[must_use]
    pub fn new(pipeline: EmotionPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    #[must_use]
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/predict", post(predict))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state).await
}

/// Serve on an already bound listener
pub async fn serve(listener: TcpListener, state: ApiState) -> Result<(), std::io::Error> {
    if let Ok(local) = listener.local_addr() {
        tracing::info!("Listening on {}", local);
    }
    axum::serve(listener, build_router(state)).await
}
