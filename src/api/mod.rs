use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

use crate::gateway::AnswerGateway;

pub mod handlers;
pub mod models;

pub fn create_router(gateway: Arc<AnswerGateway>, static_dir: &str) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // API routes
        .route("/api/chat", post(handlers::chat_handler))
        .route("/api/chat/v2", post(handlers::search_handler))
        .route("/health", get(handlers::health_handler))
        .with_state(gateway)
        // Static file serving for the UI
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
}
