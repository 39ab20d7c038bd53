pub mod chains;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

pub use utils::config::Config;
pub use handlers::AppState;

// Re-export common types
pub use anyhow::Result;
pub use chrono::{DateTime, Utc};

use axum::{
    routing::{get, post},
    Router,
};
use axum::http::{Method, HeaderValue};
use tower_http::cors::{CorsLayer, Any};

pub fn create_router(state: AppState) -> Router {
    let cors_layer = create_cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        // Guestbook read endpoints
        .route("/api/entries", get(handlers::list_entries))
        .route("/api/entries/latest", get(handlers::latest_entry))
        .route("/api/status", get(handlers::feed_status))
        .route("/api/marquee", get(handlers::marquee))
        // Pre-flight for the signing form, and manual refetch after a tx
        .route("/api/quote", post(handlers::quote))
        .route("/api/refresh", post(handlers::refresh_entries))
        // RPC proxy endpoint
        .route("/api/rpc", post(handlers::proxy_rpc))
        .layer(cors_layer)
        .with_state(state)
}

fn create_cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|origin| {
            let trimmed = origin.trim();
            if !trimmed.is_empty() {
                trimmed.parse().ok()
            } else {
                None
            }
        })
        .collect();

    if origins.is_empty() {
        // Permissive for development
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

async fn health_check() -> &'static str {
    "OK"
}
