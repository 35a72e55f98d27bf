//! HTTP control surface.
//!
//! Exposes the operator API: start a batch of signups, stream progress as
//! Server-Sent Events, list accounts, fetch login tokens. CORS is permissive
//! because the dashboard is served from another origin.

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use handlers::{AppState, ErrorResponse, HealthResponse, LoginDetails, StartSignupsResponse};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/start-signups", post(handlers::start_signups))
        .route("/api/stream-progress", get(handlers::stream_progress))
        .route("/api/accounts", get(handlers::list_accounts))
        .route("/api/account/:id/login-details", get(handlers::login_details))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
