pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::sheets::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/sheets", post(handlers::handle_generate))
        .route(
            "/api/v1/sheets/:design_id/modifications",
            post(handlers::handle_modify),
        )
        .route(
            "/api/v1/sheets/:design_id/history",
            get(handlers::handle_history),
        )
        .route(
            "/api/v1/sheets/:design_id/versions/:version",
            get(handlers::handle_get_version),
        )
        .with_state(state)
}
