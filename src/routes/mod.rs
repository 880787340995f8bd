/// Application routes configuration
use crate::handlers::{
    create_target, create_user, delete_target, get_prediction, get_target, health, list_path_rows,
    AppState,
};
use axum::{
    routing::{get, post},
    Router,
};

/// Build the application router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Prediction endpoints
        .route("/predictions/:path/:row", get(get_prediction))
        .route("/pathrows", get(list_path_rows))
        // Subscription endpoints
        .route("/users", post(create_user))
        .route("/targets", post(create_target))
        .route("/targets/:id", get(get_target).delete(delete_target))
        .with_state(state)
}
