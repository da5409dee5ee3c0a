use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/challenges", get(handlers::list_challenges))
        .route("/challenges/:id", get(handlers::get_challenge))
        .route("/challenges/:id/run", post(handlers::run_challenge))
        .route("/execute", post(handlers::execute))
}
