// Route table for the WeCode API

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/execute", post(handlers::execute_code))
        .route("/status", get(handlers::health_check))
        .route("/languages", get(handlers::list_languages))
}
