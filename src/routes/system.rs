use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(commands::system::root))
        .route("/api/ping", get(commands::system::ping))
        .route("/api/system/health", get(commands::system::health))
}
