use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/societies", get(commands::society::list_societies))
        .route("/api/societies/create", post(commands::society::create_society))
        .route("/api/societies/update", post(commands::society::update_society))
        .route("/api/societies/qr/rotate", post(commands::society::rotate_qr))
}
