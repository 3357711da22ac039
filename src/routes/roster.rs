use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/shifts", get(commands::roster::list_shifts))
        .route("/api/shifts/create", post(commands::roster::create_shift))
        .route("/api/shifts/update", post(commands::roster::update_shift))
        .route("/api/roster", get(commands::roster::list_roster))
        .route("/api/roster/assign", post(commands::roster::assign_roster))
        .route("/api/roster/end", post(commands::roster::end_roster))
}
