use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/attendance/scan", post(commands::attendance::scan))
        .route("/api/attendance/status", get(commands::attendance::my_status))
        .route("/api/attendance/history", get(commands::attendance::my_history))
        .route(
            "/api/attendance/roll-call",
            get(commands::attendance::site_roll_call),
        )
}
