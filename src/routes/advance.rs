use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/advances", get(commands::advance::my_advances))
        .route("/api/advances/all", get(commands::advance::all_advances))
        .route("/api/advances/summary", get(commands::advance::advance_summary))
        .route(
            "/api/advances/deductions",
            get(commands::advance::deduction_history),
        )
        .route("/api/advances/request", post(commands::advance::request_advance))
        .route("/api/advances/approve", post(commands::advance::approve_advance))
        .route("/api/advances/reject", post(commands::advance::reject_advance))
        .route("/api/advances/deduct", post(commands::advance::post_deduction))
        .route(
            "/api/advances/status",
            post(commands::advance::update_advance_status),
        )
        .route(
            "/api/advances/skip/request",
            post(commands::advance_skip::request_skip),
        )
        .route(
            "/api/advances/skip/approve",
            post(commands::advance_skip::approve_skip),
        )
        .route(
            "/api/advances/skip/reject",
            post(commands::advance_skip::reject_skip),
        )
        .route(
            "/api/advances/skip/cancel",
            post(commands::advance_skip::cancel_skip),
        )
        .route("/api/advances/skip/list", get(commands::advance_skip::list_skips))
}
