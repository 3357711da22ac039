use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/employees", get(commands::employee::list_employees))
        .route("/api/employees/create", post(commands::employee::create_employee))
        .route("/api/employees/update", post(commands::employee::update_employee))
        .route(
            "/api/employees/deactivate",
            post(commands::employee::deactivate_employee),
        )
}
