use crate::state::AppState;
use axum::Router;

pub mod advance;
pub mod attendance;
pub mod audit;
pub mod employee;
pub mod roster;
pub mod society;
pub mod system;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(system::router())
        .merge(attendance::router())
        .merge(advance::router())
        .merge(roster::router())
        .merge(society::router())
        .merge(employee::router())
        .merge(audit::router())
}
