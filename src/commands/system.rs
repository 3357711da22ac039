use crate::error::GarrisonResult;
use crate::state::AppState;
use axum::extract::State as AxumState;
use axum::Json;
use serde_json::Value;

pub async fn root() -> &'static str {
    "garrison workforce service"
}

pub async fn ping() -> Json<Value> {
    Json(serde_json::json!({ "pong": true }))
}

/// Liveness plus a database round-trip.
pub async fn health(AxumState(state): AxumState<AppState>) -> GarrisonResult<Json<Value>> {
    let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&state.pool).await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "database": one == 1,
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
