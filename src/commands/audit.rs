use crate::db::DbPool;
use crate::error::GarrisonResult;
use crate::middleware::auth::Claims;
use crate::state::AppState;
use axum::extract::{Extension, Query, State as AxumState};
use axum::Json;
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;

/// Best-effort audit write. Ledger and attendance mutations must not fail
/// because the audit table is unavailable, so errors are logged and dropped.
pub async fn record(
    pool: &DbPool,
    actor_id: Option<i32>,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    details: Value,
) {
    let result = sqlx::query(
        "INSERT INTO audit_logs (actor_id, action, entity_type, entity_id, details)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(actor_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(details)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(
            "Audit write failed for {} on {} {}: {}",
            action,
            entity_type,
            entity_id,
            e
        );
    }
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_audit(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AuditQuery>,
) -> GarrisonResult<Json<Vec<Value>>> {
    claims.require_admin()?;
    let limit = query.limit.unwrap_or(100).clamp(1, 500);

    type AuditRow = (
        i32,
        Option<i32>,
        String,
        String,
        String,
        Option<Value>,
        NaiveDateTime,
    );

    let rows: Vec<AuditRow> = match (&query.entity_type, &query.entity_id) {
        (Some(et), Some(eid)) => {
            sqlx::query_as(
                "SELECT audit_id, actor_id, action, entity_type, entity_id, details, created_at
                 FROM audit_logs
                 WHERE entity_type = $1 AND entity_id = $2
                 ORDER BY audit_id DESC LIMIT $3",
            )
            .bind(et)
            .bind(eid)
            .bind(limit)
            .fetch_all(&state.pool)
            .await?
        }
        (Some(et), None) => {
            sqlx::query_as(
                "SELECT audit_id, actor_id, action, entity_type, entity_id, details, created_at
                 FROM audit_logs
                 WHERE entity_type = $1
                 ORDER BY audit_id DESC LIMIT $2",
            )
            .bind(et)
            .bind(limit)
            .fetch_all(&state.pool)
            .await?
        }
        _ => {
            sqlx::query_as(
                "SELECT audit_id, actor_id, action, entity_type, entity_id, details, created_at
                 FROM audit_logs
                 ORDER BY audit_id DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&state.pool)
            .await?
        }
    };

    Ok(Json(
        rows.into_iter()
            .map(
                |(audit_id, actor_id, action, entity_type, entity_id, details, created_at)| {
                    serde_json::json!({
                        "audit_id": audit_id,
                        "actor_id": actor_id,
                        "action": action,
                        "entity_type": entity_type,
                        "entity_id": entity_id,
                        "details": details,
                        "created_at": created_at,
                    })
                },
            )
            .collect(),
    ))
}
