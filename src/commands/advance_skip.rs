use crate::commands::advance::parse_month;
use crate::commands::audit;
use crate::db::{is_unique_violation, Advance, DbPool, SkipRecord, SkipRequest, SkipStatus};
use crate::error::{GarrisonError, GarrisonResult};
use crate::middleware::auth::Claims;
use crate::state::AppState;
use axum::extract::{Extension, Json, Query, State as AxumState};
use chrono::Local;
use serde::Deserialize;
use sqlx::{Postgres, Transaction};

async fn lock_skip_request(
    tx: &mut Transaction<'_, Postgres>,
    skip_request_id: i32,
) -> GarrisonResult<SkipRequest> {
    sqlx::query_as::<_, SkipRequest>(
        "SELECT * FROM advance_skip_requests WHERE skip_request_id = $1 FOR UPDATE",
    )
    .bind(skip_request_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| GarrisonError::NotFound(format!("No skip request {}", skip_request_id)))
}

pub async fn request_skip_internal(
    pool: &DbPool,
    actor_id: i32,
    actor_is_admin: bool,
    advance_id: i32,
    month: &str,
    reason: &str,
) -> GarrisonResult<SkipRequest> {
    parse_month(month)?;
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(GarrisonError::Validation(
            "A skip request needs a reason".to_string(),
        ));
    }

    let advance = sqlx::query_as::<_, Advance>("SELECT * FROM advances WHERE advance_id = $1")
        .bind(advance_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| GarrisonError::NotFound(format!("No advance {}", advance_id)))?;

    if advance.employee_id != actor_id && !actor_is_admin {
        return Err(GarrisonError::Forbidden(
            "Skips can only be requested on your own advance".to_string(),
        ));
    }
    if !advance.status.is_deductible() {
        return Err(GarrisonError::Validation(format!(
            "Advance {} is {}, only active advances take skip requests",
            advance_id, advance.status
        )));
    }

    // One request per month, forever: a rejected month stays blocked.
    let inserted = sqlx::query_as::<_, SkipRequest>(
        r#"
        INSERT INTO advance_skip_requests (advance_id, skip_month, reason, requested_by)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(advance_id)
    .bind(month)
    .bind(reason)
    .bind(actor_id)
    .fetch_one(pool)
    .await;

    let request = match inserted {
        Ok(r) => r,
        Err(e) if is_unique_violation(&e, "uq_skip_request_advance_month") => {
            return Err(GarrisonError::DuplicateSkipMonth(format!(
                "A skip for {} was already requested on advance {}",
                month, advance_id
            )));
        }
        Err(e) => return Err(e.into()),
    };

    audit::record(
        pool,
        Some(actor_id),
        "skip.requested",
        "skip_request",
        &request.skip_request_id.to_string(),
        serde_json::json!({ "advance_id": advance_id, "month": month }),
    )
    .await;

    tracing::info!(
        "Skip of {} requested for advance {} (request {})",
        month,
        advance_id,
        request.skip_request_id
    );
    Ok(request)
}

/// Approval flips the request and writes the waiver record in one
/// transaction, so the deduction batch either sees both or neither.
pub async fn approve_skip_internal(
    pool: &DbPool,
    admin_id: i32,
    skip_request_id: i32,
    notes: Option<String>,
) -> GarrisonResult<SkipRequest> {
    let mut tx = pool.begin().await?;
    let request = lock_skip_request(&mut tx, skip_request_id).await?;
    if request.status != SkipStatus::Pending {
        return Err(GarrisonError::Validation(format!(
            "Skip request {} is {}, only pending requests can be approved",
            skip_request_id, request.status
        )));
    }

    let advance =
        sqlx::query_as::<_, Advance>("SELECT * FROM advances WHERE advance_id = $1 FOR UPDATE")
            .bind(request.advance_id)
            .fetch_one(&mut *tx)
            .await?;

    let now = Local::now().naive_local();
    let updated = sqlx::query_as::<_, SkipRequest>(
        "UPDATE advance_skip_requests
         SET status = 'approved', reviewed_by = $1, reviewed_at = $2, review_notes = $3
         WHERE skip_request_id = $4
         RETURNING *",
    )
    .bind(admin_id)
    .bind(now)
    .bind(notes.as_deref())
    .bind(skip_request_id)
    .fetch_one(&mut *tx)
    .await?;

    let recorded = sqlx::query_as::<_, SkipRecord>(
        r#"
        INSERT INTO advance_skip_records (advance_id, skip_request_id, skip_month, waived_amount)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(request.advance_id)
    .bind(skip_request_id)
    .bind(&request.skip_month)
    .bind(advance.monthly_deduction)
    .fetch_one(&mut *tx)
    .await;

    let record = match recorded {
        Ok(r) => r,
        Err(e) if is_unique_violation(&e, "uq_skip_record_advance_month") => {
            return Err(GarrisonError::DuplicateSkipMonth(format!(
                "Month {} is already waived on advance {}",
                request.skip_month, request.advance_id
            )));
        }
        Err(e) => return Err(e.into()),
    };

    tx.commit().await?;

    audit::record(
        pool,
        Some(admin_id),
        "skip.approved",
        "skip_request",
        &skip_request_id.to_string(),
        serde_json::json!({
            "advance_id": record.advance_id,
            "month": record.skip_month,
            "skip_record_id": record.skip_record_id,
            "waived_amount": record.waived_amount,
        }),
    )
    .await;

    tracing::info!(
        "Skip request {} approved, month {} waived on advance {}",
        skip_request_id,
        request.skip_month,
        request.advance_id
    );
    Ok(updated)
}

pub async fn reject_skip_internal(
    pool: &DbPool,
    admin_id: i32,
    skip_request_id: i32,
    notes: Option<String>,
) -> GarrisonResult<SkipRequest> {
    let mut tx = pool.begin().await?;
    let request = lock_skip_request(&mut tx, skip_request_id).await?;
    if request.status != SkipStatus::Pending {
        return Err(GarrisonError::Validation(format!(
            "Skip request {} is {}, only pending requests can be rejected",
            skip_request_id, request.status
        )));
    }

    let now = Local::now().naive_local();
    let updated = sqlx::query_as::<_, SkipRequest>(
        "UPDATE advance_skip_requests
         SET status = 'rejected', reviewed_by = $1, reviewed_at = $2, review_notes = $3
         WHERE skip_request_id = $4
         RETURNING *",
    )
    .bind(admin_id)
    .bind(now)
    .bind(notes.as_deref())
    .bind(skip_request_id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    audit::record(
        pool,
        Some(admin_id),
        "skip.rejected",
        "skip_request",
        &skip_request_id.to_string(),
        serde_json::json!({ "advance_id": request.advance_id, "notes": notes }),
    )
    .await;
    Ok(updated)
}

pub async fn cancel_skip_internal(
    pool: &DbPool,
    actor_id: i32,
    actor_is_admin: bool,
    skip_request_id: i32,
) -> GarrisonResult<SkipRequest> {
    let mut tx = pool.begin().await?;
    let request = lock_skip_request(&mut tx, skip_request_id).await?;

    let owner: i32 =
        sqlx::query_scalar("SELECT employee_id FROM advances WHERE advance_id = $1")
            .bind(request.advance_id)
            .fetch_one(&mut *tx)
            .await?;
    if owner != actor_id && !actor_is_admin {
        return Err(GarrisonError::Forbidden(
            "Only the advance holder can cancel this skip request".to_string(),
        ));
    }
    if request.status != SkipStatus::Pending {
        return Err(GarrisonError::Validation(format!(
            "Skip request {} is {}, only pending requests can be cancelled",
            skip_request_id, request.status
        )));
    }

    let updated = sqlx::query_as::<_, SkipRequest>(
        "UPDATE advance_skip_requests SET status = 'cancelled' WHERE skip_request_id = $1 RETURNING *",
    )
    .bind(skip_request_id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    audit::record(
        pool,
        Some(actor_id),
        "skip.cancelled",
        "skip_request",
        &skip_request_id.to_string(),
        serde_json::json!({ "advance_id": request.advance_id, "month": request.skip_month }),
    )
    .await;
    Ok(updated)
}

// --- Handlers -----------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipRequestInput {
    pub advance_id: i32,
    pub month: String,
    pub reason: String,
}

pub async fn request_skip(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<SkipRequestInput>,
) -> GarrisonResult<Json<SkipRequest>> {
    let actor_id = claims.employee_id()?;
    let request = request_skip_internal(
        &state.pool,
        actor_id,
        claims.is_admin(),
        input.advance_id,
        &input.month,
        &input.reason,
    )
    .await?;
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipActionInput {
    pub skip_request_id: i32,
    pub notes: Option<String>,
}

pub async fn approve_skip(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<SkipActionInput>,
) -> GarrisonResult<Json<SkipRequest>> {
    claims.require_admin()?;
    let request = approve_skip_internal(
        &state.pool,
        claims.employee_id()?,
        input.skip_request_id,
        input.notes,
    )
    .await?;
    Ok(Json(request))
}

pub async fn reject_skip(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<SkipActionInput>,
) -> GarrisonResult<Json<SkipRequest>> {
    claims.require_admin()?;
    let request = reject_skip_internal(
        &state.pool,
        claims.employee_id()?,
        input.skip_request_id,
        input.notes,
    )
    .await?;
    Ok(Json(request))
}

pub async fn cancel_skip(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<SkipActionInput>,
) -> GarrisonResult<Json<SkipRequest>> {
    let actor_id = claims.employee_id()?;
    let request = cancel_skip_internal(
        &state.pool,
        actor_id,
        claims.is_admin(),
        input.skip_request_id,
    )
    .await?;
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
pub struct SkipListQuery {
    pub advance_id: i32,
}

pub async fn list_skips(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SkipListQuery>,
) -> GarrisonResult<Json<Vec<SkipRequest>>> {
    let advance = sqlx::query_as::<_, Advance>("SELECT * FROM advances WHERE advance_id = $1")
        .bind(query.advance_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| GarrisonError::NotFound(format!("No advance {}", query.advance_id)))?;
    if !claims.is_admin() && claims.employee_id()? != advance.employee_id {
        return Err(GarrisonError::Forbidden(
            "Skip history is visible to the advance holder and admins".to_string(),
        ));
    }

    let rows = sqlx::query_as::<_, SkipRequest>(
        "SELECT * FROM advance_skip_requests WHERE advance_id = $1 ORDER BY created_at DESC",
    )
    .bind(query.advance_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}
