use crate::commands::audit;
use crate::db::{is_unique_violation, Advance, AdvancePriority, AdvanceStatus, DbPool, DeductionRecord};
use crate::error::{GarrisonError, GarrisonResult};
use crate::middleware::auth::Claims;
use crate::state::AppState;
use axum::extract::{Extension, Json, Query, State as AxumState};
use chrono::{Datelike, Local, Months, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use std::str::FromStr;

// --- Pure ledger rules --------------------------------------------------

/// Equal monthly installment, rounded to two decimal places with the
/// midpoint away from zero. Stored once at request time and never
/// re-derived; the final installment absorbs the rounding remainder
/// through the partial-payment path.
pub fn monthly_deduction_for(total: Decimal, installments: i32) -> Decimal {
    (total / Decimal::from(installments))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeductionPlan {
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub is_partial: bool,
    pub completes: bool,
}

/// What this month's deduction does to the balance. `None` when nothing
/// is outstanding.
pub fn plan_deduction(monthly: Decimal, remaining: Decimal) -> Option<DeductionPlan> {
    if remaining <= Decimal::ZERO {
        return None;
    }
    let amount = monthly.min(remaining);
    let balance_after = remaining - amount;
    Some(DeductionPlan {
        amount,
        balance_after,
        is_partial: amount < monthly,
        completes: balance_after == Decimal::ZERO,
    })
}

/// The advance state machine. Completed, cancelled and rejected are
/// terminal. Approval moves pending straight to active.
pub fn can_transition(from: AdvanceStatus, to: AdvanceStatus) -> bool {
    use AdvanceStatus::*;
    matches!(
        (from, to),
        (Pending, Active)
            | (Pending, Rejected)
            | (Pending, Cancelled)
            | (Approved, Suspended)
            | (Approved, Cancelled)
            | (Approved, Completed)
            | (Active, Suspended)
            | (Active, Cancelled)
            | (Active, Completed)
            | (Suspended, Active)
            | (Suspended, Cancelled)
    )
}

/// Deduction and skip months travel as "YYYY-MM" strings.
pub fn parse_month(month: &str) -> GarrisonResult<(i32, u32)> {
    let invalid = || GarrisonError::Validation(format!("Month must be YYYY-MM, got '{}'", month));
    let (y, m) = month.split_once('-').ok_or_else(invalid)?;
    if y.len() != 4 || m.len() != 2 {
        return Err(invalid());
    }
    let year: i32 = y.parse().map_err(|_| invalid())?;
    let mon: u32 = m.parse().map_err(|_| invalid())?;
    if !(2000..=2100).contains(&year) || !(1..=12).contains(&mon) {
        return Err(invalid());
    }
    Ok((year, mon))
}

pub fn format_request_number(year: i32, sequence: i64) -> String {
    format!("AP-{}-{:04}", year, sequence)
}

// --- Internals ----------------------------------------------------------

async fn lock_advance(
    tx: &mut Transaction<'_, Postgres>,
    advance_id: i32,
) -> GarrisonResult<Advance> {
    sqlx::query_as::<_, Advance>("SELECT * FROM advances WHERE advance_id = $1 FOR UPDATE")
        .bind(advance_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| GarrisonError::NotFound(format!("No advance {}", advance_id)))
}

async fn next_request_number(pool: &DbPool, year: i32) -> GarrisonResult<String> {
    let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM advances WHERE request_number LIKE $1")
        .bind(format!("AP-{}-%", year))
        .fetch_one(pool)
        .await?;
    Ok(format_request_number(year, taken + 1))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdvanceInput {
    pub employee_id: Option<i32>,
    pub total_amount: Decimal,
    pub installments: i32,
    pub purpose: String,
    pub priority: Option<String>,
    #[serde(default)]
    pub is_emergency: bool,
    pub start_date: Option<String>,
}

pub async fn create_advance_internal(
    pool: &DbPool,
    actor_id: i32,
    actor_is_admin: bool,
    input: CreateAdvanceInput,
) -> GarrisonResult<Advance> {
    // 1. Field validation.
    if input.total_amount <= Decimal::ZERO {
        return Err(GarrisonError::Validation(
            "Advance amount must be positive".to_string(),
        ));
    }
    if !(1..=12).contains(&input.installments) {
        return Err(GarrisonError::Validation(
            "Installments must be between 1 and 12".to_string(),
        ));
    }
    let purpose = input.purpose.trim();
    if purpose.is_empty() {
        return Err(GarrisonError::Validation("Purpose is required".to_string()));
    }
    let priority = match input.priority.as_deref() {
        Some(p) => AdvancePriority::from_str(p)?,
        None => AdvancePriority::Normal,
    };

    let employee_id = input.employee_id.unwrap_or(actor_id);
    if employee_id != actor_id && !actor_is_admin {
        return Err(GarrisonError::Forbidden(
            "Guards may only request advances for themselves".to_string(),
        ));
    }

    // 2. Target employee must exist and be active.
    let employee: Option<(String,)> =
        sqlx::query_as("SELECT status FROM employees WHERE employee_id = $1")
            .bind(employee_id)
            .fetch_optional(pool)
            .await?;
    match employee {
        None => return Err(GarrisonError::NotFound(format!("No employee {}", employee_id))),
        Some((status,)) if status != "active" => {
            return Err(GarrisonError::Validation(
                "Cannot open an advance for a deactivated employee".to_string(),
            ))
        }
        _ => {}
    }

    // 3. One live advance per employee.
    let live: Option<(i32,)> = sqlx::query_as(
        "SELECT advance_id FROM advances
         WHERE employee_id = $1 AND status IN ('pending', 'approved', 'active')
         LIMIT 1",
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await?;
    if let Some((existing,)) = live {
        return Err(GarrisonError::DuplicateActiveAdvance(format!(
            "Advance {} is still open for this employee",
            existing
        )));
    }

    // 4. Derived fields.
    let now = Local::now().naive_local();
    let start_date = match &input.start_date {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| GarrisonError::Validation(format!("Invalid start date: {}", e)))?,
        None => now.date(),
    };
    let expected_completion = start_date
        .checked_add_months(Months::new(input.installments as u32))
        .ok_or_else(|| GarrisonError::Validation("Start date out of range".to_string()))?;
    let monthly = monthly_deduction_for(input.total_amount, input.installments);

    let (status, approved_by, approved_at) = if actor_is_admin {
        (AdvanceStatus::Active, Some(actor_id), Some(now))
    } else {
        (AdvanceStatus::Pending, None, None)
    };

    // 5. Insert, retrying the request number if a concurrent request
    //    grabbed the same sequence.
    let mut attempt = 0;
    let advance = loop {
        attempt += 1;
        let request_number = next_request_number(pool, start_date.year()).await?;
        let inserted = sqlx::query_as::<_, Advance>(
            r#"
            INSERT INTO advances
                (employee_id, request_number, total_amount, monthly_deduction,
                 remaining_balance, installments, purpose, priority, is_emergency,
                 status, start_date, expected_completion_date, requested_by,
                 approved_by, approved_at)
            VALUES ($1, $2, $3, $4, $3, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(employee_id)
        .bind(&request_number)
        .bind(input.total_amount)
        .bind(monthly)
        .bind(input.installments)
        .bind(purpose)
        .bind(priority)
        .bind(input.is_emergency)
        .bind(status)
        .bind(start_date)
        .bind(expected_completion)
        .bind(actor_id)
        .bind(approved_by)
        .bind(approved_at)
        .fetch_one(pool)
        .await;

        match inserted {
            Ok(a) => break a,
            Err(e) if is_unique_violation(&e, "uq_advance_request_number") && attempt < 5 => {
                tracing::debug!(
                    "Request number {} taken, retrying (attempt {})",
                    request_number,
                    attempt
                );
                continue;
            }
            // A concurrent request slipped past the pre-check above.
            Err(e) if is_unique_violation(&e, "uq_advances_one_live") => {
                return Err(GarrisonError::DuplicateActiveAdvance(
                    "Another advance is still open for this employee".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        }
    };

    audit::record(
        pool,
        Some(actor_id),
        "advance.requested",
        "advance",
        &advance.advance_id.to_string(),
        serde_json::json!({
            "request_number": advance.request_number,
            "employee_id": employee_id,
            "total_amount": advance.total_amount,
            "installments": advance.installments,
            "status": advance.status,
        }),
    )
    .await;

    tracing::info!(
        "Advance {} ({}) requested for employee {}",
        advance.advance_id,
        advance.request_number,
        employee_id
    );
    Ok(advance)
}

pub async fn approve_advance_internal(
    pool: &DbPool,
    admin_id: i32,
    advance_id: i32,
) -> GarrisonResult<Advance> {
    let mut tx = pool.begin().await?;
    let advance = lock_advance(&mut tx, advance_id).await?;
    if advance.status != AdvanceStatus::Pending {
        return Err(GarrisonError::Validation(format!(
            "Only pending advances can be approved, advance {} is {}",
            advance_id, advance.status
        )));
    }

    let now = Local::now().naive_local();
    let updated = sqlx::query_as::<_, Advance>(
        "UPDATE advances
         SET status = 'active', approved_by = $1, approved_at = $2, updated_at = $2
         WHERE advance_id = $3
         RETURNING *",
    )
    .bind(admin_id)
    .bind(now)
    .bind(advance_id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    audit::record(
        pool,
        Some(admin_id),
        "advance.approved",
        "advance",
        &advance_id.to_string(),
        serde_json::json!({ "request_number": updated.request_number }),
    )
    .await;
    Ok(updated)
}

pub async fn reject_advance_internal(
    pool: &DbPool,
    admin_id: i32,
    advance_id: i32,
    notes: Option<String>,
) -> GarrisonResult<Advance> {
    let mut tx = pool.begin().await?;
    let advance = lock_advance(&mut tx, advance_id).await?;
    if advance.status != AdvanceStatus::Pending {
        return Err(GarrisonError::Validation(format!(
            "Only pending advances can be rejected, advance {} is {}",
            advance_id, advance.status
        )));
    }

    let now = Local::now().naive_local();
    let updated = sqlx::query_as::<_, Advance>(
        "UPDATE advances SET status = 'rejected', updated_at = $1 WHERE advance_id = $2 RETURNING *",
    )
    .bind(now)
    .bind(advance_id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    audit::record(
        pool,
        Some(admin_id),
        "advance.rejected",
        "advance",
        &advance_id.to_string(),
        serde_json::json!({ "notes": notes }),
    )
    .await;
    Ok(updated)
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeductionOutcome {
    /// An approved skip covers the month; the balance is untouched.
    Skipped { advance_id: i32, month: String },
    Posted {
        advance_id: i32,
        deduction_id: i32,
        amount: Decimal,
        balance_after: Decimal,
        is_partial: bool,
        completed: bool,
    },
}

/// Posts one month's deduction against an advance. Called once per advance
/// by the payroll batch; the per-month unique index turns a re-run into a
/// 409 instead of a double charge.
pub async fn post_monthly_deduction_internal(
    pool: &DbPool,
    actor_id: i32,
    advance_id: i32,
    month: &str,
    salary_record_id: Option<i32>,
) -> GarrisonResult<DeductionOutcome> {
    parse_month(month)?;

    // 1. Lock the advance for the whole read-compute-write cycle.
    let mut tx = pool.begin().await?;
    let advance = lock_advance(&mut tx, advance_id).await?;
    if !advance.status.is_deductible() {
        return Err(GarrisonError::Validation(format!(
            "Advance {} is {}, deductions only run against active advances",
            advance_id, advance.status
        )));
    }

    // 2. An approved skip for this month waives the installment entirely.
    let skipped: Option<(i32,)> = sqlx::query_as(
        "SELECT skip_record_id FROM advance_skip_records
         WHERE advance_id = $1 AND skip_month = $2",
    )
    .bind(advance_id)
    .bind(month)
    .fetch_optional(&mut *tx)
    .await?;
    if skipped.is_some() {
        tx.commit().await?;
        tracing::info!("Deduction for {} skipped, month {} is waived", advance_id, month);
        return Ok(DeductionOutcome::Skipped {
            advance_id,
            month: month.to_string(),
        });
    }

    // 3. Plan the amount; the final installment may be partial.
    let plan = plan_deduction(advance.monthly_deduction, advance.remaining_balance)
        .ok_or_else(|| {
            GarrisonError::Validation(format!("Advance {} has no outstanding balance", advance_id))
        })?;
    let sequence = advance.paid_installments + 1;

    // 4. Append the immutable deduction row.
    let inserted: Result<i32, sqlx::Error> = sqlx::query_scalar(
        r#"
        INSERT INTO advance_deductions
            (advance_id, salary_record_id, principal_amount, balance_before,
             balance_after, deduction_month, payment_sequence, is_partial)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING deduction_id
        "#,
    )
    .bind(advance_id)
    .bind(salary_record_id)
    .bind(plan.amount)
    .bind(advance.remaining_balance)
    .bind(plan.balance_after)
    .bind(month)
    .bind(sequence)
    .bind(plan.is_partial)
    .fetch_one(&mut *tx)
    .await;

    let deduction_id = match inserted {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e, "uq_deduction_advance_month") => {
            return Err(GarrisonError::DuplicateDeduction(format!(
                "A deduction for {} is already posted against advance {}",
                month, advance_id
            )));
        }
        Err(e) => return Err(e.into()),
    };

    // 5. Roll the balance forward; zero balance completes the advance.
    let now = Local::now().naive_local();
    if plan.completes {
        sqlx::query(
            "UPDATE advances
             SET remaining_balance = $1, total_deducted = total_deducted + $2,
                 paid_installments = paid_installments + 1,
                 status = 'completed', actual_completion_date = $3, updated_at = $4
             WHERE advance_id = $5",
        )
        .bind(plan.balance_after)
        .bind(plan.amount)
        .bind(now.date())
        .bind(now)
        .bind(advance_id)
        .execute(&mut *tx)
        .await?;
    } else {
        sqlx::query(
            "UPDATE advances
             SET remaining_balance = $1, total_deducted = total_deducted + $2,
                 paid_installments = paid_installments + 1, updated_at = $3
             WHERE advance_id = $4",
        )
        .bind(plan.balance_after)
        .bind(plan.amount)
        .bind(now)
        .bind(advance_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    audit::record(
        pool,
        Some(actor_id),
        "advance.deduction_posted",
        "advance",
        &advance_id.to_string(),
        serde_json::json!({
            "month": month,
            "amount": plan.amount,
            "balance_after": plan.balance_after,
            "sequence": sequence,
            "is_partial": plan.is_partial,
            "completed": plan.completes,
        }),
    )
    .await;

    tracing::info!(
        "Posted deduction of {} against advance {} for {}, balance now {}",
        plan.amount,
        advance_id,
        month,
        plan.balance_after
    );
    Ok(DeductionOutcome::Posted {
        advance_id,
        deduction_id,
        amount: plan.amount,
        balance_after: plan.balance_after,
        is_partial: plan.is_partial,
        completed: plan.completes,
    })
}

pub async fn update_status_internal(
    pool: &DbPool,
    admin_id: i32,
    advance_id: i32,
    new_status: AdvanceStatus,
    reason: Option<String>,
) -> GarrisonResult<Advance> {
    // Approval, rejection and completion run through their own paths.
    if !matches!(
        new_status,
        AdvanceStatus::Suspended | AdvanceStatus::Active | AdvanceStatus::Cancelled
    ) {
        return Err(GarrisonError::Validation(format!(
            "Status endpoint only suspends, resumes or cancels, got '{}'",
            new_status
        )));
    }

    let mut tx = pool.begin().await?;
    let advance = lock_advance(&mut tx, advance_id).await?;
    if !can_transition(advance.status, new_status) {
        return Err(GarrisonError::Validation(format!(
            "Cannot move advance {} from {} to {}",
            advance_id, advance.status, new_status
        )));
    }

    let now = Local::now().naive_local();
    let updated = match new_status {
        AdvanceStatus::Suspended => {
            let reason = reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| {
                    GarrisonError::Validation("Suspension requires a reason".to_string())
                })?;
            sqlx::query_as::<_, Advance>(
                "UPDATE advances
                 SET status = 'suspended', suspended_at = $1, suspension_reason = $2, updated_at = $1
                 WHERE advance_id = $3
                 RETURNING *",
            )
            .bind(now)
            .bind(reason)
            .bind(advance_id)
            .fetch_one(&mut *tx)
            .await?
        }
        AdvanceStatus::Active => {
            let resumed = sqlx::query_as::<_, Advance>(
                "UPDATE advances
                 SET status = 'active', suspended_at = NULL, suspension_reason = NULL, updated_at = $1
                 WHERE advance_id = $2
                 RETURNING *",
            )
            .bind(now)
            .bind(advance_id)
            .fetch_one(&mut *tx)
            .await;
            match resumed {
                Ok(a) => a,
                // A replacement advance went live during the suspension;
                // resuming would put two in the live set.
                Err(e) if is_unique_violation(&e, "uq_advances_one_live") => {
                    return Err(GarrisonError::DuplicateActiveAdvance(format!(
                        "Another advance went live while advance {} was suspended",
                        advance_id
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        _ => {
            let reason = reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| {
                    GarrisonError::Validation("Cancellation requires a reason".to_string())
                })?;
            sqlx::query_as::<_, Advance>(
                "UPDATE advances
                 SET status = 'cancelled', cancelled_at = $1, cancellation_reason = $2, updated_at = $1
                 WHERE advance_id = $3
                 RETURNING *",
            )
            .bind(now)
            .bind(reason)
            .bind(advance_id)
            .fetch_one(&mut *tx)
            .await?
        }
    };
    tx.commit().await?;

    audit::record(
        pool,
        Some(admin_id),
        "advance.status_changed",
        "advance",
        &advance_id.to_string(),
        serde_json::json!({
            "from": advance.status,
            "to": updated.status,
            "reason": reason,
        }),
    )
    .await;
    Ok(updated)
}

// --- Handlers -----------------------------------------------------------

pub async fn request_advance(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<CreateAdvanceInput>,
) -> GarrisonResult<Json<Advance>> {
    let actor_id = claims.employee_id()?;
    let advance = create_advance_internal(&state.pool, actor_id, claims.is_admin(), input).await?;
    Ok(Json(advance))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceActionInput {
    pub advance_id: i32,
    pub notes: Option<String>,
}

pub async fn approve_advance(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<AdvanceActionInput>,
) -> GarrisonResult<Json<Advance>> {
    claims.require_admin()?;
    let advance =
        approve_advance_internal(&state.pool, claims.employee_id()?, input.advance_id).await?;
    Ok(Json(advance))
}

pub async fn reject_advance(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<AdvanceActionInput>,
) -> GarrisonResult<Json<Advance>> {
    claims.require_admin()?;
    let advance = reject_advance_internal(
        &state.pool,
        claims.employee_id()?,
        input.advance_id,
        input.notes,
    )
    .await?;
    Ok(Json(advance))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeductInput {
    pub advance_id: i32,
    pub month: String,
    pub salary_record_id: Option<i32>,
}

pub async fn post_deduction(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<DeductInput>,
) -> GarrisonResult<Json<DeductionOutcome>> {
    claims.require_admin()?;
    let outcome = post_monthly_deduction_internal(
        &state.pool,
        claims.employee_id()?,
        input.advance_id,
        &input.month,
        input.salary_record_id,
    )
    .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInput {
    pub advance_id: i32,
    pub status: String,
    pub reason: Option<String>,
}

pub async fn update_advance_status(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<StatusInput>,
) -> GarrisonResult<Json<Advance>> {
    claims.require_admin()?;
    let new_status = AdvanceStatus::from_str(&input.status)?;
    let advance = update_status_internal(
        &state.pool,
        claims.employee_id()?,
        input.advance_id,
        new_status,
        input.reason,
    )
    .await?;
    Ok(Json(advance))
}

pub async fn my_advances(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
) -> GarrisonResult<Json<Value>> {
    let employee_id = claims.employee_id()?;

    let advances = sqlx::query_as::<_, Advance>(
        "SELECT * FROM advances WHERE employee_id = $1 ORDER BY created_at DESC",
    )
    .bind(employee_id)
    .fetch_all(&state.pool)
    .await?;

    let ids: Vec<i32> = advances.iter().map(|a| a.advance_id).collect();
    let skip_counts: Vec<(i32, i64)> = sqlx::query_as(
        "SELECT advance_id, COUNT(*) FROM advance_skip_records
         WHERE advance_id = ANY($1) GROUP BY advance_id",
    )
    .bind(&ids)
    .fetch_all(&state.pool)
    .await?;

    let outstanding: Decimal = advances
        .iter()
        .filter(|a| {
            matches!(
                a.status,
                AdvanceStatus::Approved | AdvanceStatus::Active | AdvanceStatus::Suspended
            )
        })
        .map(|a| a.remaining_balance)
        .sum();

    let rows: Vec<Value> = advances
        .into_iter()
        .map(|a| {
            let total_skips = skip_counts
                .iter()
                .find(|(id, _)| *id == a.advance_id)
                .map(|(_, n)| *n)
                .unwrap_or(0);
            let progress = if a.total_amount.is_zero() {
                Decimal::ZERO
            } else {
                (a.total_deducted / a.total_amount * Decimal::from(100)).round_dp(1)
            };
            serde_json::json!({
                "advance_id": a.advance_id,
                "request_number": a.request_number,
                "amount": a.total_amount,
                "monthly_deduction": a.monthly_deduction,
                "remaining_balance": a.remaining_balance,
                "total_deducted": a.total_deducted,
                "installment_count": a.installments,
                "paid_installments": a.paid_installments,
                "total_skips": total_skips,
                "progress_percentage": progress,
                "purpose": a.purpose,
                "priority": a.priority,
                "is_emergency": a.is_emergency,
                "status": a.status,
                "start_date": a.start_date,
                "expected_completion_date": a.expected_completion_date,
                "actual_completion_date": a.actual_completion_date,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "outstanding_balance": outstanding,
        "advances": rows,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AllAdvancesQuery {
    pub status: Option<String>,
    pub employee_id: Option<i32>,
}

pub async fn all_advances(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AllAdvancesQuery>,
) -> GarrisonResult<Json<Vec<Advance>>> {
    claims.require_admin()?;

    let status = match query.status.as_deref() {
        Some(s) => Some(AdvanceStatus::from_str(s)?),
        None => None,
    };

    let advances: Vec<Advance> = match (status, query.employee_id) {
        (Some(st), Some(emp)) => {
            sqlx::query_as(
                "SELECT * FROM advances WHERE status = $1 AND employee_id = $2
                 ORDER BY created_at DESC LIMIT 500",
            )
            .bind(st)
            .bind(emp)
            .fetch_all(&state.pool)
            .await?
        }
        (Some(st), None) => {
            sqlx::query_as(
                "SELECT * FROM advances WHERE status = $1 ORDER BY created_at DESC LIMIT 500",
            )
            .bind(st)
            .fetch_all(&state.pool)
            .await?
        }
        (None, Some(emp)) => {
            sqlx::query_as(
                "SELECT * FROM advances WHERE employee_id = $1 ORDER BY created_at DESC LIMIT 500",
            )
            .bind(emp)
            .fetch_all(&state.pool)
            .await?
        }
        (None, None) => {
            sqlx::query_as("SELECT * FROM advances ORDER BY created_at DESC LIMIT 500")
                .fetch_all(&state.pool)
                .await?
        }
    };
    Ok(Json(advances))
}

#[derive(Debug, Deserialize)]
pub struct DeductionHistoryQuery {
    pub advance_id: i32,
}

pub async fn deduction_history(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DeductionHistoryQuery>,
) -> GarrisonResult<Json<Vec<DeductionRecord>>> {
    let advance = sqlx::query_as::<_, Advance>("SELECT * FROM advances WHERE advance_id = $1")
        .bind(query.advance_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| GarrisonError::NotFound(format!("No advance {}", query.advance_id)))?;

    if !claims.is_admin() && claims.employee_id()? != advance.employee_id {
        return Err(GarrisonError::Forbidden(
            "Deduction history is visible to the advance holder and admins".to_string(),
        ));
    }

    let rows = sqlx::query_as::<_, DeductionRecord>(
        "SELECT * FROM advance_deductions WHERE advance_id = $1 ORDER BY payment_sequence ASC",
    )
    .bind(query.advance_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

pub async fn advance_summary(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
) -> GarrisonResult<Json<Value>> {
    claims.require_admin()?;

    let counts: Vec<(AdvanceStatus, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM advances GROUP BY status")
            .fetch_all(&state.pool)
            .await?;
    let count_of = |wanted: AdvanceStatus| {
        counts
            .iter()
            .find(|(s, _)| *s == wanted)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };

    let outstanding: Option<Decimal> = sqlx::query_scalar(
        "SELECT SUM(remaining_balance) FROM advances
         WHERE status IN ('approved', 'active', 'suspended')",
    )
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(serde_json::json!({
        "pending_count": count_of(AdvanceStatus::Pending),
        "active_count": count_of(AdvanceStatus::Active) + count_of(AdvanceStatus::Approved),
        "suspended_count": count_of(AdvanceStatus::Suspended),
        "completed_count": count_of(AdvanceStatus::Completed),
        "total_outstanding": outstanding.unwrap_or_default(),
    })))
}
