use crate::db::{DbPool, RosterAssignment, RosterShiftRow, Shift};
use crate::error::{GarrisonError, GarrisonResult};
use crate::middleware::auth::Claims;
use crate::state::AppState;
use axum::extract::{Extension, Json, Query, State as AxumState};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use serde_json::Value;
use sqlx::{Postgres, Transaction};

// --- Shift windows ------------------------------------------------------

/// One concrete occurrence of a rostered shift: the shift's time-of-day
/// bounds projected onto an anchor date, end pushed past midnight for
/// overnight shifts.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftWindow {
    pub roster_id: i32,
    pub shift_id: i32,
    pub anchor_date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub grace: Duration,
}

impl ShiftWindow {
    /// Window membership including the grace allowance on both bounds.
    /// Inclusive: a scan exactly at `start - grace` is inside.
    pub fn contains_with_grace(&self, at: NaiveDateTime) -> bool {
        self.start - self.grace <= at && at <= self.end + self.grace
    }
}

/// An overnight shift ends on the day after it starts (end <= start).
pub fn is_overnight(start_time: NaiveTime, end_time: NaiveTime) -> bool {
    end_time <= start_time
}

pub fn window_for_anchor(
    roster_id: i32,
    shift_id: i32,
    anchor: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    grace_minutes: i64,
) -> ShiftWindow {
    let start = anchor.and_time(start_time);
    let mut end = anchor.and_time(end_time);
    if end <= start {
        end += Duration::days(1);
    }
    ShiftWindow {
        roster_id,
        shift_id,
        anchor_date: anchor,
        start,
        end,
        grace: Duration::minutes(grace_minutes),
    }
}

/// All (roster, anchor) windows containing `now`. Overnight shifts are also
/// evaluated anchored on the previous day so a 22:00-06:00 guard scanning at
/// 01:00 matches the shift that started yesterday; the roster row must be
/// active on the anchor date it is matched under.
pub fn matching_windows(
    rows: &[RosterShiftRow],
    now: NaiveDateTime,
    default_grace_minutes: i64,
) -> Vec<ShiftWindow> {
    let today = now.date();
    let yesterday = today - Duration::days(1);

    let mut matches = Vec::new();
    for row in rows {
        let grace = row
            .grace_minutes
            .map(i64::from)
            .unwrap_or(default_grace_minutes);

        let mut anchors = vec![today];
        if is_overnight(row.start_time, row.end_time) {
            anchors.push(yesterday);
        }

        for anchor in anchors {
            if row.start_date > anchor {
                continue;
            }
            if let Some(end_date) = row.end_date {
                if end_date < anchor {
                    continue;
                }
            }
            let window = window_for_anchor(
                row.roster_id,
                row.shift_id,
                anchor,
                row.start_time,
                row.end_time,
                grace,
            );
            if window.contains_with_grace(now) {
                matches.push(window);
            }
        }
    }
    matches
}

/// Roster rows for (guard, society) that could produce a window around the
/// given date, including yesterday-anchored overnight spillover. Runs on the
/// caller's transaction; a scan holds exactly one pool connection from begin
/// to commit.
pub async fn fetch_roster_shifts(
    tx: &mut Transaction<'_, Postgres>,
    guard_id: i32,
    society_id: i32,
    today: NaiveDate,
) -> GarrisonResult<Vec<RosterShiftRow>> {
    let yesterday = today - Duration::days(1);
    Ok(sqlx::query_as::<_, RosterShiftRow>(
        r#"
        SELECT r.roster_id, r.shift_id, r.start_date, r.end_date,
               s.start_time, s.end_time, s.grace_minutes
        FROM roster r
        JOIN shifts s ON s.shift_id = r.shift_id
        WHERE r.guard_id = $1 AND r.society_id = $2
          AND r.start_date <= $3
          AND (r.end_date IS NULL OR r.end_date >= $4)
        "#,
    )
    .bind(guard_id)
    .bind(society_id)
    .bind(today)
    .bind(yesterday)
    .fetch_all(&mut **tx)
    .await?)
}

// --- Shift administration ----------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShiftInput {
    pub shift_name: String,
    pub start_time: String,
    pub end_time: String,
    pub grace_minutes: Option<i32>,
}

fn parse_time(label: &str, raw: &str) -> GarrisonResult<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| GarrisonError::Validation(format!("Invalid {} '{}', expected HH:MM", label, raw)))
}

pub async fn create_shift_internal(pool: &DbPool, input: CreateShiftInput) -> GarrisonResult<i32> {
    if input.shift_name.trim().is_empty() {
        return Err(GarrisonError::Validation("Shift name is required".to_string()));
    }
    let start = parse_time("start time", &input.start_time)?;
    let end = parse_time("end time", &input.end_time)?;
    if start == end {
        return Err(GarrisonError::Validation(
            "Shift start and end must differ".to_string(),
        ));
    }
    if let Some(grace) = input.grace_minutes {
        if grace < 0 {
            return Err(GarrisonError::Validation(
                "Grace minutes cannot be negative".to_string(),
            ));
        }
    }

    let id: i32 = sqlx::query_scalar(
        "INSERT INTO shifts (shift_name, start_time, end_time, grace_minutes)
         VALUES ($1, $2, $3, $4)
         RETURNING shift_id",
    )
    .bind(input.shift_name.trim())
    .bind(start)
    .bind(end)
    .bind(input.grace_minutes)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn create_shift(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<CreateShiftInput>,
) -> GarrisonResult<Json<i32>> {
    claims.require_admin()?;
    let id = create_shift_internal(&state.pool, input).await?;
    Ok(Json(id))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShiftInput {
    pub shift_id: i32,
    pub shift_name: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub grace_minutes: Option<i32>,
}

pub async fn update_shift(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<UpdateShiftInput>,
) -> GarrisonResult<Json<Shift>> {
    claims.require_admin()?;

    let existing = sqlx::query_as::<_, Shift>("SELECT * FROM shifts WHERE shift_id = $1")
        .bind(input.shift_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| GarrisonError::NotFound(format!("No shift {}", input.shift_id)))?;

    let name = match input.shift_name {
        Some(n) => {
            let n = n.trim().to_string();
            if n.is_empty() {
                return Err(GarrisonError::Validation(
                    "Shift name cannot be blank".to_string(),
                ));
            }
            n
        }
        None => existing.shift_name,
    };
    let start = match &input.start_time {
        Some(raw) => parse_time("start time", raw)?,
        None => existing.start_time,
    };
    let end = match &input.end_time {
        Some(raw) => parse_time("end time", raw)?,
        None => existing.end_time,
    };
    if start == end {
        return Err(GarrisonError::Validation(
            "Shift start and end must differ".to_string(),
        ));
    }
    let grace = input.grace_minutes.or(existing.grace_minutes);
    if let Some(g) = grace {
        if g < 0 {
            return Err(GarrisonError::Validation(
                "Grace minutes cannot be negative".to_string(),
            ));
        }
    }

    let shift = sqlx::query_as::<_, Shift>(
        "UPDATE shifts
         SET shift_name = $1, start_time = $2, end_time = $3, grace_minutes = $4
         WHERE shift_id = $5
         RETURNING *",
    )
    .bind(&name)
    .bind(start)
    .bind(end)
    .bind(grace)
    .bind(input.shift_id)
    .fetch_one(&state.pool)
    .await?;
    Ok(Json(shift))
}

pub async fn list_shifts(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
) -> GarrisonResult<Json<Vec<Shift>>> {
    claims.require_admin()?;
    Ok(Json(
        sqlx::query_as::<_, Shift>("SELECT * FROM shifts ORDER BY start_time ASC")
            .fetch_all(&state.pool)
            .await?,
    ))
}

// --- Roster administration ----------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRosterInput {
    pub guard_id: i32,
    pub society_id: i32,
    pub shift_id: i32,
    pub team_id: Option<i32>,
    pub start_date: String,
    pub end_date: Option<String>,
}

fn parse_date(label: &str, raw: &str) -> GarrisonResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| GarrisonError::Validation(format!("Invalid {} '{}', expected YYYY-MM-DD", label, raw)))
}

pub async fn assign_roster_internal(
    pool: &DbPool,
    input: AssignRosterInput,
) -> GarrisonResult<RosterAssignment> {
    let start_date = parse_date("start date", &input.start_date)?;
    let end_date = match &input.end_date {
        Some(raw) if !raw.trim().is_empty() => Some(parse_date("end date", raw)?),
        _ => None,
    };
    if let Some(end) = end_date {
        if end < start_date {
            return Err(GarrisonError::Validation(
                "Roster end date precedes start date".to_string(),
            ));
        }
    }

    // 1. Referenced entities must exist; the guard must actually be a guard.
    let guard_role: Option<(String,)> =
        sqlx::query_as("SELECT role::text FROM employees WHERE employee_id = $1 AND status = 'active'")
            .bind(input.guard_id)
            .fetch_optional(pool)
            .await?;
    match guard_role {
        None => {
            return Err(GarrisonError::NotFound(format!(
                "No active employee {}",
                input.guard_id
            )))
        }
        Some((role,)) if role == "admin" => {
            return Err(GarrisonError::Validation(
                "Admin accounts cannot be rostered".to_string(),
            ))
        }
        _ => {}
    }

    let society: Option<(i32,)> =
        sqlx::query_as("SELECT society_id FROM societies WHERE society_id = $1")
            .bind(input.society_id)
            .fetch_optional(pool)
            .await?;
    if society.is_none() {
        return Err(GarrisonError::NotFound(format!(
            "No society {}",
            input.society_id
        )));
    }

    let shift: Option<(i32,)> = sqlx::query_as("SELECT shift_id FROM shifts WHERE shift_id = $1")
        .bind(input.shift_id)
        .fetch_optional(pool)
        .await?;
    if shift.is_none() {
        return Err(GarrisonError::NotFound(format!("No shift {}", input.shift_id)));
    }

    // 2. Insert the assignment
    let assignment = sqlx::query_as::<_, RosterAssignment>(
        "INSERT INTO roster (guard_id, society_id, shift_id, team_id, start_date, end_date)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING *",
    )
    .bind(input.guard_id)
    .bind(input.society_id)
    .bind(input.shift_id)
    .bind(input.team_id)
    .bind(start_date)
    .bind(end_date)
    .fetch_one(pool)
    .await?;
    Ok(assignment)
}

pub async fn assign_roster(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<AssignRosterInput>,
) -> GarrisonResult<Json<RosterAssignment>> {
    claims.require_admin()?;
    let assignment = assign_roster_internal(&state.pool, input).await?;
    Ok(Json(assignment))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRosterInput {
    pub roster_id: i32,
    pub end_date: String,
}

pub async fn end_roster(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<EndRosterInput>,
) -> GarrisonResult<Json<RosterAssignment>> {
    claims.require_admin()?;
    let end_date = parse_date("end date", &input.end_date)?;

    let assignment = sqlx::query_as::<_, RosterAssignment>(
        "UPDATE roster SET end_date = $1
         WHERE roster_id = $2 AND (end_date IS NULL OR end_date > $1)
         RETURNING *",
    )
    .bind(end_date)
    .bind(input.roster_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| {
        GarrisonError::NotFound(format!("No open roster assignment {}", input.roster_id))
    })?;
    Ok(Json(assignment))
}

#[derive(Debug, Deserialize)]
pub struct RosterQuery {
    pub guard_id: Option<i32>,
    pub society_id: Option<i32>,
}

pub async fn list_roster(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<RosterQuery>,
) -> GarrisonResult<Json<Vec<Value>>> {
    claims.require_admin()?;

    let sql = r#"
        SELECT r.roster_id, r.guard_id, e.full_name AS guard_name,
               r.society_id, so.society_name,
               r.shift_id, s.shift_name,
               to_char(s.start_time, 'HH24:MI') AS start_time,
               to_char(s.end_time, 'HH24:MI') AS end_time,
               r.team_id,
               to_char(r.start_date, 'YYYY-MM-DD') AS start_date,
               to_char(r.end_date, 'YYYY-MM-DD') AS end_date
        FROM roster r
        JOIN employees e ON e.employee_id = r.guard_id
        JOIN societies so ON so.society_id = r.society_id
        JOIN shifts s ON s.shift_id = r.shift_id
        WHERE ($1::int IS NULL OR r.guard_id = $1)
          AND ($2::int IS NULL OR r.society_id = $2)
        ORDER BY r.start_date DESC, r.roster_id DESC
    "#;

    let rows: Vec<(i32, i32, String, i32, String, i32, String, String, String, Option<i32>, String, Option<String>)> =
        sqlx::query_as(sql)
            .bind(query.guard_id)
            .bind(query.society_id)
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(
        rows.into_iter()
            .map(
                |(roster_id, guard_id, guard_name, society_id, society_name, shift_id, shift_name, start_time, end_time, team_id, start_date, end_date)| {
                    serde_json::json!({
                        "roster_id": roster_id,
                        "guard_id": guard_id,
                        "guard_name": guard_name,
                        "society_id": society_id,
                        "society_name": society_name,
                        "shift_id": shift_id,
                        "shift_name": shift_name,
                        "start_time": start_time,
                        "end_time": end_time,
                        "team_id": team_id,
                        "start_date": start_date,
                        "end_date": end_date,
                    })
                },
            )
            .collect(),
    ))
}
