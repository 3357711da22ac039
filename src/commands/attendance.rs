use crate::commands::{audit, roster};
use crate::config::AppConfig;
use crate::db::{is_unique_violation, Attendance, DbPool, EntryMethod, Society};
use crate::error::{GarrisonError, GarrisonResult};
use crate::geo;
use crate::middleware::auth::Claims;
use crate::state::AppState;
use axum::extract::{Extension, Json, Query, State as AxumState};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(rename = "qrCodeId")]
    pub qr_code_id: String,
    pub client_id: i32,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ScanData {
    pub attendance_id: i32,
}

/// Scan responses carry the envelope themselves so that `mode` sits at the
/// top level, the shape the mobile client was built against.
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub success: bool,
    pub mode: &'static str,
    pub message: String,
    pub data: ScanData,
}

#[derive(Debug, PartialEq)]
pub enum ScanOutcome {
    CheckedIn { attendance_id: i32 },
    CheckedOut { attendance_id: i32 },
}

pub async fn scan(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ScanRequest>,
) -> GarrisonResult<Json<ScanResponse>> {
    let guard_id = claims.employee_id()?;
    let outcome = scan_internal(&state.pool, &state.config, guard_id, req).await?;

    let response = match outcome {
        ScanOutcome::CheckedIn { attendance_id } => ScanResponse {
            success: true,
            mode: "checkin",
            message: "Checked in".to_string(),
            data: ScanData { attendance_id },
        },
        ScanOutcome::CheckedOut { attendance_id } => ScanResponse {
            success: true,
            mode: "checkout",
            message: "Checked out".to_string(),
            data: ScanData { attendance_id },
        },
    };
    Ok(Json(response))
}

pub async fn scan_internal(
    pool: &DbPool,
    config: &AppConfig,
    guard_id: i32,
    req: ScanRequest,
) -> GarrisonResult<ScanOutcome> {
    let now = Local::now().naive_local();

    if !geo::validate_coordinates(req.lat, req.lng) {
        return Err(GarrisonError::Validation(
            "Latitude/longitude out of range".to_string(),
        ));
    }

    // Mobile clocks drift; server time decides everything, the client
    // timestamp is only checked so bad devices show up in the logs.
    let drift = (Local::now().timestamp() - req.timestamp).abs();
    if drift > 300 {
        tracing::warn!(
            "Scan from guard {} has {}s of clock drift, trusting server time",
            guard_id,
            drift
        );
    }

    let guard_status: Option<(String,)> =
        sqlx::query_as("SELECT status FROM employees WHERE employee_id = $1")
            .bind(guard_id)
            .fetch_optional(pool)
            .await?;
    match guard_status {
        None => return Err(GarrisonError::NotFound(format!("No employee {}", guard_id))),
        Some((status,)) if status != "active" => {
            return Err(GarrisonError::Forbidden(
                "Employee account is deactivated".to_string(),
            ))
        }
        _ => {}
    }

    // 1. Site, QR expiry, geofence, QR match - in that order.
    let society = sqlx::query_as::<_, Society>("SELECT * FROM societies WHERE society_id = $1")
        .bind(req.client_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| GarrisonError::NotFound(format!("No society {}", req.client_id)))?;
    if society.status != "active" {
        return Err(GarrisonError::NotFound(format!(
            "Society {} is not active",
            req.client_id
        )));
    }

    if let Some(expires_at) = society.qr_expires_at {
        if expires_at < now {
            return Err(GarrisonError::ExpiredQr(
                "The site QR code has expired; ask the site admin to rotate it".to_string(),
            ));
        }
    }

    let fence = geo::check_geofence(
        req.lat,
        req.lng,
        society.latitude,
        society.longitude,
        society.geofence_radius_m.unwrap_or(config.geofence_radius_m),
        society
            .geofence_tolerance_m
            .unwrap_or(config.geofence_tolerance_m),
    );
    if !fence.within {
        return Err(GarrisonError::LocationMismatch(format!(
            "You are {:.0}m from the site (allowed {:.0}m)",
            fence.distance_m, fence.allowed_m
        )));
    }

    if society.qr_code != req.qr_code_id {
        return Err(GarrisonError::InvalidQr(
            "QR code does not belong to this site".to_string(),
        ));
    }

    // 2. Serialize on the guard's open session rows.
    let mut tx = pool.begin().await?;

    let open_sessions = sqlx::query_as::<_, Attendance>(
        "SELECT * FROM attendance
         WHERE guard_id = $1 AND check_out_at IS NULL
         ORDER BY check_in_at DESC
         FOR UPDATE",
    )
    .bind(guard_id)
    .fetch_all(&mut *tx)
    .await?;

    // More than one open session is a data anomaly (mobile retries, clock
    // skew). Keep the newest, force-close the rest.
    if open_sessions.len() > 1 {
        let stale_ids: Vec<i32> = open_sessions[1..]
            .iter()
            .map(|s| s.attendance_id)
            .collect();
        tracing::warn!(
            "Guard {} has {} open attendance sessions, force-closing all but the newest: {:?}",
            guard_id,
            open_sessions.len(),
            stale_ids
        );
        sqlx::query("UPDATE attendance SET check_out_at = $1 WHERE attendance_id = ANY($2)")
            .bind(now)
            .bind(&stale_ids)
            .execute(&mut *tx)
            .await?;
    }

    if let Some(session) = open_sessions.first() {
        // 3. Checkout path.
        if session.qr_code_id != req.qr_code_id {
            return Err(GarrisonError::LocationMismatch(
                "Checkout must use the same QR code as check-in".to_string(),
            ));
        }

        let elapsed = now - session.check_in_at;
        let min_gap = Duration::minutes(config.min_checkout_gap_minutes);
        if elapsed < min_gap {
            return Err(GarrisonError::TooSoon(format!(
                "Checkout allowed {} minutes after check-in",
                config.min_checkout_gap_minutes
            )));
        }

        sqlx::query(
            "UPDATE attendance
             SET check_out_at = $1, check_out_lat = $2, check_out_lng = $3
             WHERE attendance_id = $4",
        )
        .bind(now)
        .bind(req.lat)
        .bind(req.lng)
        .bind(session.attendance_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        audit::record(
            pool,
            Some(guard_id),
            "attendance.checked_out",
            "attendance",
            &session.attendance_id.to_string(),
            serde_json::json!({ "society_id": society.society_id }),
        )
        .await;

        tracing::info!(
            "Guard {} checked out (attendance {})",
            guard_id,
            session.attendance_id
        );
        return Ok(ScanOutcome::CheckedOut {
            attendance_id: session.attendance_id,
        });
    }

    // 4. Check-in path. The roster read rides the open transaction; the
    // engine holds a single pool connection per scan.
    let roster_rows =
        roster::fetch_roster_shifts(&mut tx, guard_id, society.society_id, now.date()).await?;
    if roster_rows.is_empty() {
        return Err(GarrisonError::NotAssigned(
            "You are not rostered at this site".to_string(),
        ));
    }

    let windows = roster::matching_windows(&roster_rows, now, config.shift_grace_minutes);
    if windows.len() > 1 {
        return Err(GarrisonError::OverlappingShifts(
            "More than one rostered shift matches this time; contact your scheduler".to_string(),
        ));
    }
    let window = windows.into_iter().next().ok_or_else(|| {
        GarrisonError::ShiftMismatch(
            "No rostered shift window covers this time".to_string(),
        )
    })?;

    let duplicate: Option<(i32,)> = sqlx::query_as(
        "SELECT attendance_id FROM attendance
         WHERE guard_id = $1 AND attendance_date = $2 AND shift_id = $3",
    )
    .bind(guard_id)
    .bind(window.anchor_date)
    .bind(window.shift_id)
    .fetch_optional(&mut *tx)
    .await?;
    if duplicate.is_some() {
        return Err(GarrisonError::AlreadyMarked(
            "Attendance already marked for this shift".to_string(),
        ));
    }

    let inserted: Result<i32, sqlx::Error> = sqlx::query_scalar(
        "INSERT INTO attendance
            (guard_id, society_id, attendance_date, shift_id, qr_code_id,
             check_in_at, check_in_lat, check_in_lng, entry_method)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING attendance_id",
    )
    .bind(guard_id)
    .bind(society.society_id)
    .bind(window.anchor_date)
    .bind(window.shift_id)
    .bind(&req.qr_code_id)
    .bind(now)
    .bind(req.lat)
    .bind(req.lng)
    .bind(EntryMethod::Mobile)
    .fetch_one(&mut *tx)
    .await;

    let attendance_id = match inserted {
        Ok(id) => id,
        // A concurrent double-tap loses on the unique index.
        Err(e) if is_unique_violation(&e, "uq_attendance_guard_date_shift") => {
            return Err(GarrisonError::AlreadyMarked(
                "Attendance already marked for this shift".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    tx.commit().await?;

    audit::record(
        pool,
        Some(guard_id),
        "attendance.checked_in",
        "attendance",
        &attendance_id.to_string(),
        serde_json::json!({
            "society_id": society.society_id,
            "shift_id": window.shift_id,
            "attendance_date": window.anchor_date,
        }),
    )
    .await;

    tracing::info!("Guard {} checked in (attendance {})", guard_id, attendance_id);
    Ok(ScanOutcome::CheckedIn { attendance_id })
}

// --- Guard reads --------------------------------------------------------

pub async fn my_status(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
) -> GarrisonResult<Json<Value>> {
    let guard_id = claims.employee_id()?;

    let row: Option<(i32, i32, String, NaiveDateTime, NaiveDate)> = sqlx::query_as(
        r#"
        SELECT a.attendance_id, a.society_id, s.society_name, a.check_in_at, a.attendance_date
        FROM attendance a
        JOIN societies s ON s.society_id = a.society_id
        WHERE a.guard_id = $1 AND a.check_out_at IS NULL
        ORDER BY a.check_in_at DESC
        LIMIT 1
        "#,
    )
    .bind(guard_id)
    .fetch_optional(&state.pool)
    .await?;

    let body = match row {
        Some((attendance_id, society_id, society_name, check_in_at, attendance_date)) => {
            serde_json::json!({
                "open": true,
                "attendance_id": attendance_id,
                "society_id": society_id,
                "society_name": society_name,
                "check_in_at": check_in_at,
                "attendance_date": attendance_date,
            })
        }
        None => serde_json::json!({ "open": false }),
    };
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub async fn my_history(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HistoryQuery>,
) -> GarrisonResult<Json<Vec<Value>>> {
    let guard_id = claims.employee_id()?;

    let mut sql = String::from(
        r#"
        SELECT a.attendance_id, a.attendance_date, a.shift_id, a.society_id,
               s.society_name, a.check_in_at, a.check_out_at, a.entry_method::text
        FROM attendance a
        JOIN societies s ON s.society_id = a.society_id
        WHERE a.guard_id = $1
        "#,
    );

    let range = match (&query.start_date, &query.end_date) {
        (Some(s), Some(e)) => {
            let sd = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| GarrisonError::Validation(format!("Invalid start date: {}", e)))?;
            let ed = NaiveDate::parse_from_str(e, "%Y-%m-%d")
                .map_err(|e| GarrisonError::Validation(format!("Invalid end date: {}", e)))?;
            sql.push_str(" AND a.attendance_date BETWEEN $2 AND $3");
            Some((sd, ed))
        }
        _ => None,
    };
    sql.push_str(" ORDER BY a.check_in_at DESC LIMIT 200");

    type HistoryRow = (
        i32,
        NaiveDate,
        i32,
        i32,
        String,
        NaiveDateTime,
        Option<NaiveDateTime>,
        String,
    );

    let rows: Vec<HistoryRow> = if let Some((sd, ed)) = range {
        sqlx::query_as(&sql)
            .bind(guard_id)
            .bind(sd)
            .bind(ed)
            .fetch_all(&state.pool)
            .await?
    } else {
        sqlx::query_as(&sql).bind(guard_id).fetch_all(&state.pool).await?
    };

    Ok(Json(
        rows.into_iter()
            .map(
                |(attendance_id, attendance_date, shift_id, society_id, society_name, check_in_at, check_out_at, entry_method)| {
                    serde_json::json!({
                        "attendance_id": attendance_id,
                        "attendance_date": attendance_date,
                        "shift_id": shift_id,
                        "society_id": society_id,
                        "society_name": society_name,
                        "check_in_at": check_in_at,
                        "check_out_at": check_out_at,
                        "entry_method": entry_method,
                    })
                },
            )
            .collect(),
    ))
}

// --- Admin reads --------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RollCallQuery {
    pub society_id: i32,
    pub date: String,
}

/// Site roll-call: everyone who marked attendance at a society on a date.
pub async fn site_roll_call(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<RollCallQuery>,
) -> GarrisonResult<Json<Vec<Value>>> {
    claims.require_admin()?;
    let date = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
        .map_err(|e| GarrisonError::Validation(format!("Invalid date: {}", e)))?;

    let rows: Vec<(i32, i32, String, i32, NaiveDateTime, Option<NaiveDateTime>, String)> =
        sqlx::query_as(
            r#"
            SELECT a.attendance_id, a.guard_id, e.full_name, a.shift_id,
                   a.check_in_at, a.check_out_at, a.entry_method::text
            FROM attendance a
            JOIN employees e ON e.employee_id = a.guard_id
            WHERE a.society_id = $1 AND a.attendance_date = $2
            ORDER BY a.check_in_at ASC
            "#,
        )
        .bind(query.society_id)
        .bind(date)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(
        rows.into_iter()
            .map(
                |(attendance_id, guard_id, full_name, shift_id, check_in_at, check_out_at, entry_method)| {
                    serde_json::json!({
                        "attendance_id": attendance_id,
                        "guard_id": guard_id,
                        "guard_name": full_name,
                        "shift_id": shift_id,
                        "check_in_at": check_in_at,
                        "check_out_at": check_out_at,
                        "entry_method": entry_method,
                    })
                },
            )
            .collect(),
    ))
}
