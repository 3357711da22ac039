use crate::commands::audit;
use crate::db::{DbPool, Society};
use crate::error::{GarrisonError, GarrisonResult};
use crate::geo;
use crate::middleware::auth::Claims;
use crate::state::AppState;
use axum::extract::{Extension, Json, Query, State as AxumState};
use chrono::{Duration, Local, NaiveDateTime};
use serde::Deserialize;
use uuid::Uuid;

pub fn new_qr_code() -> String {
    format!("QR-{}", Uuid::new_v4().to_string()[..8].to_uppercase())
}

fn expiry_from_days(days: Option<i64>) -> GarrisonResult<Option<NaiveDateTime>> {
    match days {
        None => Ok(None),
        Some(d) if d <= 0 => Err(GarrisonError::Validation(
            "QR expiry days must be positive".to_string(),
        )),
        Some(d) => Ok(Some(Local::now().naive_local() + Duration::days(d))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSocietyInput {
    pub society_name: String,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub geofence_radius_m: Option<f64>,
    pub geofence_tolerance_m: Option<f64>,
    pub qr_expiry_days: Option<i64>,
}

pub async fn create_society_internal(
    pool: &DbPool,
    actor_id: i32,
    input: CreateSocietyInput,
) -> GarrisonResult<Society> {
    let name = input.society_name.trim();
    if name.is_empty() {
        return Err(GarrisonError::Validation(
            "Society name is required".to_string(),
        ));
    }
    if !geo::validate_coordinates(input.latitude, input.longitude) {
        return Err(GarrisonError::Validation(
            "Latitude/longitude out of range".to_string(),
        ));
    }
    if input.geofence_radius_m.is_some_and(|r| r <= 0.0)
        || input.geofence_tolerance_m.is_some_and(|t| t < 0.0)
    {
        return Err(GarrisonError::Validation(
            "Geofence radius must be positive and tolerance non-negative".to_string(),
        ));
    }
    let qr_expires_at = expiry_from_days(input.qr_expiry_days)?;

    let society = sqlx::query_as::<_, Society>(
        r#"
        INSERT INTO societies
            (society_name, address, latitude, longitude,
             geofence_radius_m, geofence_tolerance_m, qr_code, qr_expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(input.address.as_deref())
    .bind(input.latitude)
    .bind(input.longitude)
    .bind(input.geofence_radius_m)
    .bind(input.geofence_tolerance_m)
    .bind(new_qr_code())
    .bind(qr_expires_at)
    .fetch_one(pool)
    .await?;

    audit::record(
        pool,
        Some(actor_id),
        "society.created",
        "society",
        &society.society_id.to_string(),
        serde_json::json!({ "society_name": society.society_name }),
    )
    .await;

    tracing::info!("Created society {} '{}'", society.society_id, name);
    Ok(society)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSocietyInput {
    pub society_id: i32,
    pub society_name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geofence_radius_m: Option<f64>,
    pub geofence_tolerance_m: Option<f64>,
    pub status: Option<String>,
}

pub async fn update_society_internal(
    pool: &DbPool,
    actor_id: i32,
    input: UpdateSocietyInput,
) -> GarrisonResult<Society> {
    let existing = sqlx::query_as::<_, Society>("SELECT * FROM societies WHERE society_id = $1")
        .bind(input.society_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| GarrisonError::NotFound(format!("No society {}", input.society_id)))?;

    // Merge over the current row; omitted fields stay as they are.
    let name = match input.society_name {
        Some(n) => {
            let n = n.trim().to_string();
            if n.is_empty() {
                return Err(GarrisonError::Validation(
                    "Society name cannot be blank".to_string(),
                ));
            }
            n
        }
        None => existing.society_name,
    };
    let latitude = input.latitude.unwrap_or(existing.latitude);
    let longitude = input.longitude.unwrap_or(existing.longitude);
    if !geo::validate_coordinates(latitude, longitude) {
        return Err(GarrisonError::Validation(
            "Latitude/longitude out of range".to_string(),
        ));
    }
    let radius = input.geofence_radius_m.or(existing.geofence_radius_m);
    let tolerance = input.geofence_tolerance_m.or(existing.geofence_tolerance_m);
    if radius.is_some_and(|r| r <= 0.0) || tolerance.is_some_and(|t| t < 0.0) {
        return Err(GarrisonError::Validation(
            "Geofence radius must be positive and tolerance non-negative".to_string(),
        ));
    }
    let status = match input.status.as_deref() {
        Some("active") => "active".to_string(),
        Some("inactive") => "inactive".to_string(),
        Some(other) => {
            return Err(GarrisonError::Validation(format!(
                "Status must be active or inactive, got '{}'",
                other
            )))
        }
        None => existing.status,
    };
    let address = input.address.or(existing.address);

    let society = sqlx::query_as::<_, Society>(
        r#"
        UPDATE societies
        SET society_name = $1, address = $2, latitude = $3, longitude = $4,
            geofence_radius_m = $5, geofence_tolerance_m = $6, status = $7,
            updated_at = $8
        WHERE society_id = $9
        RETURNING *
        "#,
    )
    .bind(&name)
    .bind(address.as_deref())
    .bind(latitude)
    .bind(longitude)
    .bind(radius)
    .bind(tolerance)
    .bind(&status)
    .bind(Local::now().naive_local())
    .bind(input.society_id)
    .fetch_one(pool)
    .await?;

    audit::record(
        pool,
        Some(actor_id),
        "society.updated",
        "society",
        &society.society_id.to_string(),
        serde_json::json!({ "status": society.status }),
    )
    .await;
    Ok(society)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateQrInput {
    pub society_id: i32,
    pub expiry_days: Option<i64>,
}

/// Issues a fresh QR code for a site. The old code stops scanning the
/// moment this commits, so field staff get the new poster first.
pub async fn rotate_qr_internal(
    pool: &DbPool,
    actor_id: i32,
    input: RotateQrInput,
) -> GarrisonResult<Society> {
    let qr_expires_at = expiry_from_days(input.expiry_days)?;
    let qr_code = new_qr_code();

    let society = sqlx::query_as::<_, Society>(
        "UPDATE societies
         SET qr_code = $1, qr_expires_at = $2, updated_at = $3
         WHERE society_id = $4
         RETURNING *",
    )
    .bind(&qr_code)
    .bind(qr_expires_at)
    .bind(Local::now().naive_local())
    .bind(input.society_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| GarrisonError::NotFound(format!("No society {}", input.society_id)))?;

    audit::record(
        pool,
        Some(actor_id),
        "society.qr_rotated",
        "society",
        &society.society_id.to_string(),
        serde_json::json!({ "qr_code": qr_code, "expires_at": qr_expires_at }),
    )
    .await;

    tracing::info!("Rotated QR code for society {}", society.society_id);
    Ok(society)
}

// --- Handlers -----------------------------------------------------------

pub async fn create_society(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<CreateSocietyInput>,
) -> GarrisonResult<Json<Society>> {
    claims.require_admin()?;
    let society = create_society_internal(&state.pool, claims.employee_id()?, input).await?;
    Ok(Json(society))
}

pub async fn update_society(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<UpdateSocietyInput>,
) -> GarrisonResult<Json<Society>> {
    claims.require_admin()?;
    let society = update_society_internal(&state.pool, claims.employee_id()?, input).await?;
    Ok(Json(society))
}

pub async fn rotate_qr(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<RotateQrInput>,
) -> GarrisonResult<Json<Society>> {
    claims.require_admin()?;
    let society = rotate_qr_internal(&state.pool, claims.employee_id()?, input).await?;
    Ok(Json(society))
}

#[derive(Debug, Deserialize)]
pub struct SocietyListQuery {
    pub status: Option<String>,
}

pub async fn list_societies(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SocietyListQuery>,
) -> GarrisonResult<Json<Vec<Society>>> {
    claims.require_admin()?;

    let societies: Vec<Society> = match &query.status {
        Some(status) => {
            sqlx::query_as("SELECT * FROM societies WHERE status = $1 ORDER BY society_name")
                .bind(status)
                .fetch_all(&state.pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM societies ORDER BY society_name")
                .fetch_all(&state.pool)
                .await?
        }
    };
    Ok(Json(societies))
}
