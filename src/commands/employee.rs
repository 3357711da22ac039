use crate::commands::audit;
use crate::db::{DbPool, Employee, EmployeeRole};
use crate::error::{GarrisonError, GarrisonResult};
use crate::middleware::auth::Claims;
use crate::state::AppState;
use axum::extract::{Extension, Json, Query, State as AxumState};
use chrono::Local;
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

pub fn new_employee_code() -> String {
    format!("E-{}", Uuid::new_v4().to_string()[..8].to_uppercase())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmployeeInput {
    pub full_name: String,
    pub mobile_number: Option<String>,
    pub role: String,
}

pub async fn create_employee_internal(
    pool: &DbPool,
    actor_id: i32,
    input: CreateEmployeeInput,
) -> GarrisonResult<Employee> {
    let name = input.full_name.trim();
    if name.is_empty() {
        return Err(GarrisonError::Validation(
            "Employee name is required".to_string(),
        ));
    }
    let role = EmployeeRole::from_str(&input.role)?;

    let employee = sqlx::query_as::<_, Employee>(
        r#"
        INSERT INTO employees (employee_code, full_name, mobile_number, role)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(new_employee_code())
    .bind(name)
    .bind(input.mobile_number.as_deref())
    .bind(role)
    .fetch_one(pool)
    .await?;

    audit::record(
        pool,
        Some(actor_id),
        "employee.created",
        "employee",
        &employee.employee_id.to_string(),
        serde_json::json!({ "employee_code": employee.employee_code, "role": employee.role }),
    )
    .await;

    tracing::info!(
        "Created employee {} ({})",
        employee.employee_id,
        employee.employee_code
    );
    Ok(employee)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEmployeeInput {
    pub employee_id: i32,
    pub full_name: Option<String>,
    pub mobile_number: Option<String>,
    pub role: Option<String>,
}

pub async fn update_employee_internal(
    pool: &DbPool,
    actor_id: i32,
    input: UpdateEmployeeInput,
) -> GarrisonResult<Employee> {
    let existing = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE employee_id = $1")
        .bind(input.employee_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| GarrisonError::NotFound(format!("No employee {}", input.employee_id)))?;

    let name = match input.full_name {
        Some(n) => {
            let n = n.trim().to_string();
            if n.is_empty() {
                return Err(GarrisonError::Validation(
                    "Employee name cannot be blank".to_string(),
                ));
            }
            n
        }
        None => existing.full_name,
    };
    let role = match input.role.as_deref() {
        Some(r) => EmployeeRole::from_str(r)?,
        None => existing.role,
    };
    let mobile = input.mobile_number.or(existing.mobile_number);

    let employee = sqlx::query_as::<_, Employee>(
        "UPDATE employees
         SET full_name = $1, mobile_number = $2, role = $3, updated_at = $4
         WHERE employee_id = $5
         RETURNING *",
    )
    .bind(&name)
    .bind(mobile.as_deref())
    .bind(role)
    .bind(Local::now().naive_local())
    .bind(input.employee_id)
    .fetch_one(pool)
    .await?;

    audit::record(
        pool,
        Some(actor_id),
        "employee.updated",
        "employee",
        &employee.employee_id.to_string(),
        serde_json::json!({ "role": employee.role }),
    )
    .await;
    Ok(employee)
}

/// Deactivation, not deletion: attendance and ledger rows keep their
/// foreign keys, the guard just stops scanning.
pub async fn deactivate_employee_internal(
    pool: &DbPool,
    actor_id: i32,
    employee_id: i32,
) -> GarrisonResult<Employee> {
    if employee_id == actor_id {
        return Err(GarrisonError::Validation(
            "You cannot deactivate your own account".to_string(),
        ));
    }

    let employee = sqlx::query_as::<_, Employee>(
        "UPDATE employees SET status = 'inactive', updated_at = $1
         WHERE employee_id = $2
         RETURNING *",
    )
    .bind(Local::now().naive_local())
    .bind(employee_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| GarrisonError::NotFound(format!("No employee {}", employee_id)))?;

    audit::record(
        pool,
        Some(actor_id),
        "employee.deactivated",
        "employee",
        &employee_id.to_string(),
        serde_json::json!({ "employee_code": employee.employee_code }),
    )
    .await;

    tracing::info!("Deactivated employee {}", employee_id);
    Ok(employee)
}

// --- Handlers -----------------------------------------------------------

pub async fn create_employee(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<CreateEmployeeInput>,
) -> GarrisonResult<Json<Employee>> {
    claims.require_admin()?;
    let employee = create_employee_internal(&state.pool, claims.employee_id()?, input).await?;
    Ok(Json(employee))
}

pub async fn update_employee(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<UpdateEmployeeInput>,
) -> GarrisonResult<Json<Employee>> {
    claims.require_admin()?;
    let employee = update_employee_internal(&state.pool, claims.employee_id()?, input).await?;
    Ok(Json(employee))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateEmployeeInput {
    pub employee_id: i32,
}

pub async fn deactivate_employee(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<DeactivateEmployeeInput>,
) -> GarrisonResult<Json<Employee>> {
    claims.require_admin()?;
    let employee =
        deactivate_employee_internal(&state.pool, claims.employee_id()?, input.employee_id).await?;
    Ok(Json(employee))
}

#[derive(Debug, Deserialize)]
pub struct EmployeeListQuery {
    pub search: Option<String>,
    pub role: Option<String>,
}

pub async fn list_employees(
    AxumState(state): AxumState<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<EmployeeListQuery>,
) -> GarrisonResult<Json<Vec<Employee>>> {
    claims.require_admin()?;

    let role = match query.role.as_deref() {
        Some(r) => Some(EmployeeRole::from_str(r)?),
        None => None,
    };
    let pattern = query.search.map(|s| format!("%{}%", s.trim()));

    let employees: Vec<Employee> = match (&pattern, role) {
        (Some(p), Some(r)) => {
            sqlx::query_as(
                "SELECT * FROM employees
                 WHERE (full_name ILIKE $1 OR employee_code ILIKE $1) AND role = $2
                 ORDER BY full_name",
            )
            .bind(p)
            .bind(r)
            .fetch_all(&state.pool)
            .await?
        }
        (Some(p), None) => {
            sqlx::query_as(
                "SELECT * FROM employees
                 WHERE full_name ILIKE $1 OR employee_code ILIKE $1
                 ORDER BY full_name",
            )
            .bind(p)
            .fetch_all(&state.pool)
            .await?
        }
        (None, Some(r)) => {
            sqlx::query_as("SELECT * FROM employees WHERE role = $1 ORDER BY full_name")
                .bind(r)
                .fetch_all(&state.pool)
                .await?
        }
        (None, None) => {
            sqlx::query_as("SELECT * FROM employees ORDER BY full_name")
                .fetch_all(&state.pool)
                .await?
        }
    };
    Ok(Json(employees))
}
