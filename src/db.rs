use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{FromRow, Pool, Postgres};
use std::fmt;
use std::str::FromStr;

use crate::error::{GarrisonError, GarrisonResult};

pub type DbPool = Pool<Postgres>;

pub async fn init_pool_with_options(opts: PgConnectOptions) -> GarrisonResult<DbPool> {
    // connect_lazy_with returns the pool immediately. It does not validate connection.
    Ok(PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .idle_timeout(std::time::Duration::from_secs(120))
        .max_lifetime(std::time::Duration::from_secs(300))
        .connect_lazy_with(opts))
}

pub async fn init_pool(database_url: &str) -> GarrisonResult<DbPool> {
    let opts = PgConnectOptions::from_str(database_url)
        .map_err(|e| GarrisonError::Internal(format!("Invalid DB URL: {}", e)))?
        .ssl_mode(PgSslMode::Disable);

    init_pool_with_options(opts).await
}

pub async fn init_database(pool: &DbPool) -> GarrisonResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    let _ = ensure_seeds(pool).await;
    Ok(())
}

// A fresh deployment needs one admin employee so that roster/advance approvals
// have a valid actor before any onboarding has happened.
async fn ensure_seeds(pool: &DbPool) -> GarrisonResult<()> {
    let admin_exists: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM employees WHERE role = 'admin'")
            .fetch_one(pool)
            .await
            .unwrap_or((0,));
    if admin_exists.0 == 0 {
        let _ = sqlx::query(
            "INSERT INTO employees (employee_code, full_name, role)
             VALUES ('E-ADMIN', 'System Administrator', 'admin')
             ON CONFLICT (employee_code) DO NOTHING",
        )
        .execute(pool)
        .await;
    }
    Ok(())
}

/// True when `err` is a unique-constraint violation on the named constraint.
/// Race losers on the attendance/skip/deduction backstops are translated into
/// their domain errors instead of surfacing as 500s.
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => db.constraint() == Some(constraint),
        _ => false,
    }
}

// --- Enums --------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "employee_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmployeeRole {
    Guard,
    Supervisor,
    Admin,
}

impl FromStr for EmployeeRole {
    type Err = GarrisonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guard" => Ok(EmployeeRole::Guard),
            "supervisor" => Ok(EmployeeRole::Supervisor),
            "admin" => Ok(EmployeeRole::Admin),
            other => Err(GarrisonError::Validation(format!(
                "Role must be one of guard/supervisor/admin, got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "entry_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryMethod {
    Mobile,
    Supervisor,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "advance_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdvanceStatus {
    Pending,
    Approved,
    Active,
    Completed,
    Suspended,
    Cancelled,
    Rejected,
}

impl AdvanceStatus {
    /// Statuses under which a monthly deduction may be posted.
    pub fn is_deductible(self) -> bool {
        matches!(self, AdvanceStatus::Active | AdvanceStatus::Approved)
    }

    /// Statuses that count as a "live" advance for the one-per-employee rule.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            AdvanceStatus::Pending | AdvanceStatus::Approved | AdvanceStatus::Active
        )
    }
}

impl fmt::Display for AdvanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdvanceStatus::Pending => "pending",
            AdvanceStatus::Approved => "approved",
            AdvanceStatus::Active => "active",
            AdvanceStatus::Completed => "completed",
            AdvanceStatus::Suspended => "suspended",
            AdvanceStatus::Cancelled => "cancelled",
            AdvanceStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

impl FromStr for AdvanceStatus {
    type Err = GarrisonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AdvanceStatus::Pending),
            "approved" => Ok(AdvanceStatus::Approved),
            "active" => Ok(AdvanceStatus::Active),
            "completed" => Ok(AdvanceStatus::Completed),
            "suspended" => Ok(AdvanceStatus::Suspended),
            "cancelled" => Ok(AdvanceStatus::Cancelled),
            "rejected" => Ok(AdvanceStatus::Rejected),
            other => Err(GarrisonError::Validation(format!(
                "Unknown advance status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "advance_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdvancePriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl FromStr for AdvancePriority {
    type Err = GarrisonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(AdvancePriority::Low),
            "normal" => Ok(AdvancePriority::Normal),
            "high" => Ok(AdvancePriority::High),
            "urgent" => Ok(AdvancePriority::Urgent),
            other => Err(GarrisonError::Validation(format!(
                "Priority must be one of low/normal/high/urgent, got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "skip_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SkipStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl fmt::Display for SkipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipStatus::Pending => "pending",
            SkipStatus::Approved => "approved",
            SkipStatus::Rejected => "rejected",
            SkipStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// --- Entities -----------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub employee_id: i32,
    pub employee_code: String,
    pub full_name: String,
    pub mobile_number: Option<String>,
    pub role: EmployeeRole,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Society {
    pub society_id: i32,
    pub society_name: String,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub geofence_radius_m: Option<f64>,
    pub geofence_tolerance_m: Option<f64>,
    pub qr_code: String,
    pub qr_expires_at: Option<NaiveDateTime>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Shift {
    pub shift_id: i32,
    pub shift_name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub grace_minutes: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct RosterAssignment {
    pub roster_id: i32,
    pub guard_id: i32,
    pub society_id: i32,
    pub shift_id: i32,
    pub team_id: Option<i32>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

/// Roster row joined with its shift times, as the scan engine consumes it.
#[derive(Debug, FromRow)]
pub struct RosterShiftRow {
    pub roster_id: i32,
    pub shift_id: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub grace_minutes: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Attendance {
    pub attendance_id: i32,
    pub guard_id: i32,
    pub society_id: i32,
    pub attendance_date: NaiveDate,
    pub shift_id: i32,
    pub qr_code_id: String,
    pub check_in_at: NaiveDateTime,
    pub check_in_lat: Option<f64>,
    pub check_in_lng: Option<f64>,
    pub check_out_at: Option<NaiveDateTime>,
    pub check_out_lat: Option<f64>,
    pub check_out_lng: Option<f64>,
    pub entry_method: EntryMethod,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Advance {
    pub advance_id: i32,
    pub employee_id: i32,
    pub request_number: String,
    pub total_amount: Decimal,
    pub monthly_deduction: Decimal,
    pub remaining_balance: Decimal,
    pub total_deducted: Decimal,
    pub installments: i32,
    pub paid_installments: i32,
    pub purpose: String,
    pub priority: AdvancePriority,
    pub is_emergency: bool,
    pub status: AdvanceStatus,
    pub start_date: NaiveDate,
    pub expected_completion_date: NaiveDate,
    pub actual_completion_date: Option<NaiveDate>,
    pub requested_by: i32,
    pub approved_by: Option<i32>,
    pub approved_at: Option<NaiveDateTime>,
    pub suspended_at: Option<NaiveDateTime>,
    pub suspension_reason: Option<String>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub cancellation_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct SkipRequest {
    pub skip_request_id: i32,
    pub advance_id: i32,
    pub skip_month: String,
    pub reason: String,
    pub requested_by: i32,
    pub status: SkipStatus,
    pub reviewed_by: Option<i32>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub review_notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct SkipRecord {
    pub skip_record_id: i32,
    pub advance_id: i32,
    pub skip_request_id: i32,
    pub skip_month: String,
    pub waived_amount: Decimal,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct DeductionRecord {
    pub deduction_id: i32,
    pub advance_id: i32,
    pub salary_record_id: Option<i32>,
    pub principal_amount: Decimal,
    pub interest_amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub deduction_month: String,
    pub payment_sequence: i32,
    pub is_partial: bool,
    pub created_at: NaiveDateTime,
}
