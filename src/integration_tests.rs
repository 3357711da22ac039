#[cfg(test)]
mod tests {
    use crate::commands::advance::{
        create_advance_internal, post_monthly_deduction_internal, update_status_internal,
        CreateAdvanceInput, DeductionOutcome,
    };
    use crate::commands::advance_skip::{approve_skip_internal, request_skip_internal};
    use crate::commands::attendance::{scan_internal, ScanOutcome, ScanRequest};
    use crate::commands::employee::{
        create_employee_internal, deactivate_employee_internal, CreateEmployeeInput,
    };
    use crate::commands::roster::{
        assign_roster_internal, create_shift_internal, AssignRosterInput, CreateShiftInput,
    };
    use crate::commands::society::{create_society_internal, CreateSocietyInput};
    use crate::config::AppConfig;
    use crate::db::{self, Advance, AdvanceStatus, DbPool, SkipRecord, Society};
    use crate::error::GarrisonError;
    use chrono::{Duration, Local, NaiveDateTime};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
    use std::str::FromStr;
    use uuid::Uuid;

    const SITE_LAT: f64 = 19.0760;
    const SITE_LNG: f64 = 72.8777;

    async fn setup_test_db() -> DbPool {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = db::init_pool(&database_url)
            .await
            .expect("Failed to create pool");
        db::init_database(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    fn test_config(min_checkout_gap_minutes: i64) -> AppConfig {
        AppConfig {
            port: 0,
            database_url: String::new(),
            geofence_radius_m: 500.0,
            geofence_tolerance_m: 100.0,
            shift_grace_minutes: 60,
            min_checkout_gap_minutes,
        }
    }

    async fn admin_id(pool: &DbPool) -> i32 {
        sqlx::query_scalar("SELECT employee_id FROM employees WHERE employee_code = 'E-ADMIN'")
            .fetch_one(pool)
            .await
            .expect("seed admin must exist")
    }

    async fn new_guard(pool: &DbPool, admin: i32) -> i32 {
        create_employee_internal(
            pool,
            admin,
            CreateEmployeeInput {
                full_name: "Integration Guard".to_string(),
                mobile_number: None,
                role: "guard".to_string(),
            },
        )
        .await
        .expect("create guard")
        .employee_id
    }

    async fn new_site(pool: &DbPool, admin: i32) -> Society {
        create_society_internal(
            pool,
            admin,
            CreateSocietyInput {
                society_name: format!("Integration Society {}", Uuid::new_v4()),
                address: None,
                latitude: SITE_LAT,
                longitude: SITE_LNG,
                geofence_radius_m: None,
                geofence_tolerance_m: None,
                qr_expiry_days: None,
            },
        )
        .await
        .expect("create society")
    }

    /// Rosters the guard onto a shift whose window always covers the
    /// moment the suite runs.
    async fn roster_guard_now(pool: &DbPool, guard_id: i32, society_id: i32) -> i32 {
        let now = Local::now().naive_local();
        let shift_id = create_shift_internal(
            pool,
            CreateShiftInput {
                shift_name: format!("Window {}", Uuid::new_v4()),
                start_time: (now - Duration::hours(4)).time().format("%H:%M").to_string(),
                end_time: (now + Duration::hours(4)).time().format("%H:%M").to_string(),
                grace_minutes: Some(0),
            },
        )
        .await
        .expect("create shift");

        let assignment = assign_roster_internal(
            pool,
            AssignRosterInput {
                guard_id,
                society_id,
                shift_id,
                team_id: None,
                start_date: (now.date() - Duration::days(2)).format("%Y-%m-%d").to_string(),
                end_date: None,
            },
        )
        .await
        .expect("assign roster");
        assert_eq!(assignment.guard_id, guard_id);
        assert!(assignment.end_date.is_none());
        shift_id
    }

    fn scan_request(site: &Society) -> ScanRequest {
        ScanRequest {
            qr_code_id: site.qr_code.clone(),
            client_id: site.society_id,
            lat: SITE_LAT,
            lng: SITE_LNG,
            timestamp: Local::now().timestamp(),
        }
    }

    async fn fetch_advance(pool: &DbPool, advance_id: i32) -> Advance {
        sqlx::query_as("SELECT * FROM advances WHERE advance_id = $1")
            .bind(advance_id)
            .fetch_one(pool)
            .await
            .expect("advance row")
    }

    async fn new_active_advance(
        pool: &DbPool,
        admin: i32,
        guard: i32,
        total: Decimal,
        installments: i32,
    ) -> Advance {
        create_advance_internal(
            pool,
            admin,
            true,
            CreateAdvanceInput {
                employee_id: Some(guard),
                total_amount: total,
                installments,
                purpose: "Integration test advance".to_string(),
                priority: None,
                is_emergency: false,
                start_date: None,
            },
        )
        .await
        .expect("create advance")
    }

    // --- Attendance scans -----------------------------------------------

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn scan_cycle_checkin_checkout_then_already_marked() {
        let pool = setup_test_db().await;
        let config = test_config(0);
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let site = new_site(&pool, admin).await;
        roster_guard_now(&pool, guard, site.society_id).await;

        let first = scan_internal(&pool, &config, guard, scan_request(&site))
            .await
            .expect("first scan checks in");
        let attendance_id = match first {
            ScanOutcome::CheckedIn { attendance_id } => attendance_id,
            other => panic!("expected check-in, got {:?}", other),
        };

        let second = scan_internal(&pool, &config, guard, scan_request(&site))
            .await
            .expect("second scan checks out");
        assert_eq!(second, ScanOutcome::CheckedOut { attendance_id });

        // With the session closed, the third scan lands in the check-in path
        // and trips the one-attendance-per-shift rule.
        let third = scan_internal(&pool, &config, guard, scan_request(&site)).await;
        assert!(
            matches!(third, Err(GarrisonError::AlreadyMarked(_))),
            "got {:?}",
            third
        );

        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attendance WHERE guard_id = $1 AND check_out_at IS NULL",
        )
        .bind(guard)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(open, 0);

        // Both halves of the cycle land in the audit trail.
        let audit_trail: Vec<(String,)> = sqlx::query_as(
            "SELECT action FROM audit_logs
             WHERE entity_type = 'attendance' AND entity_id = $1
             ORDER BY audit_id",
        )
        .bind(attendance_id.to_string())
        .fetch_all(&pool)
        .await
        .unwrap();
        let actions: Vec<&str> = audit_trail.iter().map(|(a,)| a.as_str()).collect();
        assert_eq!(actions, ["attendance.checked_in", "attendance.checked_out"]);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn checkout_before_minimum_gap_is_too_soon() {
        let pool = setup_test_db().await;
        let config = test_config(10);
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let site = new_site(&pool, admin).await;
        roster_guard_now(&pool, guard, site.society_id).await;

        scan_internal(&pool, &config, guard, scan_request(&site))
            .await
            .expect("check-in");

        let rebound = scan_internal(&pool, &config, guard, scan_request(&site)).await;
        assert!(
            matches!(rebound, Err(GarrisonError::TooSoon(_))),
            "got {:?}",
            rebound
        );
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn checkout_must_reuse_the_checkin_qr() {
        let pool = setup_test_db().await;
        let config = test_config(0);
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let site_a = new_site(&pool, admin).await;
        let site_b = new_site(&pool, admin).await;
        roster_guard_now(&pool, guard, site_a.society_id).await;

        scan_internal(&pool, &config, guard, scan_request(&site_a))
            .await
            .expect("check-in at site A");

        let crossed = scan_internal(&pool, &config, guard, scan_request(&site_b)).await;
        assert!(
            matches!(crossed, Err(GarrisonError::LocationMismatch(_))),
            "got {:?}",
            crossed
        );

        // Session at A is still open.
        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attendance WHERE guard_id = $1 AND check_out_at IS NULL",
        )
        .bind(guard)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(open, 1);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn scan_outside_the_geofence_is_rejected() {
        let pool = setup_test_db().await;
        let config = test_config(10);
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let site = new_site(&pool, admin).await;
        roster_guard_now(&pool, guard, site.society_id).await;

        // ~2.2 km north of the site.
        let mut req = scan_request(&site);
        req.lat += 0.02;
        let far = scan_internal(&pool, &config, guard, req).await;
        assert!(
            matches!(far, Err(GarrisonError::LocationMismatch(_))),
            "got {:?}",
            far
        );
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn scan_with_a_stale_qr_code_is_rejected() {
        let pool = setup_test_db().await;
        let config = test_config(10);
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let site = new_site(&pool, admin).await;
        roster_guard_now(&pool, guard, site.society_id).await;

        let mut req = scan_request(&site);
        req.qr_code_id = "QR-STALE000".to_string();
        let stale = scan_internal(&pool, &config, guard, req).await;
        assert!(matches!(stale, Err(GarrisonError::InvalidQr(_))), "got {:?}", stale);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn scan_with_an_expired_qr_code_is_rejected() {
        let pool = setup_test_db().await;
        let config = test_config(10);
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let site = new_site(&pool, admin).await;
        roster_guard_now(&pool, guard, site.society_id).await;

        // Age the rotation deadline past; the code itself is still the
        // current one, so only the expiry check can reject this scan.
        sqlx::query("UPDATE societies SET qr_expires_at = $1 WHERE society_id = $2")
            .bind(Local::now().naive_local() - Duration::days(1))
            .bind(site.society_id)
            .execute(&pool)
            .await
            .expect("age the QR rotation deadline");

        let expired = scan_internal(&pool, &config, guard, scan_request(&site)).await;
        assert!(
            matches!(expired, Err(GarrisonError::ExpiredQr(_))),
            "got {:?}",
            expired
        );

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance WHERE guard_id = $1")
            .bind(guard)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn scan_at_an_unrostered_site_is_not_assigned() {
        let pool = setup_test_db().await;
        let config = test_config(10);
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let site = new_site(&pool, admin).await;

        let unassigned = scan_internal(&pool, &config, guard, scan_request(&site)).await;
        assert!(
            matches!(unassigned, Err(GarrisonError::NotAssigned(_))),
            "got {:?}",
            unassigned
        );
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn a_deactivated_guard_cannot_scan() {
        let pool = setup_test_db().await;
        let config = test_config(10);
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let site = new_site(&pool, admin).await;
        roster_guard_now(&pool, guard, site.society_id).await;

        deactivate_employee_internal(&pool, admin, guard)
            .await
            .expect("deactivate guard");

        let blocked = scan_internal(&pool, &config, guard, scan_request(&site)).await;
        assert!(
            matches!(blocked, Err(GarrisonError::Forbidden(_))),
            "got {:?}",
            blocked
        );

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance WHERE guard_id = $1")
            .bind(guard)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn concurrent_double_tap_creates_one_attendance_row() {
        let pool = setup_test_db().await;
        let config = test_config(10);
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let site = new_site(&pool, admin).await;
        roster_guard_now(&pool, guard, site.society_id).await;

        let (first, second) = tokio::join!(
            scan_internal(&pool, &config, guard, scan_request(&site)),
            scan_internal(&pool, &config, guard, scan_request(&site)),
        );

        let results = [first, second];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1, "exactly one tap may win: {:?}", results);

        // The loser is rejected either by the unique index (uncommitted
        // winner) or by the checkout minimum gap (committed winner).
        for result in &results {
            if let Err(e) = result {
                assert!(
                    matches!(
                        e,
                        GarrisonError::AlreadyMarked(_) | GarrisonError::TooSoon(_)
                    ),
                    "unexpected rejection: {:?}",
                    e
                );
            }
        }

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance WHERE guard_id = $1")
            .bind(guard)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn stale_open_sessions_are_force_closed_on_the_next_scan() {
        let pool = setup_test_db().await;
        let config = test_config(0);
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let site = new_site(&pool, admin).await;
        let shift_id = roster_guard_now(&pool, guard, site.society_id).await;

        // Two open rows for one guard only come from historic bugs or
        // manual edits, so seed them straight into the table.
        let now = Local::now().naive_local();
        let mut seeded = Vec::new();
        for (date, checked_in) in [
            (now.date() - Duration::days(1), now - Duration::hours(26)),
            (now.date(), now - Duration::hours(2)),
        ] {
            let id: i32 = sqlx::query_scalar(
                "INSERT INTO attendance
                    (guard_id, society_id, attendance_date, shift_id, qr_code_id,
                     check_in_at, check_in_lat, check_in_lng, entry_method)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'mobile')
                 RETURNING attendance_id",
            )
            .bind(guard)
            .bind(site.society_id)
            .bind(date)
            .bind(shift_id)
            .bind(&site.qr_code)
            .bind(checked_in)
            .bind(SITE_LAT)
            .bind(SITE_LNG)
            .fetch_one(&pool)
            .await
            .expect("seed open session");
            seeded.push(id);
        }
        let (stale_id, newest_id) = (seeded[0], seeded[1]);

        let outcome = scan_internal(&pool, &config, guard, scan_request(&site))
            .await
            .expect("scan repairs and checks out");
        assert_eq!(
            outcome,
            ScanOutcome::CheckedOut {
                attendance_id: newest_id
            }
        );

        // The stale session was closed by the repair, not by a real
        // checkout, so it carries no checkout coordinates.
        let (closed_at, closed_lat): (Option<NaiveDateTime>, Option<f64>) = sqlx::query_as(
            "SELECT check_out_at, check_out_lat FROM attendance WHERE attendance_id = $1",
        )
        .bind(stale_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(closed_at.is_some());
        assert!(closed_lat.is_none());

        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attendance WHERE guard_id = $1 AND check_out_at IS NULL",
        )
        .bind(guard)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(open, 0);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn scan_completes_on_a_single_connection_pool() {
        let pool = setup_test_db().await;
        let config = test_config(0);
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let site = new_site(&pool, admin).await;
        roster_guard_now(&pool, guard, site.society_id).await;

        // A pool of one: every query a scan runs while its transaction is
        // open must ride that same connection, or this times out at 2s.
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let opts = PgConnectOptions::from_str(&database_url)
            .expect("parse DATABASE_URL")
            .ssl_mode(PgSslMode::Disable);
        let tight = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(2))
            .connect_lazy_with(opts);

        let first = scan_internal(&tight, &config, guard, scan_request(&site))
            .await
            .expect("check-in on a single connection");
        assert!(
            matches!(first, ScanOutcome::CheckedIn { .. }),
            "got {:?}",
            first
        );

        let second = scan_internal(&tight, &config, guard, scan_request(&site))
            .await
            .expect("checkout on a single connection");
        assert!(
            matches!(second, ScanOutcome::CheckedOut { .. }),
            "got {:?}",
            second
        );
    }

    // --- Advance ledger -------------------------------------------------

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn advance_settles_after_all_installments() {
        let pool = setup_test_db().await;
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let advance = new_active_advance(&pool, admin, guard, dec!(6000), 6).await;

        assert_eq!(advance.status, AdvanceStatus::Active);
        assert_eq!(advance.monthly_deduction, dec!(1000.00));
        assert!(advance.request_number.starts_with("AP-"));

        let months = ["2025-01", "2025-02", "2025-03", "2025-04", "2025-05", "2025-06"];
        for (i, month) in months.iter().enumerate() {
            let outcome =
                post_monthly_deduction_internal(&pool, admin, advance.advance_id, month, None)
                    .await
                    .expect("deduction posts");
            match outcome {
                DeductionOutcome::Posted {
                    balance_after,
                    completed,
                    ..
                } => {
                    if i == 5 {
                        assert!(completed);
                        assert_eq!(balance_after, dec!(0));
                    } else {
                        assert!(!completed);
                    }
                }
                other => panic!("expected a posted deduction, got {:?}", other),
            }

            // Re-running a posted month mid-stream is a conflict, not a
            // double charge.
            if i == 2 {
                let repost =
                    post_monthly_deduction_internal(&pool, admin, advance.advance_id, month, None)
                        .await;
                assert!(
                    matches!(repost, Err(GarrisonError::DuplicateDeduction(_))),
                    "got {:?}",
                    repost
                );
            }
        }

        let settled = fetch_advance(&pool, advance.advance_id).await;
        assert_eq!(settled.status, AdvanceStatus::Completed);
        assert!(settled.actual_completion_date.is_some());
        assert_eq!(settled.remaining_balance, dec!(0));
        assert_eq!(settled.total_deducted, dec!(6000));
        assert_eq!(settled.paid_installments, 6);

        let history_total: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(principal_amount) FROM advance_deductions WHERE advance_id = $1",
        )
        .bind(advance.advance_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(history_total.unwrap(), settled.total_deducted);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn a_second_live_advance_is_rejected() {
        let pool = setup_test_db().await;
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        new_active_advance(&pool, admin, guard, dec!(3000), 3).await;

        let again = create_advance_internal(
            &pool,
            admin,
            true,
            CreateAdvanceInput {
                employee_id: Some(guard),
                total_amount: dec!(1000),
                installments: 2,
                purpose: "Second advance".to_string(),
                priority: None,
                is_emergency: false,
                start_date: None,
            },
        )
        .await;
        assert!(
            matches!(again, Err(GarrisonError::DuplicateActiveAdvance(_))),
            "got {:?}",
            again
        );
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn concurrent_advance_requests_leave_one_live_advance() {
        let pool = setup_test_db().await;
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;

        let input = || CreateAdvanceInput {
            employee_id: None,
            total_amount: dec!(2000),
            installments: 4,
            purpose: "Rent deposit".to_string(),
            priority: None,
            is_emergency: false,
            start_date: None,
        };

        let (first, second) = tokio::join!(
            create_advance_internal(&pool, guard, false, input()),
            create_advance_internal(&pool, guard, false, input()),
        );

        let results = [first, second];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1, "exactly one request may win: {:?}", results);

        // The loser is rejected by the pre-check (committed winner) or by
        // the partial unique index (uncommitted winner).
        for result in &results {
            if let Err(e) = result {
                assert!(
                    matches!(e, GarrisonError::DuplicateActiveAdvance(_)),
                    "unexpected rejection: {:?}",
                    e
                );
            }
        }

        let live: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM advances
             WHERE employee_id = $1 AND status IN ('pending', 'approved', 'active')",
        )
        .bind(guard)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(live, 1);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn resume_is_blocked_while_another_advance_is_live() {
        let pool = setup_test_db().await;
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let first = new_active_advance(&pool, admin, guard, dec!(3000), 3).await;

        update_status_internal(
            &pool,
            admin,
            first.advance_id,
            AdvanceStatus::Suspended,
            Some("Extended leave".to_string()),
        )
        .await
        .expect("suspend");

        // A suspended advance no longer counts as live, so a replacement
        // can be opened.
        let second = new_active_advance(&pool, admin, guard, dec!(1000), 2).await;
        assert_eq!(second.status, AdvanceStatus::Active);

        let resumed = update_status_internal(
            &pool,
            admin,
            first.advance_id,
            AdvanceStatus::Active,
            None,
        )
        .await;
        assert!(
            matches!(resumed, Err(GarrisonError::DuplicateActiveAdvance(_))),
            "got {:?}",
            resumed
        );

        let unchanged = fetch_advance(&pool, first.advance_id).await;
        assert_eq!(unchanged.status, AdvanceStatus::Suspended);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn suspension_pauses_deductions_until_resumed() {
        let pool = setup_test_db().await;
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let advance = new_active_advance(&pool, admin, guard, dec!(4000), 4).await;

        update_status_internal(
            &pool,
            admin,
            advance.advance_id,
            AdvanceStatus::Suspended,
            Some("Payroll dispute".to_string()),
        )
        .await
        .expect("suspend");

        let while_suspended =
            post_monthly_deduction_internal(&pool, admin, advance.advance_id, "2025-01", None)
                .await;
        assert!(
            matches!(while_suspended, Err(GarrisonError::Validation(_))),
            "got {:?}",
            while_suspended
        );

        let resumed = update_status_internal(
            &pool,
            admin,
            advance.advance_id,
            AdvanceStatus::Active,
            None,
        )
        .await
        .expect("resume");
        assert!(resumed.suspended_at.is_none());
        assert!(resumed.suspension_reason.is_none());

        post_monthly_deduction_internal(&pool, admin, advance.advance_id, "2025-01", None)
            .await
            .expect("deduction runs after resume");
    }

    // --- Skip workflow --------------------------------------------------

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn approved_skip_waives_the_month_exactly_once() {
        let pool = setup_test_db().await;
        let admin = admin_id(&pool).await;
        let guard = new_guard(&pool, admin).await;
        let advance = new_active_advance(&pool, admin, guard, dec!(6000), 6).await;

        let skip = request_skip_internal(
            &pool,
            guard,
            false,
            advance.advance_id,
            "2025-03",
            "Medical leave",
        )
        .await
        .expect("skip request");

        let duplicate = request_skip_internal(
            &pool,
            guard,
            false,
            advance.advance_id,
            "2025-03",
            "Asking again",
        )
        .await;
        assert!(
            matches!(duplicate, Err(GarrisonError::DuplicateSkipMonth(_))),
            "got {:?}",
            duplicate
        );

        approve_skip_internal(&pool, admin, skip.skip_request_id, None)
            .await
            .expect("approve skip");

        let records: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM advance_skip_records
             WHERE advance_id = $1 AND skip_month = $2",
        )
        .bind(advance.advance_id)
        .bind("2025-03")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(records, 1);

        let record: SkipRecord = sqlx::query_as(
            "SELECT * FROM advance_skip_records
             WHERE advance_id = $1 AND skip_month = $2",
        )
        .bind(advance.advance_id)
        .bind("2025-03")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(record.skip_request_id, skip.skip_request_id);
        assert_eq!(record.waived_amount, advance.monthly_deduction);

        let before = fetch_advance(&pool, advance.advance_id).await;
        let outcome =
            post_monthly_deduction_internal(&pool, admin, advance.advance_id, "2025-03", None)
                .await
                .expect("payroll step runs");
        assert!(
            matches!(outcome, DeductionOutcome::Skipped { .. }),
            "got {:?}",
            outcome
        );

        let after = fetch_advance(&pool, advance.advance_id).await;
        assert_eq!(after.remaining_balance, before.remaining_balance);
        assert_eq!(after.paid_installments, before.paid_installments);

        let posted: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM advance_deductions WHERE advance_id = $1 AND deduction_month = $2",
        )
        .bind(advance.advance_id)
        .bind("2025-03")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(posted, 0);
    }
}
