//! Dashboard metrics and follow-up alerts

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use shared::{days_until_review, CaseStatus, ViolationType};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::config::AlertConfig;
use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::services::appointment::{Appointment, AppointmentQuery, AppointmentService};
use crate::services::referral::overdue_cutoff;

/// Dashboard service
#[derive(Clone)]
pub struct DashboardService {
    db: PgPool,
    alerts: AlertConfig,
}

/// Date boundaries derived from the alert thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertWindows {
    /// Paefi cases without an evolution on or after this date are stale
    pub evolution_cutoff: NaiveDate,
    /// Pending referrals sent before this date are overdue
    pub referral_cutoff: NaiveDate,
    /// Plans with a review on or before this date are flagged
    pub review_horizon: NaiveDate,
}

impl AlertWindows {
    pub fn new(config: &AlertConfig, today: NaiveDate) -> Self {
        Self {
            evolution_cutoff: today - Duration::days(i64::from(config.evolution_gap_days)),
            referral_cutoff: overdue_cutoff(today, config.referral_response_days),
            review_horizon: today
                + Duration::days(i64::from(config.action_plan_review_warning_days)),
        }
    }
}

/// First day of the given month and of the month after it
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, end))
}

#[derive(Debug, Default, Serialize)]
pub struct StatusCounts {
    pub intake: i64,
    pub paefi: i64,
    pub discharged: i64,
}

#[derive(Debug, Serialize)]
pub struct ViolationCount {
    pub violation_type: ViolationType,
    pub count: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TechnicianCaseload {
    pub technician_id: Uuid,
    pub technician_name: String,
    pub active_cases: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct AlertCounts {
    pub stale_cases: usize,
    pub overdue_referrals: usize,
    pub plan_reviews: usize,
    pub upcoming_appointments: usize,
}

/// Overview numbers for the team
#[derive(Debug, Serialize)]
pub struct DashboardMetrics {
    pub cases_by_status: StatusCounts,
    pub active_cases: i64,
    pub new_intakes_this_month: i64,
    pub discharges_this_month: i64,
    pub unassigned_active_cases: i64,
    pub my_active_cases: i64,
    pub active_by_violation_type: Vec<ViolationCount>,
    pub caseload_by_technician: Vec<TechnicianCaseload>,
    pub upcoming_appointments: i64,
    pub alerts: AlertCounts,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StaleCaseAlert {
    pub case_id: Uuid,
    pub code: String,
    pub full_name: String,
    pub responsible_technician_id: Option<Uuid>,
    pub responsible_technician_name: Option<String>,
    pub last_evolution_on: Option<NaiveDate>,
    /// Days since the last evolution, or since PAEFI started when there is none
    #[sqlx(skip)]
    pub days_without_evolution: i64,
    #[serde(skip)]
    paefi_started_on: Option<NaiveDate>,
    #[serde(skip)]
    intake_date: NaiveDate,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct OverdueReferralAlert {
    pub referral_id: Uuid,
    pub case_id: Uuid,
    pub code: String,
    pub destination_name: String,
    pub sent_on: NaiveDate,
    #[sqlx(skip)]
    pub days_waiting: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PlanReviewAlert {
    pub plan_id: Uuid,
    pub case_id: Uuid,
    pub code: String,
    pub full_name: String,
    pub review_on: NaiveDate,
    /// Negative when the review is overdue
    #[sqlx(skip)]
    pub days_until_review: i64,
}

/// Everything that needs attention
#[derive(Debug, Serialize)]
pub struct DashboardAlerts {
    pub stale_cases: Vec<StaleCaseAlert>,
    pub overdue_referrals: Vec<OverdueReferralAlert>,
    pub plan_reviews: Vec<PlanReviewAlert>,
    pub upcoming_appointments: Vec<Appointment>,
}

impl DashboardAlerts {
    fn counts(&self) -> AlertCounts {
        AlertCounts {
            stale_cases: self.stale_cases.len(),
            overdue_referrals: self.overdue_referrals.len(),
            plan_reviews: self.plan_reviews.len(),
            upcoming_appointments: self.upcoming_appointments.len(),
        }
    }
}

/// Days between `since` and `today`
fn days_between(since: NaiveDate, today: NaiveDate) -> i64 {
    (today - since).num_days()
}

/// Restrict a case query to the viewer's caseload
fn push_mine(qb: &mut QueryBuilder<'_, Postgres>, mine: bool, viewer_id: Uuid) {
    if mine {
        qb.push(" AND c.responsible_technician_id = ").push_bind(viewer_id);
    }
}

impl DashboardService {
    pub fn new(db: PgPool, alerts: AlertConfig) -> Self {
        Self { db, alerts }
    }

    pub async fn metrics(&self, viewer: &AuthUser) -> AppResult<DashboardMetrics> {
        let today = Utc::now().date_naive();
        let (month_start, next_month) = month_bounds(today.year(), today.month())
            .unwrap_or((today, today + Duration::days(1)));

        let mut cases_by_status = StatusCounts::default();
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM cases GROUP BY status",
        )
        .fetch_all(&self.db)
        .await?;
        for (status, count) in rows {
            match status.parse::<CaseStatus>() {
                Ok(CaseStatus::Intake) => cases_by_status.intake = count,
                Ok(CaseStatus::Paefi) => cases_by_status.paefi = count,
                Ok(CaseStatus::Discharged) => cases_by_status.discharged = count,
                Err(e) => tracing::warn!(error = %e, "unknown case status in dashboard"),
            }
        }

        let (new_intakes, discharges, unassigned, mine) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE intake_date >= $1 AND intake_date < $2),
                    COUNT(*) FILTER (WHERE discharged_on >= $1 AND discharged_on < $2),
                    COUNT(*) FILTER (WHERE status <> 'discharged' AND responsible_technician_id IS NULL),
                    COUNT(*) FILTER (WHERE status <> 'discharged' AND responsible_technician_id = $3)
                FROM cases
                "#,
            )
            .bind(month_start)
            .bind(next_month)
            .bind(viewer.user_id)
            .fetch_one(&self.db)
            .await?;

        let active_by_violation_type = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT v, COUNT(*)
            FROM cases, UNNEST(violation_types) AS v
            WHERE status <> 'discharged'
            GROUP BY v
            ORDER BY COUNT(*) DESC, v
            "#,
        )
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .filter_map(|(v, count)| {
            v.parse()
                .ok()
                .map(|violation_type| ViolationCount { violation_type, count })
        })
        .collect();

        let caseload_by_technician = sqlx::query_as::<_, TechnicianCaseload>(
            r#"
            SELECT u.id AS technician_id, u.name AS technician_name, COUNT(c.id) AS active_cases
            FROM users u
            LEFT JOIN cases c
                ON c.responsible_technician_id = u.id AND c.status <> 'discharged'
            WHERE u.is_active = true AND u.role IN ('technician', 'coordinator')
            GROUP BY u.id, u.name
            ORDER BY active_cases DESC, u.name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let upcoming_appointments = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM appointments
            WHERE status = 'scheduled'
              AND scheduled_at >= NOW()
              AND scheduled_at < NOW() + make_interval(days => $1)
            "#,
        )
        .bind(self.alerts.appointment_lookahead_days)
        .fetch_one(&self.db)
        .await?;

        let alerts = self.alerts(viewer, false).await?.counts();

        Ok(DashboardMetrics {
            active_cases: cases_by_status.intake + cases_by_status.paefi,
            cases_by_status,
            new_intakes_this_month: new_intakes,
            discharges_this_month: discharges,
            unassigned_active_cases: unassigned,
            my_active_cases: mine,
            active_by_violation_type,
            caseload_by_technician,
            upcoming_appointments,
            alerts,
        })
    }

    /// Follow-up alerts, optionally restricted to the viewer's caseload
    pub async fn alerts(&self, viewer: &AuthUser, mine: bool) -> AppResult<DashboardAlerts> {
        let today = Utc::now().date_naive();
        let windows = AlertWindows::new(&self.alerts, today);

        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT c.id AS case_id, c.code, c.full_name, c.responsible_technician_id,
                   t.name AS responsible_technician_name,
                   MAX(e.occurred_on) AS last_evolution_on,
                   c.paefi_started_on, c.intake_date
            FROM cases c
            LEFT JOIN users t ON t.id = c.responsible_technician_id
            LEFT JOIN evolutions e ON e.case_id = c.id
            WHERE c.status = 'paefi'"#,
        );
        push_mine(&mut qb, mine, viewer.user_id);
        qb.push(" GROUP BY c.id, t.name HAVING MAX(e.occurred_on) IS NULL OR MAX(e.occurred_on) < ")
            .push_bind(windows.evolution_cutoff)
            .push(" ORDER BY MAX(e.occurred_on) ASC NULLS FIRST");

        let mut stale_cases = qb
            .build_query_as::<StaleCaseAlert>()
            .fetch_all(&self.db)
            .await?;
        for alert in &mut stale_cases {
            let since = alert
                .last_evolution_on
                .or(alert.paefi_started_on)
                .unwrap_or(alert.intake_date);
            alert.days_without_evolution = days_between(since, today);
        }

        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT r.id AS referral_id, r.case_id, c.code, r.destination_name, r.sent_on
            FROM referrals r
            JOIN cases c ON c.id = r.case_id
            WHERE r.status = 'pending' AND r.sent_on < "#,
        );
        qb.push_bind(windows.referral_cutoff);
        push_mine(&mut qb, mine, viewer.user_id);
        qb.push(" ORDER BY r.sent_on ASC");

        let mut overdue_referrals = qb
            .build_query_as::<OverdueReferralAlert>()
            .fetch_all(&self.db)
            .await?;
        for alert in &mut overdue_referrals {
            alert.days_waiting = days_between(alert.sent_on, today);
        }

        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT p.id AS plan_id, p.case_id, c.code, c.full_name, p.review_on
            FROM action_plans p
            JOIN cases c ON c.id = p.case_id
            WHERE c.status = 'paefi' AND p.review_on <= "#,
        );
        qb.push_bind(windows.review_horizon);
        push_mine(&mut qb, mine, viewer.user_id);
        qb.push(" ORDER BY p.review_on ASC");

        let mut plan_reviews = qb
            .build_query_as::<PlanReviewAlert>()
            .fetch_all(&self.db)
            .await?;
        for alert in &mut plan_reviews {
            alert.days_until_review = days_until_review(alert.review_on, today);
        }

        let upcoming_appointments = AppointmentService::new(self.db.clone())
            .list(
                viewer,
                &AppointmentQuery {
                    status: Some(shared::AppointmentStatus::Scheduled),
                    mine: Some(mine),
                    ..Default::default()
                },
                self.alerts.appointment_lookahead_days,
            )
            .await?;

        Ok(DashboardAlerts {
            stale_cases,
            overdue_referrals,
            plan_reviews,
            upcoming_appointments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn alert_windows_from_defaults() {
        let windows = AlertWindows::new(&AlertConfig::default(), date(2026, 3, 31));
        assert_eq!(windows.evolution_cutoff, date(2026, 3, 1));
        assert_eq!(windows.referral_cutoff, date(2026, 3, 16));
        assert_eq!(windows.review_horizon, date(2026, 4, 7));
    }

    #[test]
    fn month_bounds_roll_over_the_year() {
        assert_eq!(
            month_bounds(2026, 12),
            Some((date(2026, 12, 1), date(2027, 1, 1)))
        );
        assert_eq!(month_bounds(2026, 2), Some((date(2026, 2, 1), date(2026, 3, 1))));
        assert_eq!(month_bounds(2026, 13), None);
        assert_eq!(month_bounds(2026, 0), None);
    }

    #[test]
    fn mine_restricts_by_technician() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM cases c WHERE 1 = 1");
        push_mine(&mut qb, false, Uuid::new_v4());
        assert_eq!(qb.sql(), "SELECT 1 FROM cases c WHERE 1 = 1");
        push_mine(&mut qb, true, Uuid::new_v4());
        assert!(qb.sql().ends_with("c.responsible_technician_id = $1"));
    }

    #[test]
    fn days_between_dates() {
        assert_eq!(days_between(date(2026, 1, 1), date(2026, 1, 31)), 30);
    }
}
