//! Agenda service for attendances, home visits and other scheduled activities

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    slots_overlap, validate_duration, AppointmentKind, AppointmentStatus, AuditAction,
    AuditEntity, DEFAULT_APPOINTMENT_MINUTES, MAX_APPOINTMENT_MINUTES,
};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{self, NewAuditEntry};
use crate::services::case::{case_snapshot, ensure_assignable, CaseSnapshot};

/// Appointment service
#[derive(Clone)]
pub struct AppointmentService {
    db: PgPool,
}

/// A scheduled activity
#[derive(Debug, Clone, Serialize)]
pub struct Appointment {
    pub id: Uuid,
    pub case_id: Uuid,
    pub case_code: String,
    pub case_name: String,
    pub technician_id: Uuid,
    pub technician_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub kind: AppointmentKind,
    pub location: Option<String>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentRecord {
    id: Uuid,
    case_id: Uuid,
    case_code: String,
    case_name: String,
    technician_id: Uuid,
    technician_name: String,
    scheduled_at: DateTime<Utc>,
    duration_minutes: i32,
    kind: String,
    location: Option<String>,
    status: String,
    notes: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRecord> for Appointment {
    type Error = AppError;

    fn try_from(r: AppointmentRecord) -> AppResult<Self> {
        let corrupt = |e: shared::ParseEnumError| AppError::Internal(format!("Corrupt row: {}", e));
        Ok(Appointment {
            kind: r.kind.parse().map_err(corrupt)?,
            status: r.status.parse().map_err(corrupt)?,
            id: r.id,
            case_id: r.case_id,
            case_code: r.case_code,
            case_name: r.case_name,
            technician_id: r.technician_id,
            technician_name: r.technician_name,
            scheduled_at: r.scheduled_at,
            duration_minutes: r.duration_minutes,
            location: r.location,
            notes: r.notes,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const APPOINTMENT_SELECT: &str = r#"
    SELECT a.id, a.case_id, c.code AS case_code, c.full_name AS case_name,
           a.technician_id, u.name AS technician_name, a.scheduled_at, a.duration_minutes,
           a.kind, a.location, a.status, a.notes, a.created_by, a.created_at, a.updated_at
    FROM appointments a
    JOIN cases c ON c.id = a.case_id
    JOIN users u ON u.id = a.technician_id"#;

/// Agenda query parameters
#[derive(Debug, Default, Deserialize)]
pub struct AppointmentQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub technician_id: Option<Uuid>,
    pub case_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub mine: Option<bool>,
}

/// Input for scheduling an appointment
#[derive(Debug, Deserialize)]
pub struct CreateAppointmentInput {
    pub case_id: Uuid,
    /// Defaults to the case's responsible technician, then to the caller
    pub technician_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub kind: AppointmentKind,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Reschedule or edit a scheduled appointment
#[derive(Debug, Default, Deserialize)]
pub struct UpdateAppointmentInput {
    pub technician_id: Option<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub kind: Option<AppointmentKind>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Input for closing an appointment
#[derive(Debug, Deserialize)]
pub struct AppointmentStatusInput {
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

/// A technician's existing slot
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
struct BusySlot {
    id: Uuid,
    scheduled_at: DateTime<Utc>,
    duration_minutes: i32,
}

/// First existing slot that overlaps `[start, start + minutes)`
fn find_conflict(start: DateTime<Utc>, minutes: i32, busy: &[BusySlot]) -> Option<Uuid> {
    busy.iter()
        .find(|slot| slots_overlap(start, minutes, slot.scheduled_at, slot.duration_minutes))
        .map(|slot| slot.id)
}

fn check_duration(minutes: i32) -> AppResult<()> {
    validate_duration(minutes).map_err(|msg| {
        AppError::validation(
            "duration_minutes",
            msg,
            "A duração deve estar entre 5 e 480 minutos",
        )
    })
}

/// Fail with 409 when the technician already has an overlapping scheduled appointment.
///
/// Locks the technician row so concurrent bookings for the same person serialize.
async fn ensure_slot_free(
    conn: &mut PgConnection,
    technician_id: Uuid,
    start: DateTime<Utc>,
    minutes: i32,
    ignore: Option<Uuid>,
) -> AppResult<()> {
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(technician_id)
        .execute(&mut *conn)
        .await?;

    // Any slot that could overlap starts within the longest allowed duration before us
    let window_start = start - Duration::minutes(i64::from(MAX_APPOINTMENT_MINUTES));
    let window_end = start + Duration::minutes(i64::from(minutes));

    let busy = sqlx::query_as::<_, BusySlot>(
        r#"
        SELECT id, scheduled_at, duration_minutes
        FROM appointments
        WHERE technician_id = $1
          AND status = 'scheduled'
          AND scheduled_at >= $2
          AND scheduled_at < $3
          AND ($4::uuid IS NULL OR id <> $4)
        "#,
    )
    .bind(technician_id)
    .bind(window_start)
    .bind(window_end)
    .bind(ignore)
    .fetch_all(&mut *conn)
    .await?;

    match find_conflict(start, minutes, &busy) {
        Some(conflict_id) => {
            tracing::debug!(%technician_id, %conflict_id, "appointment overlap");
            Err(AppError::Conflict {
                resource: "scheduled_at".to_string(),
                message: "The technician already has an appointment at this time".to_string(),
                message_pt: "O técnico já possui um atendimento neste horário".to_string(),
            })
        }
        None => Ok(()),
    }
}

/// Only scheduled appointments of active cases can be edited or moved
fn check_editable(status: AppointmentStatus, case: &CaseSnapshot) -> AppResult<()> {
    if status != AppointmentStatus::Scheduled {
        return Err(AppError::InvalidStateTransition(format!(
            "Appointment is {} and can no longer be changed",
            status
        )));
    }
    case.ensure_active()
}

fn select_by_id(lock: bool) -> String {
    let mut sql = format!("{} WHERE a.id = $1", APPOINTMENT_SELECT);
    if lock {
        sql.push_str(" FOR UPDATE OF a");
    }
    sql
}

async fn fetch_appointment(conn: &mut PgConnection, id: Uuid) -> AppResult<Appointment> {
    load_appointment(conn, id, false).await
}

/// Load an appointment and hold its row lock until the transaction ends
async fn lock_appointment(conn: &mut PgConnection, id: Uuid) -> AppResult<Appointment> {
    load_appointment(conn, id, true).await
}

async fn load_appointment(conn: &mut PgConnection, id: Uuid, lock: bool) -> AppResult<Appointment> {
    let record = sqlx::query_as::<_, AppointmentRecord>(&select_by_id(lock))
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Appointment".to_string()))?;

    Appointment::try_from(record)
}

impl AppointmentService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Agenda for a time window, defaulting to the next `lookahead_days`
    pub async fn list(
        &self,
        viewer: &AuthUser,
        query: &AppointmentQuery,
        lookahead_days: i32,
    ) -> AppResult<Vec<Appointment>> {
        let from = query.from.unwrap_or_else(Utc::now);
        let to = query
            .to
            .unwrap_or_else(|| from + Duration::days(i64::from(lookahead_days)));

        if from > to {
            return Err(AppError::validation(
                "from",
                "Start must not be after end",
                "O início não pode ser posterior ao fim",
            ));
        }

        let mut qb = QueryBuilder::<Postgres>::new(APPOINTMENT_SELECT);
        qb.push(" WHERE a.scheduled_at >= ")
            .push_bind(from)
            .push(" AND a.scheduled_at < ")
            .push_bind(to);

        if let Some(technician_id) = query.technician_id {
            qb.push(" AND a.technician_id = ").push_bind(technician_id);
        }
        if query.mine == Some(true) {
            qb.push(" AND a.technician_id = ").push_bind(viewer.user_id);
        }
        if let Some(case_id) = query.case_id {
            qb.push(" AND a.case_id = ").push_bind(case_id);
        }
        if let Some(status) = query.status {
            qb.push(" AND a.status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY a.scheduled_at, a.id");

        qb.build_query_as::<AppointmentRecord>()
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(Appointment::try_from)
            .collect()
    }

    pub async fn get(&self, appointment_id: Uuid) -> AppResult<Appointment> {
        let mut conn = self.db.acquire().await?;
        fetch_appointment(&mut conn, appointment_id).await
    }

    /// Next scheduled appointment of a case
    pub async fn next_for_case(&self, case_id: Uuid) -> AppResult<Option<Appointment>> {
        sqlx::query_as::<_, AppointmentRecord>(&format!(
            "{} WHERE a.case_id = $1 AND a.status = 'scheduled' AND a.scheduled_at >= NOW() \
             ORDER BY a.scheduled_at LIMIT 1",
            APPOINTMENT_SELECT
        ))
        .bind(case_id)
        .fetch_optional(&self.db)
        .await?
        .map(Appointment::try_from)
        .transpose()
    }

    pub async fn create(
        &self,
        actor: &AuthUser,
        input: CreateAppointmentInput,
    ) -> AppResult<Appointment> {
        let minutes = input.duration_minutes.unwrap_or(DEFAULT_APPOINTMENT_MINUTES);
        check_duration(minutes)?;

        let mut tx = self.db.begin().await?;

        let case = case_snapshot(&mut *tx, input.case_id).await?;
        case.ensure_active()?;

        let technician_id = input
            .technician_id
            .or(case.responsible_technician_id)
            .unwrap_or(actor.user_id);
        ensure_assignable(&mut *tx, technician_id).await?;

        ensure_slot_free(&mut tx, technician_id, input.scheduled_at, minutes, None).await?;

        let appointment_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO appointments (
                case_id, technician_id, scheduled_at, duration_minutes, kind, location, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(input.case_id)
        .bind(technician_id)
        .bind(input.scheduled_at)
        .bind(minutes)
        .bind(input.kind.as_str())
        .bind(&input.location)
        .bind(&input.notes)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Create, AuditEntity::Appointment, appointment_id)
                .with_details(serde_json::json!({
                    "case_id": input.case_id,
                    "technician_id": technician_id,
                    "scheduled_at": input.scheduled_at,
                })),
        )
        .await?;

        let appointment = fetch_appointment(&mut tx, appointment_id).await?;
        tx.commit().await?;

        tracing::info!(%appointment_id, case_id = %input.case_id, "appointment scheduled");
        Ok(appointment)
    }

    /// Reschedule or edit; only scheduled appointments can change
    pub async fn update(
        &self,
        actor: &AuthUser,
        appointment_id: Uuid,
        input: UpdateAppointmentInput,
    ) -> AppResult<Appointment> {
        let mut tx = self.db.begin().await?;

        let current = lock_appointment(&mut tx, appointment_id).await?;
        let case = case_snapshot(&mut *tx, current.case_id).await?;
        check_editable(current.status, &case)?;

        let technician_id = input.technician_id.unwrap_or(current.technician_id);
        let scheduled_at = input.scheduled_at.unwrap_or(current.scheduled_at);
        let minutes = input.duration_minutes.unwrap_or(current.duration_minutes);
        check_duration(minutes)?;

        if technician_id != current.technician_id {
            ensure_assignable(&mut *tx, technician_id).await?;
        }

        let slot_changed = technician_id != current.technician_id
            || scheduled_at != current.scheduled_at
            || minutes != current.duration_minutes;
        if slot_changed {
            ensure_slot_free(&mut tx, technician_id, scheduled_at, minutes, Some(appointment_id))
                .await?;
        }

        sqlx::query(
            r#"
            UPDATE appointments SET
                technician_id = $2,
                scheduled_at = $3,
                duration_minutes = $4,
                kind = COALESCE($5, kind),
                location = COALESCE($6, location),
                notes = COALESCE($7, notes),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(appointment_id)
        .bind(technician_id)
        .bind(scheduled_at)
        .bind(minutes)
        .bind(input.kind.map(|k| k.as_str()))
        .bind(&input.location)
        .bind(&input.notes)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Update, AuditEntity::Appointment, appointment_id)
                .with_details(serde_json::json!({
                    "from": current.scheduled_at,
                    "to": scheduled_at,
                    "technician_id": technician_id,
                })),
        )
        .await?;

        let appointment = fetch_appointment(&mut tx, appointment_id).await?;
        tx.commit().await?;

        Ok(appointment)
    }

    /// Mark a scheduled appointment as completed, missed or cancelled
    pub async fn change_status(
        &self,
        actor: &AuthUser,
        appointment_id: Uuid,
        input: AppointmentStatusInput,
    ) -> AppResult<Appointment> {
        let mut tx = self.db.begin().await?;

        let current = lock_appointment(&mut tx, appointment_id).await?;
        if !current.status.can_transition_to(input.status) {
            return Err(AppError::InvalidStateTransition(format!(
                "Appointment cannot move from {} to {}",
                current.status, input.status
            )));
        }

        sqlx::query(
            r#"
            UPDATE appointments SET status = $2, notes = COALESCE($3, notes), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(appointment_id)
        .bind(input.status.as_str())
        .bind(&input.notes)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(
                actor,
                AuditAction::StatusChange,
                AuditEntity::Appointment,
                appointment_id,
            )
            .with_details(serde_json::json!({ "from": current.status, "to": input.status })),
        )
        .await?;

        let appointment = fetch_appointment(&mut tx, appointment_id).await?;
        tx.commit().await?;

        Ok(appointment)
    }

    pub async fn delete(&self, actor: &AuthUser, appointment_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let case_id = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM appointments WHERE id = $1 RETURNING case_id",
        )
        .bind(appointment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Appointment".to_string()))?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Delete, AuditEntity::Appointment, appointment_id)
                .with_details(serde_json::json!({ "case_id": case_id })),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::CaseStatus;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, hour, minute, 0).unwrap()
    }

    fn slot(hour: u32, minute: u32, duration_minutes: i32) -> BusySlot {
        BusySlot {
            id: Uuid::new_v4(),
            scheduled_at: at(hour, minute),
            duration_minutes,
        }
    }

    #[test]
    fn back_to_back_slots_do_not_conflict() {
        let busy = [slot(9, 0, 60), slot(11, 0, 30)];
        assert_eq!(find_conflict(at(10, 0), 60, &busy), None);
        assert_eq!(find_conflict(at(11, 30), 15, &busy), None);
    }

    #[test]
    fn overlapping_slot_is_reported() {
        let busy = [slot(9, 0, 60), slot(11, 0, 30)];
        assert_eq!(find_conflict(at(9, 59), 5, &busy), Some(busy[0].id));
        assert_eq!(find_conflict(at(10, 30), 60, &busy), Some(busy[1].id));
        // Fully containing another slot
        assert_eq!(find_conflict(at(8, 0), 240, &busy), Some(busy[0].id));
    }

    fn case(status: CaseStatus) -> CaseSnapshot {
        CaseSnapshot {
            status,
            intake_date: at(8, 0).date_naive(),
            responsible_technician_id: Some(Uuid::new_v4()),
        }
    }

    #[test]
    fn discharged_cases_cannot_be_rescheduled() {
        let result = check_editable(AppointmentStatus::Scheduled, &case(CaseStatus::Discharged));
        assert!(matches!(result, Err(AppError::InvalidStateTransition(_))));
        assert!(check_editable(AppointmentStatus::Scheduled, &case(CaseStatus::Paefi)).is_ok());
    }

    #[test]
    fn finished_appointments_cannot_be_edited() {
        for status in [
            AppointmentStatus::Completed,
            AppointmentStatus::Missed,
            AppointmentStatus::Cancelled,
        ] {
            assert!(check_editable(status, &case(CaseStatus::Intake)).is_err());
        }
    }

    #[test]
    fn status_changes_lock_only_the_appointment_row() {
        assert!(select_by_id(true).ends_with("WHERE a.id = $1 FOR UPDATE OF a"));
        assert!(!select_by_id(false).contains("FOR UPDATE"));
    }

    #[test]
    fn duration_bounds() {
        assert!(check_duration(DEFAULT_APPOINTMENT_MINUTES).is_ok());
        assert!(check_duration(4).is_err());
        assert!(check_duration(MAX_APPOINTMENT_MINUTES + 1).is_err());
    }
}
