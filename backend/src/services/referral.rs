//! Referrals to the protection network

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{AuditAction, AuditEntity, DestinationType, ReferralStatus};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{self, NewAuditEntry};
use crate::services::case::case_snapshot;

/// Referral service
#[derive(Clone)]
pub struct ReferralService {
    db: PgPool,
}

/// A referral sent to another service of the network
#[derive(Debug, Clone, Serialize)]
pub struct Referral {
    pub id: Uuid,
    pub case_id: Uuid,
    pub case_code: String,
    pub destination_type: DestinationType,
    pub destination_name: String,
    pub reason: String,
    pub sent_on: NaiveDate,
    pub status: ReferralStatus,
    pub responded_on: Option<NaiveDate>,
    pub response_notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct ReferralRecord {
    id: Uuid,
    case_id: Uuid,
    case_code: String,
    destination_type: String,
    destination_name: String,
    reason: String,
    sent_on: NaiveDate,
    status: String,
    responded_on: Option<NaiveDate>,
    response_notes: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReferralRecord> for Referral {
    type Error = AppError;

    fn try_from(r: ReferralRecord) -> AppResult<Self> {
        let corrupt = |e: shared::ParseEnumError| AppError::Internal(format!("Corrupt row: {}", e));
        Ok(Referral {
            destination_type: r.destination_type.parse().map_err(corrupt)?,
            status: r.status.parse().map_err(corrupt)?,
            id: r.id,
            case_id: r.case_id,
            case_code: r.case_code,
            destination_name: r.destination_name,
            reason: r.reason,
            sent_on: r.sent_on,
            responded_on: r.responded_on,
            response_notes: r.response_notes,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const REFERRAL_SELECT: &str = r#"
    SELECT r.id, r.case_id, c.code AS case_code, r.destination_type, r.destination_name,
           r.reason, r.sent_on, r.status, r.responded_on, r.response_notes, r.created_by,
           r.created_at, r.updated_at
    FROM referrals r
    JOIN cases c ON c.id = r.case_id"#;

/// Query parameters for the network-wide referral list
#[derive(Debug, Default, Deserialize)]
pub struct ReferralQuery {
    pub status: Option<ReferralStatus>,
    /// Pending referrals older than the configured response window
    pub overdue: Option<bool>,
}

/// Input for sending a referral
#[derive(Debug, Deserialize)]
pub struct CreateReferralInput {
    pub destination_type: DestinationType,
    pub destination_name: String,
    pub reason: String,
    pub sent_on: Option<NaiveDate>,
}

/// Input for recording the network's answer
#[derive(Debug, Deserialize)]
pub struct ReferralStatusInput {
    pub status: ReferralStatus,
    pub responded_on: Option<NaiveDate>,
    pub response_notes: Option<String>,
}

/// Validate a status change and return the response date to store, if any
fn check_status_change(
    from: ReferralStatus,
    input: &ReferralStatusInput,
    sent_on: NaiveDate,
    today: NaiveDate,
) -> AppResult<Option<NaiveDate>> {
    if !from.can_transition_to(input.status) {
        return Err(AppError::InvalidStateTransition(format!(
            "Referral cannot move from {} to {}",
            from, input.status
        )));
    }

    if !input.status.records_response() {
        return Ok(None);
    }

    let responded_on = input.responded_on.unwrap_or(today);
    if responded_on < sent_on {
        return Err(AppError::validation(
            "responded_on",
            "Response date cannot precede the sending date",
            "A data de resposta não pode ser anterior à data de envio",
        ));
    }
    if responded_on > today {
        return Err(AppError::validation(
            "responded_on",
            "Response date cannot be in the future",
            "A data de resposta não pode estar no futuro",
        ));
    }
    Ok(Some(responded_on))
}

/// Oldest `sent_on` that is still within the response window
pub fn overdue_cutoff(today: NaiveDate, response_days: i32) -> NaiveDate {
    today - Duration::days(i64::from(response_days))
}

fn select_by_id(lock: bool) -> String {
    let mut sql = format!("{} WHERE r.id = $1", REFERRAL_SELECT);
    if lock {
        sql.push_str(" FOR UPDATE OF r");
    }
    sql
}

async fn fetch_referral<'e, E>(executor: E, referral_id: Uuid) -> AppResult<Referral>
where
    E: PgExecutor<'e>,
{
    load_referral(executor, referral_id, false).await
}

/// Load a referral and hold its row lock until the transaction ends
async fn lock_referral<'e, E>(executor: E, referral_id: Uuid) -> AppResult<Referral>
where
    E: PgExecutor<'e>,
{
    load_referral(executor, referral_id, true).await
}

async fn load_referral<'e, E>(executor: E, referral_id: Uuid, lock: bool) -> AppResult<Referral>
where
    E: PgExecutor<'e>,
{
    let record = sqlx::query_as::<_, ReferralRecord>(&select_by_id(lock))
        .bind(referral_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Referral".to_string()))?;

    Referral::try_from(record)
}

impl ReferralService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_for_case(&self, case_id: Uuid) -> AppResult<Vec<Referral>> {
        case_snapshot(&self.db, case_id).await?;

        sqlx::query_as::<_, ReferralRecord>(&format!(
            "{} WHERE r.case_id = $1 ORDER BY r.sent_on DESC, r.created_at DESC",
            REFERRAL_SELECT
        ))
        .bind(case_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(Referral::try_from)
        .collect()
    }

    /// Referrals across all cases
    pub async fn list(&self, query: &ReferralQuery, response_days: i32) -> AppResult<Vec<Referral>> {
        let mut qb = QueryBuilder::<Postgres>::new(REFERRAL_SELECT);
        qb.push(" WHERE 1 = 1");

        if let Some(status) = query.status {
            qb.push(" AND r.status = ").push_bind(status.as_str());
        }
        if query.overdue == Some(true) {
            let cutoff = overdue_cutoff(Utc::now().date_naive(), response_days);
            qb.push(" AND r.status = 'pending' AND r.sent_on < ")
                .push_bind(cutoff);
        }
        qb.push(" ORDER BY r.sent_on ASC, r.created_at ASC");

        qb.build_query_as::<ReferralRecord>()
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(Referral::try_from)
            .collect()
    }

    pub async fn create(
        &self,
        actor: &AuthUser,
        case_id: Uuid,
        input: CreateReferralInput,
    ) -> AppResult<Referral> {
        let today = Utc::now().date_naive();
        let sent_on = input.sent_on.unwrap_or(today);

        if sent_on > today {
            return Err(AppError::validation(
                "sent_on",
                "Sending date cannot be in the future",
                "A data de envio não pode estar no futuro",
            ));
        }
        if input.destination_name.trim().is_empty() || input.reason.trim().is_empty() {
            return Err(AppError::validation(
                "destination_name",
                "Destination and reason are required",
                "Destino e motivo são obrigatórios",
            ));
        }

        let mut tx = self.db.begin().await?;

        let case = case_snapshot(&mut *tx, case_id).await?;
        case.ensure_active()?;

        let referral_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO referrals (case_id, destination_type, destination_name, reason, sent_on, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(case_id)
        .bind(input.destination_type.as_str())
        .bind(input.destination_name.trim())
        .bind(input.reason.trim())
        .bind(sent_on)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Create, AuditEntity::Referral, referral_id)
                .with_details(serde_json::json!({
                    "case_id": case_id,
                    "destination_type": input.destination_type,
                })),
        )
        .await?;

        let referral = fetch_referral(&mut *tx, referral_id).await?;
        tx.commit().await?;

        tracing::info!(%case_id, %referral_id, "referral sent");
        Ok(referral)
    }

    pub async fn change_status(
        &self,
        actor: &AuthUser,
        referral_id: Uuid,
        input: ReferralStatusInput,
    ) -> AppResult<Referral> {
        let today = Utc::now().date_naive();

        let mut tx = self.db.begin().await?;

        let current = lock_referral(&mut *tx, referral_id).await?;
        let responded_on = check_status_change(current.status, &input, current.sent_on, today)?;

        sqlx::query(
            r#"
            UPDATE referrals SET
                status = $2,
                responded_on = COALESCE($3, responded_on),
                response_notes = COALESCE($4, response_notes),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(referral_id)
        .bind(input.status.as_str())
        .bind(responded_on)
        .bind(&input.response_notes)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::StatusChange, AuditEntity::Referral, referral_id)
                .with_details(serde_json::json!({
                    "case_id": current.case_id,
                    "from": current.status,
                    "to": input.status,
                })),
        )
        .await?;

        let referral = fetch_referral(&mut *tx, referral_id).await?;
        tx.commit().await?;

        Ok(referral)
    }

    /// Delete a referral that is still pending
    pub async fn delete(&self, actor: &AuthUser, referral_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let current = lock_referral(&mut *tx, referral_id).await?;
        if current.status != ReferralStatus::Pending {
            return Err(AppError::validation(
                "status",
                "Only pending referrals can be deleted",
                "Somente encaminhamentos pendentes podem ser excluídos",
            ));
        }

        sqlx::query("DELETE FROM referrals WHERE id = $1")
            .bind(referral_id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Delete, AuditEntity::Referral, referral_id)
                .with_details(serde_json::json!({ "case_id": current.case_id })),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn input(status: ReferralStatus, responded_on: Option<NaiveDate>) -> ReferralStatusInput {
        ReferralStatusInput {
            status,
            responded_on,
            response_notes: None,
        }
    }

    #[test]
    fn response_date_defaults_to_today() {
        let result = check_status_change(
            ReferralStatus::Pending,
            &input(ReferralStatus::Responded, None),
            date(3, 1),
            date(3, 10),
        );
        assert_eq!(result.unwrap(), Some(date(3, 10)));
    }

    #[test]
    fn cancelling_records_no_response() {
        let result = check_status_change(
            ReferralStatus::Pending,
            &input(ReferralStatus::Cancelled, None),
            date(3, 1),
            date(3, 10),
        );
        assert_eq!(result.unwrap(), None);
    }

    #[test]
    fn response_before_sending_is_rejected() {
        let result = check_status_change(
            ReferralStatus::Pending,
            &input(ReferralStatus::Refused, Some(date(2, 28))),
            date(3, 1),
            date(3, 10),
        );
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[test]
    fn terminal_referrals_cannot_move() {
        let result = check_status_change(
            ReferralStatus::Completed,
            &input(ReferralStatus::Cancelled, None),
            date(3, 1),
            date(3, 10),
        );
        assert!(matches!(result, Err(AppError::InvalidStateTransition(_))));
    }

    #[test]
    fn status_changes_lock_only_the_referral_row() {
        assert!(select_by_id(true).ends_with("WHERE r.id = $1 FOR UPDATE OF r"));
        assert!(!select_by_id(false).contains("FOR UPDATE"));
    }

    /// Once one transition commits, a concurrent one re-checks against the new state
    #[test]
    fn second_transition_sees_terminal_state() {
        assert!(check_status_change(
            ReferralStatus::Pending,
            &input(ReferralStatus::Refused, None),
            date(3, 1),
            date(3, 10),
        )
        .is_ok());
        let result = check_status_change(
            ReferralStatus::Refused,
            &input(ReferralStatus::Cancelled, None),
            date(3, 1),
            date(3, 10),
        );
        assert!(matches!(result, Err(AppError::InvalidStateTransition(_))));
    }

    #[test]
    fn overdue_cutoff_counts_back_from_today() {
        assert_eq!(overdue_cutoff(date(3, 16), 15), date(3, 1));
    }
}
