//! Technical evolution service
//!
//! Evolutions are always returned through [`Evolution::redact_for`] so that
//! confidential notes never leave the server for viewers who may not read them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use shared::{
    can_edit_evolution, AuditAction, AuditEntity, Evolution, EvolutionKind, PaginatedResponse,
    Pagination,
};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{self, NewAuditEntry};
use crate::services::case::{case_snapshot, CaseSnapshot};

/// Evolution service
#[derive(Clone)]
pub struct EvolutionService {
    db: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct EvolutionRecord {
    id: Uuid,
    case_id: Uuid,
    author_id: Uuid,
    author_name: String,
    occurred_on: NaiveDate,
    kind: String,
    summary: String,
    technical_notes: Option<String>,
    is_confidential: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EvolutionRecord> for Evolution {
    type Error = AppError;

    fn try_from(r: EvolutionRecord) -> AppResult<Self> {
        Ok(Evolution {
            kind: r
                .kind
                .parse()
                .map_err(|e| AppError::Internal(format!("Corrupt row: {}", e)))?,
            id: r.id,
            case_id: r.case_id,
            author_id: r.author_id,
            author_name: r.author_name,
            occurred_on: r.occurred_on,
            summary: Some(r.summary),
            technical_notes: r.technical_notes,
            is_confidential: r.is_confidential,
            redacted: false,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const EVOLUTION_SELECT: &str = r#"
    SELECT e.id, e.case_id, e.author_id, u.name AS author_name, e.occurred_on, e.kind,
           e.summary, e.technical_notes, e.is_confidential, e.created_at, e.updated_at
    FROM evolutions e
    JOIN users u ON u.id = e.author_id"#;

/// Query parameters for a case timeline
#[derive(Debug, Default, Deserialize)]
pub struct EvolutionQuery {
    pub kind: Option<EvolutionKind>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Input for recording an evolution
#[derive(Debug, Deserialize)]
pub struct CreateEvolutionInput {
    pub occurred_on: NaiveDate,
    pub kind: EvolutionKind,
    pub summary: String,
    pub technical_notes: Option<String>,
    #[serde(default)]
    pub is_confidential: bool,
}

/// Partial update of an evolution
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEvolutionInput {
    pub occurred_on: Option<NaiveDate>,
    pub kind: Option<EvolutionKind>,
    pub summary: Option<String>,
    pub technical_notes: Option<String>,
    pub is_confidential: Option<bool>,
}

/// Date and summary rules for an evolution of `case`
fn check_evolution(
    case: &CaseSnapshot,
    occurred_on: NaiveDate,
    summary: &str,
    today: NaiveDate,
) -> AppResult<()> {
    if summary.trim().is_empty() {
        return Err(AppError::validation(
            "summary",
            "Summary is required",
            "O resumo é obrigatório",
        ));
    }
    if occurred_on > today {
        return Err(AppError::validation(
            "occurred_on",
            "Date cannot be in the future",
            "A data não pode estar no futuro",
        ));
    }
    if occurred_on < case.intake_date {
        return Err(AppError::validation(
            "occurred_on",
            "Date cannot precede the intake date",
            "A data não pode ser anterior à data de acolhida",
        ));
    }
    Ok(())
}

fn push_evolution_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    case_id: Uuid,
    query: &EvolutionQuery,
) {
    qb.push(" WHERE e.case_id = ").push_bind(case_id);
    if let Some(kind) = query.kind {
        qb.push(" AND e.kind = ").push_bind(kind.as_str());
    }
    if let Some(from) = query.from {
        qb.push(" AND e.occurred_on >= ").push_bind(from);
    }
    if let Some(to) = query.to {
        qb.push(" AND e.occurred_on <= ").push_bind(to);
    }
}

async fn fetch_evolution<'e, E>(executor: E, evolution_id: Uuid) -> AppResult<Evolution>
where
    E: PgExecutor<'e>,
{
    let record = sqlx::query_as::<_, EvolutionRecord>(&format!(
        "{} WHERE e.id = $1",
        EVOLUTION_SELECT
    ))
    .bind(evolution_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound("Evolution".to_string()))?;

    Evolution::try_from(record)
}

impl EvolutionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Timeline of a case, newest first, redacted for the viewer
    pub async fn list_for_case(
        &self,
        viewer: &AuthUser,
        case_id: Uuid,
        query: &EvolutionQuery,
    ) -> AppResult<PaginatedResponse<Evolution>> {
        case_snapshot(&self.db, case_id).await?;
        let pagination = Pagination::from_query(query.page, query.per_page);

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM evolutions e");
        push_evolution_filters(&mut count_query, case_id, query);
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.db)
            .await?;

        let mut qb = QueryBuilder::<Postgres>::new(EVOLUTION_SELECT);
        push_evolution_filters(&mut qb, case_id, query);
        qb.push(" ORDER BY e.occurred_on DESC, e.created_at DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let evolutions = qb
            .build_query_as::<EvolutionRecord>()
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(|r| Evolution::try_from(r).map(|e| e.redact_for(viewer.role, viewer.user_id)))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(
            evolutions,
            pagination,
            u64::try_from(total).unwrap_or(0),
        ))
    }

    pub async fn get(&self, viewer: &AuthUser, evolution_id: Uuid) -> AppResult<Evolution> {
        let evolution = fetch_evolution(&self.db, evolution_id).await?;
        Ok(evolution.redact_for(viewer.role, viewer.user_id))
    }

    pub async fn create(
        &self,
        actor: &AuthUser,
        case_id: Uuid,
        input: CreateEvolutionInput,
    ) -> AppResult<Evolution> {
        let today = Utc::now().date_naive();

        let mut tx = self.db.begin().await?;

        let case = case_snapshot(&mut *tx, case_id).await?;
        case.ensure_active()?;
        check_evolution(&case, input.occurred_on, &input.summary, today)?;

        let evolution_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO evolutions (case_id, author_id, occurred_on, kind, summary, technical_notes, is_confidential)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(case_id)
        .bind(actor.user_id)
        .bind(input.occurred_on)
        .bind(input.kind.as_str())
        .bind(input.summary.trim())
        .bind(&input.technical_notes)
        .bind(input.is_confidential)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE cases SET updated_at = NOW() WHERE id = $1")
            .bind(case_id)
            .execute(&mut *tx)
            .await?;

        // Confidential content stays out of the audit trail
        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Create, AuditEntity::Evolution, evolution_id)
                .with_details(serde_json::json!({
                    "case_id": case_id,
                    "kind": input.kind,
                    "is_confidential": input.is_confidential,
                })),
        )
        .await?;

        let evolution = fetch_evolution(&mut *tx, evolution_id).await?;
        tx.commit().await?;

        tracing::info!(%case_id, %evolution_id, "evolution recorded");
        Ok(evolution)
    }

    /// Edit an evolution; only its author or an administrator may
    pub async fn update(
        &self,
        actor: &AuthUser,
        evolution_id: Uuid,
        input: UpdateEvolutionInput,
    ) -> AppResult<Evolution> {
        let today = Utc::now().date_naive();

        let mut tx = self.db.begin().await?;

        let current = fetch_evolution(&mut *tx, evolution_id).await?;
        if !can_edit_evolution(actor.role, actor.user_id, current.author_id) {
            return Err(AppError::InsufficientPermissions);
        }

        let case = case_snapshot(&mut *tx, current.case_id).await?;
        let occurred_on = input.occurred_on.unwrap_or(current.occurred_on);
        let summary = input
            .summary
            .as_deref()
            .or(current.summary.as_deref())
            .unwrap_or_default();
        check_evolution(&case, occurred_on, summary, today)?;

        sqlx::query(
            r#"
            UPDATE evolutions SET
                occurred_on = $2,
                kind = COALESCE($3, kind),
                summary = COALESCE($4, summary),
                technical_notes = COALESCE($5, technical_notes),
                is_confidential = COALESCE($6, is_confidential),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(evolution_id)
        .bind(occurred_on)
        .bind(input.kind.map(|k| k.as_str()))
        .bind(input.summary.as_deref().map(str::trim))
        .bind(&input.technical_notes)
        .bind(input.is_confidential)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Update, AuditEntity::Evolution, evolution_id)
                .with_details(serde_json::json!({ "case_id": current.case_id })),
        )
        .await?;

        let evolution = fetch_evolution(&mut *tx, evolution_id).await?;
        tx.commit().await?;

        Ok(evolution)
    }

    pub async fn delete(&self, actor: &AuthUser, evolution_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let case_id = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM evolutions WHERE id = $1 RETURNING case_id",
        )
        .bind(evolution_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Evolution".to_string()))?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Delete, AuditEntity::Evolution, evolution_id)
                .with_details(serde_json::json!({ "case_id": case_id })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(%case_id, %evolution_id, "evolution deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::CaseStatus;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn case() -> CaseSnapshot {
        CaseSnapshot {
            status: CaseStatus::Paefi,
            intake_date: date(2, 1),
            responsible_technician_id: None,
        }
    }

    #[test]
    fn evolution_dates_are_bounded_by_intake_and_today() {
        let today = date(3, 1);
        assert!(check_evolution(&case(), date(2, 1), "Atendimento", today).is_ok());
        assert!(check_evolution(&case(), date(1, 31), "Atendimento", today).is_err());
        assert!(check_evolution(&case(), date(3, 2), "Atendimento", today).is_err());
    }

    #[test]
    fn blank_summary_is_rejected() {
        let result = check_evolution(&case(), date(2, 10), "  ", date(3, 1));
        assert!(matches!(result, Err(AppError::Validation { field, .. }) if field == "summary"));
    }

    #[test]
    fn timeline_filters() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM evolutions e");
        let query = EvolutionQuery {
            kind: Some(EvolutionKind::HomeVisit),
            to: Some(date(3, 1)),
            ..Default::default()
        };
        push_evolution_filters(&mut qb, Uuid::new_v4(), &query);
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM evolutions e WHERE e.case_id = $1 AND e.kind = $2 AND e.occurred_on <= $3"
        );
    }
}
