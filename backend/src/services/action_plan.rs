//! PAF (individualized action plan) service

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{validate_new_action_plan, ActionPlanError, AuditAction, AuditEntity};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{self, NewAuditEntry};
use crate::services::case::case_snapshot;

/// Action plan service
#[derive(Clone)]
pub struct ActionPlanService {
    db: PgPool,
}

/// The action plan of a case
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActionPlan {
    pub id: Uuid,
    pub case_id: Uuid,
    pub objectives: String,
    pub interventions: String,
    pub family_commitments: Option<String>,
    pub network_actions: Option<String>,
    pub review_on: NaiveDate,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full replacement of the plan
#[derive(Debug, Deserialize)]
pub struct SaveActionPlanInput {
    pub objectives: String,
    pub interventions: String,
    pub family_commitments: Option<String>,
    pub network_actions: Option<String>,
    pub review_on: NaiveDate,
}

const PLAN_COLUMNS: &str = "id, case_id, objectives, interventions, family_commitments, \
                            network_actions, review_on, created_by, updated_by, created_at, updated_at";

fn plan_error(e: ActionPlanError) -> AppError {
    match e {
        ActionPlanError::CaseNotInFollowUp => AppError::InvalidStateTransition(e.to_string()),
        ActionPlanError::ReviewInPast => AppError::validation(
            "review_on",
            "The review date cannot be in the past",
            "A data de revisão não pode estar no passado",
        ),
        ActionPlanError::MissingContent => AppError::validation(
            "objectives",
            "Objectives and interventions are required",
            "Objetivos e intervenções são obrigatórios",
        ),
    }
}

impl ActionPlanService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn find_for_case(&self, case_id: Uuid) -> AppResult<Option<ActionPlan>> {
        let plan = sqlx::query_as::<_, ActionPlan>(&format!(
            "SELECT {} FROM action_plans WHERE case_id = $1",
            PLAN_COLUMNS
        ))
        .bind(case_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(plan)
    }

    /// The plan of a case, 404 when none was written yet
    pub async fn get_for_case(&self, case_id: Uuid) -> AppResult<ActionPlan> {
        case_snapshot(&self.db, case_id).await?;
        self.find_for_case(case_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Action plan".to_string()))
    }

    /// Create or replace the plan of a case
    pub async fn save(
        &self,
        actor: &AuthUser,
        case_id: Uuid,
        input: SaveActionPlanInput,
    ) -> AppResult<ActionPlan> {
        let today = Utc::now().date_naive();

        let mut tx = self.db.begin().await?;

        let case = case_snapshot(&mut *tx, case_id).await?;

        let existing = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM action_plans WHERE case_id = $1 FOR UPDATE",
        )
        .bind(case_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (plan, action) = match existing {
            None => {
                validate_new_action_plan(
                    case.status,
                    &input.objectives,
                    &input.interventions,
                    input.review_on,
                    today,
                )
                .map_err(plan_error)?;

                let plan = sqlx::query_as::<_, ActionPlan>(&format!(
                    r#"
                    INSERT INTO action_plans (
                        case_id, objectives, interventions, family_commitments,
                        network_actions, review_on, created_by, updated_by
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                    RETURNING {}
                    "#,
                    PLAN_COLUMNS
                ))
                .bind(case_id)
                .bind(input.objectives.trim())
                .bind(input.interventions.trim())
                .bind(&input.family_commitments)
                .bind(&input.network_actions)
                .bind(input.review_on)
                .bind(actor.user_id)
                .fetch_one(&mut *tx)
                .await?;

                (plan, AuditAction::Create)
            }
            Some(plan_id) => {
                if input.objectives.trim().is_empty() || input.interventions.trim().is_empty() {
                    return Err(plan_error(ActionPlanError::MissingContent));
                }
                case.ensure_active()?;

                let plan = sqlx::query_as::<_, ActionPlan>(&format!(
                    r#"
                    UPDATE action_plans SET
                        objectives = $2,
                        interventions = $3,
                        family_commitments = $4,
                        network_actions = $5,
                        review_on = $6,
                        updated_by = $7,
                        updated_at = NOW()
                    WHERE id = $1
                    RETURNING {}
                    "#,
                    PLAN_COLUMNS
                ))
                .bind(plan_id)
                .bind(input.objectives.trim())
                .bind(input.interventions.trim())
                .bind(&input.family_commitments)
                .bind(&input.network_actions)
                .bind(input.review_on)
                .bind(actor.user_id)
                .fetch_one(&mut *tx)
                .await?;

                (plan, AuditAction::Update)
            }
        };

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, action, AuditEntity::ActionPlan, plan.id).with_details(
                serde_json::json!({ "case_id": case_id, "review_on": plan.review_on }),
            ),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(case_id = %case_id, plan_id = %plan.id, "action plan saved");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn plan_errors_map_to_statuses() {
        assert_eq!(
            plan_error(ActionPlanError::CaseNotInFollowUp).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            plan_error(ActionPlanError::ReviewInPast).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
