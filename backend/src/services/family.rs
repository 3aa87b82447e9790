//! Family composition service

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    household_summary, AuditAction, AuditEntity, HouseholdIncomeEntry, HouseholdSummary,
    Relationship,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{self, NewAuditEntry};
use crate::services::case::case_snapshot;

/// Family service
#[derive(Clone)]
pub struct FamilyService {
    db: PgPool,
}

/// Family member of a case subject
#[derive(Debug, Clone, Serialize)]
pub struct FamilyMember {
    pub id: Uuid,
    pub case_id: Uuid,
    pub full_name: String,
    pub relationship: Relationship,
    pub birth_date: Option<NaiveDate>,
    pub cpf: Option<String>,
    pub nis: Option<String>,
    pub phone: Option<String>,
    pub occupation: Option<String>,
    pub monthly_income: Option<Decimal>,
    pub is_legal_guardian: bool,
    pub lives_in_household: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct FamilyMemberRecord {
    id: Uuid,
    case_id: Uuid,
    full_name: String,
    relationship: String,
    birth_date: Option<NaiveDate>,
    cpf: Option<String>,
    nis: Option<String>,
    phone: Option<String>,
    occupation: Option<String>,
    monthly_income: Option<Decimal>,
    is_legal_guardian: bool,
    lives_in_household: bool,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FamilyMemberRecord> for FamilyMember {
    type Error = AppError;

    fn try_from(r: FamilyMemberRecord) -> AppResult<Self> {
        Ok(FamilyMember {
            relationship: r
                .relationship
                .parse()
                .map_err(|e| AppError::Internal(format!("Corrupt row: {}", e)))?,
            id: r.id,
            case_id: r.case_id,
            full_name: r.full_name,
            birth_date: r.birth_date,
            cpf: r.cpf,
            nis: r.nis,
            phone: r.phone,
            occupation: r.occupation,
            monthly_income: r.monthly_income,
            is_legal_guardian: r.is_legal_guardian,
            lives_in_household: r.lives_in_household,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const MEMBER_COLUMNS: &str = "id, case_id, full_name, relationship, birth_date, cpf, nis, phone, \
                              occupation, monthly_income, is_legal_guardian, lives_in_household, \
                              notes, created_at, updated_at";

/// Members of a family together with the household income summary
#[derive(Debug, Serialize)]
pub struct FamilyComposition {
    pub members: Vec<FamilyMember>,
    pub household: HouseholdSummary,
}

/// Input for adding a family member
#[derive(Debug, Deserialize)]
pub struct CreateFamilyMemberInput {
    pub full_name: String,
    pub relationship: Relationship,
    pub birth_date: Option<NaiveDate>,
    pub cpf: Option<String>,
    pub nis: Option<String>,
    pub phone: Option<String>,
    pub occupation: Option<String>,
    pub monthly_income: Option<Decimal>,
    #[serde(default)]
    pub is_legal_guardian: bool,
    #[serde(default = "default_true")]
    pub lives_in_household: bool,
    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Partial update of a family member
#[derive(Debug, Default, Deserialize)]
pub struct UpdateFamilyMemberInput {
    pub full_name: Option<String>,
    pub relationship: Option<Relationship>,
    pub birth_date: Option<NaiveDate>,
    pub cpf: Option<String>,
    pub nis: Option<String>,
    pub phone: Option<String>,
    pub occupation: Option<String>,
    pub monthly_income: Option<Decimal>,
    pub is_legal_guardian: Option<bool>,
    pub lives_in_household: Option<bool>,
    pub notes: Option<String>,
}

/// Normalized documents of a family member
struct MemberDocuments {
    cpf: Option<String>,
    nis: Option<String>,
}

fn check_member_fields(
    full_name: Option<&str>,
    cpf: Option<&str>,
    nis: Option<&str>,
    phone: Option<&str>,
    monthly_income: Option<Decimal>,
) -> AppResult<MemberDocuments> {
    if let Some(name) = full_name {
        shared::validate_person_name(name)
            .map_err(|msg| AppError::validation("full_name", msg, "Nome inválido"))?;
    }

    let cpf = shared::normalize_document(cpf);
    if let Some(cpf) = &cpf {
        shared::validate_cpf(cpf).map_err(|msg| AppError::validation("cpf", msg, "CPF inválido"))?;
    }

    let nis = shared::normalize_document(nis);
    if let Some(nis) = &nis {
        shared::validate_nis(nis).map_err(|msg| AppError::validation("nis", msg, "NIS inválido"))?;
    }

    if let Some(phone) = phone.filter(|p| !p.trim().is_empty()) {
        shared::validate_br_phone(phone)
            .map_err(|msg| AppError::validation("phone", msg, "Telefone inválido"))?;
    }

    if let Some(income) = monthly_income {
        shared::validate_non_negative_amount(income).map_err(|msg| {
            AppError::validation("monthly_income", msg, "A renda não pode ser negativa")
        })?;
    }

    Ok(MemberDocuments { cpf, nis })
}

impl FamilyService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn members(&self, case_id: Uuid) -> AppResult<Vec<FamilyMember>> {
        sqlx::query_as::<_, FamilyMemberRecord>(&format!(
            "SELECT {} FROM family_members WHERE case_id = $1 ORDER BY lives_in_household DESC, full_name",
            MEMBER_COLUMNS
        ))
        .bind(case_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(FamilyMember::try_from)
        .collect()
    }

    /// Members of a case with the household summary
    pub async fn get_family(&self, case_id: Uuid) -> AppResult<FamilyComposition> {
        case_snapshot(&self.db, case_id).await?;

        let members = self.members(case_id).await?;
        let entries: Vec<HouseholdIncomeEntry> = members
            .iter()
            .map(|m| HouseholdIncomeEntry {
                lives_in_household: m.lives_in_household,
                monthly_income: m.monthly_income,
            })
            .collect();

        Ok(FamilyComposition {
            household: household_summary(&entries),
            members,
        })
    }

    /// Household summary only
    pub async fn household_summary(&self, case_id: Uuid) -> AppResult<HouseholdSummary> {
        let entries = sqlx::query_as::<_, (bool, Option<Decimal>)>(
            "SELECT lives_in_household, monthly_income FROM family_members WHERE case_id = $1",
        )
        .bind(case_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|(lives_in_household, monthly_income)| HouseholdIncomeEntry {
            lives_in_household,
            monthly_income,
        })
        .collect::<Vec<_>>();

        Ok(household_summary(&entries))
    }

    pub async fn add_member(
        &self,
        actor: &AuthUser,
        case_id: Uuid,
        input: CreateFamilyMemberInput,
    ) -> AppResult<FamilyMember> {
        let docs = check_member_fields(
            Some(&input.full_name),
            input.cpf.as_deref(),
            input.nis.as_deref(),
            input.phone.as_deref(),
            input.monthly_income,
        )?;

        let mut tx = self.db.begin().await?;

        case_snapshot(&mut *tx, case_id).await?;

        let record = sqlx::query_as::<_, FamilyMemberRecord>(&format!(
            r#"
            INSERT INTO family_members (
                case_id, full_name, relationship, birth_date, cpf, nis, phone, occupation,
                monthly_income, is_legal_guardian, lives_in_household, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        ))
        .bind(case_id)
        .bind(input.full_name.trim())
        .bind(input.relationship.as_str())
        .bind(input.birth_date)
        .bind(&docs.cpf)
        .bind(&docs.nis)
        .bind(&input.phone)
        .bind(&input.occupation)
        .bind(input.monthly_income)
        .bind(input.is_legal_guardian)
        .bind(input.lives_in_household)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Create, AuditEntity::FamilyMember, record.id)
                .with_details(serde_json::json!({ "case_id": case_id })),
        )
        .await?;

        tx.commit().await?;

        FamilyMember::try_from(record)
    }

    pub async fn update_member(
        &self,
        actor: &AuthUser,
        member_id: Uuid,
        input: UpdateFamilyMemberInput,
    ) -> AppResult<FamilyMember> {
        let docs = check_member_fields(
            input.full_name.as_deref(),
            input.cpf.as_deref(),
            input.nis.as_deref(),
            input.phone.as_deref(),
            input.monthly_income,
        )?;

        let mut tx = self.db.begin().await?;

        let record = sqlx::query_as::<_, FamilyMemberRecord>(&format!(
            r#"
            UPDATE family_members SET
                full_name = COALESCE($2, full_name),
                relationship = COALESCE($3, relationship),
                birth_date = COALESCE($4, birth_date),
                cpf = COALESCE($5, cpf),
                nis = COALESCE($6, nis),
                phone = COALESCE($7, phone),
                occupation = COALESCE($8, occupation),
                monthly_income = COALESCE($9, monthly_income),
                is_legal_guardian = COALESCE($10, is_legal_guardian),
                lives_in_household = COALESCE($11, lives_in_household),
                notes = COALESCE($12, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        ))
        .bind(member_id)
        .bind(input.full_name.as_deref().map(str::trim))
        .bind(input.relationship.map(|r| r.as_str()))
        .bind(input.birth_date)
        .bind(&docs.cpf)
        .bind(&docs.nis)
        .bind(&input.phone)
        .bind(&input.occupation)
        .bind(input.monthly_income)
        .bind(input.is_legal_guardian)
        .bind(input.lives_in_household)
        .bind(&input.notes)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Family member".to_string()))?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Update, AuditEntity::FamilyMember, member_id)
                .with_details(serde_json::json!({ "case_id": record.case_id })),
        )
        .await?;

        tx.commit().await?;

        FamilyMember::try_from(record)
    }

    pub async fn delete_member(&self, actor: &AuthUser, member_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let case_id = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM family_members WHERE id = $1 RETURNING case_id",
        )
        .bind(member_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Family member".to_string()))?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Delete, AuditEntity::FamilyMember, member_id)
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

    #[test]
    fn negative_income_is_rejected() {
        let result = check_member_fields(None, None, None, None, Some(Decimal::new(-1, 0)));
        assert!(matches!(result, Err(AppError::Validation { field, .. }) if field == "monthly_income"));
    }

    #[test]
    fn documents_are_normalized() {
        let docs = check_member_fields(
            Some("João"),
            Some("111.444.777-35"),
            Some("120.30456.78-2"),
            None,
            Some(Decimal::new(141200, 2)),
        )
        .unwrap();
        assert_eq!(docs.cpf.as_deref(), Some("11144477735"));
        assert_eq!(docs.nis.as_deref(), Some("12030456782"));
    }

    #[test]
    fn members_live_in_household_by_default() {
        let input: CreateFamilyMemberInput =
            serde_json::from_str(r#"{"full_name":"Ana","relationship":"mother"}"#).unwrap();
        assert!(input.lives_in_household);
        assert!(!input.is_legal_guardian);
    }
}
