//! Case service: registration, listing and the intake-to-discharge workflow

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    age_on, generate_case_code, AuditAction, AuditEntity, CaseFilter, CaseStatus,
    CaseTransition, CaseTransitionError, DischargeReason, HouseholdSummary, PaginatedResponse,
    ViolationType,
};
use shared::{Action, Resource};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::action_plan::{ActionPlan, ActionPlanService};
use crate::services::appointment::{Appointment, AppointmentService};
use crate::services::audit::{self, NewAuditEntry};
use crate::services::family::FamilyService;

/// Export row cap for CSV reports
pub const MAX_EXPORT_ROWS: i64 = 10_000;

/// Case service
#[derive(Clone)]
pub struct CaseService {
    db: PgPool,
}

/// A case as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct Case {
    pub id: Uuid,
    pub code: String,
    pub full_name: String,
    pub social_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub cpf: Option<String>,
    pub nis: Option<String>,
    pub mother_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub neighborhood: Option<String>,
    pub violation_types: Vec<ViolationType>,
    pub referral_source: Option<String>,
    pub responsible_technician_id: Option<Uuid>,
    pub responsible_technician_name: Option<String>,
    pub status: CaseStatus,
    pub intake_date: NaiveDate,
    pub paefi_started_on: Option<NaiveDate>,
    pub discharged_on: Option<NaiveDate>,
    pub discharge_reason: Option<DischargeReason>,
    pub discharge_notes: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct CaseRecord {
    id: Uuid,
    code: String,
    full_name: String,
    social_name: Option<String>,
    birth_date: Option<NaiveDate>,
    gender: Option<String>,
    cpf: Option<String>,
    nis: Option<String>,
    mother_name: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    neighborhood: Option<String>,
    violation_types: Vec<String>,
    referral_source: Option<String>,
    responsible_technician_id: Option<Uuid>,
    responsible_technician_name: Option<String>,
    status: String,
    intake_date: NaiveDate,
    paefi_started_on: Option<NaiveDate>,
    discharged_on: Option<NaiveDate>,
    discharge_reason: Option<String>,
    discharge_notes: Option<String>,
    notes: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn stored<T: std::str::FromStr<Err = shared::ParseEnumError>>(value: &str) -> AppResult<T> {
    value
        .parse()
        .map_err(|e: shared::ParseEnumError| AppError::Internal(format!("Corrupt row: {}", e)))
}

impl CaseRecord {
    fn into_case(self, today: NaiveDate) -> AppResult<Case> {
        let violation_types = self
            .violation_types
            .iter()
            .map(|v| stored::<ViolationType>(v))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Case {
            age: self.birth_date.and_then(|b| age_on(b, today)),
            status: stored(&self.status)?,
            discharge_reason: self
                .discharge_reason
                .as_deref()
                .map(stored::<DischargeReason>)
                .transpose()?,
            violation_types,
            id: self.id,
            code: self.code,
            full_name: self.full_name,
            social_name: self.social_name,
            birth_date: self.birth_date,
            gender: self.gender,
            cpf: self.cpf,
            nis: self.nis,
            mother_name: self.mother_name,
            phone: self.phone,
            address: self.address,
            neighborhood: self.neighborhood,
            referral_source: self.referral_source,
            responsible_technician_id: self.responsible_technician_id,
            responsible_technician_name: self.responsible_technician_name,
            intake_date: self.intake_date,
            paefi_started_on: self.paefi_started_on,
            discharged_on: self.discharged_on,
            discharge_notes: self.discharge_notes,
            notes: self.notes,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const CASE_SELECT: &str = r#"
    SELECT c.id, c.code, c.full_name, c.social_name, c.birth_date, c.gender, c.cpf, c.nis,
           c.mother_name, c.phone, c.address, c.neighborhood, c.violation_types,
           c.referral_source, c.responsible_technician_id,
           t.name AS responsible_technician_name,
           c.status, c.intake_date, c.paefi_started_on, c.discharged_on, c.discharge_reason,
           c.discharge_notes, c.notes, c.created_by, c.created_at, c.updated_at
    FROM cases c
    LEFT JOIN users t ON t.id = c.responsible_technician_id"#;

/// Case with everything shown on its overview page
#[derive(Debug, Serialize)]
pub struct CaseDetail {
    #[serde(flatten)]
    pub case: Case,
    pub household: HouseholdSummary,
    pub action_plan: Option<ActionPlan>,
    pub evolution_count: i64,
    pub pending_referral_count: i64,
    pub next_appointment: Option<Appointment>,
}

/// The parts of a case other modules need to check their own rules
#[derive(Debug, Clone, Copy)]
pub struct CaseSnapshot {
    pub status: CaseStatus,
    pub intake_date: NaiveDate,
    pub responsible_technician_id: Option<Uuid>,
}

/// Input for registering a case
#[derive(Debug, Deserialize)]
pub struct CreateCaseInput {
    pub full_name: String,
    pub social_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub cpf: Option<String>,
    pub nis: Option<String>,
    pub mother_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub neighborhood: Option<String>,
    pub violation_types: Vec<ViolationType>,
    pub referral_source: Option<String>,
    pub responsible_technician_id: Option<Uuid>,
    pub intake_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Partial update of personal fields
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCaseInput {
    pub full_name: Option<String>,
    pub social_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub cpf: Option<String>,
    pub nis: Option<String>,
    pub mother_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub neighborhood: Option<String>,
    pub violation_types: Option<Vec<ViolationType>>,
    pub referral_source: Option<String>,
    pub notes: Option<String>,
}

/// Input for assigning or removing the responsible technician
#[derive(Debug, Deserialize)]
pub struct AssignTechnicianInput {
    pub technician_id: Option<Uuid>,
}

/// Input for a status change
#[derive(Debug, Deserialize)]
pub struct ChangeStatusInput {
    pub status: CaseStatus,
    pub reason: Option<DischargeReason>,
    pub notes: Option<String>,
    /// Effective date, defaults to today
    pub date: Option<NaiveDate>,
}

/// Personal fields shared by creation and update, already normalized
#[derive(Debug, Default, PartialEq)]
struct PersonFields {
    cpf: Option<String>,
    nis: Option<String>,
}

/// Validate and normalize personal data
fn check_person_fields(
    full_name: Option<&str>,
    birth_date: Option<NaiveDate>,
    cpf: Option<&str>,
    nis: Option<&str>,
    phone: Option<&str>,
    violation_types: Option<&[ViolationType]>,
    today: NaiveDate,
) -> AppResult<PersonFields> {
    if let Some(name) = full_name {
        shared::validate_person_name(name)
            .map_err(|msg| AppError::validation("full_name", msg, "Nome inválido"))?;
    }

    if birth_date.is_some_and(|b| b > today) {
        return Err(AppError::validation(
            "birth_date",
            "Birth date cannot be in the future",
            "A data de nascimento não pode estar no futuro",
        ));
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

    if violation_types.is_some_and(|v| v.is_empty()) {
        return Err(AppError::validation(
            "violation_types",
            "At least one violation type is required",
            "Informe ao menos um tipo de violação",
        ));
    }

    Ok(PersonFields { cpf, nis })
}

/// Escape LIKE wildcards and wrap in `%`
pub(crate) fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Append the WHERE clause for a case filter over `cases c`
pub(crate) fn push_case_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: &CaseFilter,
    viewer_id: Uuid,
) {
    qb.push(" WHERE 1 = 1");

    if let Some(status) = filter.status {
        qb.push(" AND c.status = ").push_bind(status.as_str());
    }

    if let Some(search) = filter.search_text() {
        let pattern = like_pattern(search);
        qb.push(" AND (c.full_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.social_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.code ILIKE ")
            .push_bind(pattern);

        let digits = shared::digits_only(search);
        if !digits.is_empty() {
            qb.push(" OR c.cpf LIKE ").push_bind(like_pattern(&digits));
        }
        qb.push(")");
    }

    if let Some(technician_id) = filter.technician_id {
        qb.push(" AND c.responsible_technician_id = ")
            .push_bind(technician_id);
    }
    if filter.mine == Some(true) {
        qb.push(" AND c.responsible_technician_id = ")
            .push_bind(viewer_id);
    }
    if filter.unassigned == Some(true) {
        qb.push(" AND c.responsible_technician_id IS NULL");
    }
    if let Some(violation) = filter.violation_type {
        qb.push(" AND ")
            .push_bind(violation.as_str())
            .push(" = ANY(c.violation_types)");
    }
    if let Some(neighborhood) = filter
        .neighborhood
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        qb.push(" AND c.neighborhood ILIKE ")
            .push_bind(like_pattern(neighborhood));
    }
    if let Some(from) = filter.intake_from {
        qb.push(" AND c.intake_date >= ").push_bind(from);
    }
    if let Some(to) = filter.intake_to {
        qb.push(" AND c.intake_date <= ").push_bind(to);
    }
}

fn check_filter(filter: &CaseFilter) -> AppResult<()> {
    filter.validate().map_err(|msg| {
        AppError::validation("filter", msg, "Filtro inválido: verifique as datas e a busca")
    })
}

fn transition_error(e: CaseTransitionError) -> AppError {
    match e {
        CaseTransitionError::NotAllowed { .. } | CaseTransitionError::MissingTechnician => {
            AppError::InvalidStateTransition(e.to_string())
        }
        CaseTransitionError::MissingDischargeReason => AppError::validation(
            "reason",
            "A discharge reason is required",
            "Informe o motivo do desligamento",
        ),
        CaseTransitionError::BeforeIntake => AppError::validation(
            "date",
            "Date cannot precede the intake date",
            "A data não pode ser anterior à data de acolhida",
        ),
        CaseTransitionError::FutureDate => AppError::validation(
            "date",
            "Date cannot be in the future",
            "A data não pode estar no futuro",
        ),
    }
}

/// Map a CPF uniqueness violation to a 409
fn map_unique_cpf(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.constraint() == Some("cases_cpf_key") => {
            AppError::DuplicateEntry("cpf".to_string())
        }
        _ => AppError::DatabaseError(e),
    }
}

/// Load a case as stored
pub async fn fetch_case<'e, E>(executor: E, case_id: Uuid) -> AppResult<Case>
where
    E: PgExecutor<'e>,
{
    let record = sqlx::query_as::<_, CaseRecord>(&format!("{} WHERE c.id = $1", CASE_SELECT))
        .bind(case_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Case".to_string()))?;

    record.into_case(Utc::now().date_naive())
}

/// Load the state of a case for workflow checks in other modules
pub async fn case_snapshot<'e, E>(executor: E, case_id: Uuid) -> AppResult<CaseSnapshot>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, (String, NaiveDate, Option<Uuid>)>(
        "SELECT status, intake_date, responsible_technician_id FROM cases WHERE id = $1",
    )
    .bind(case_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound("Case".to_string()))?;

    Ok(CaseSnapshot {
        status: stored(&row.0)?,
        intake_date: row.1,
        responsible_technician_id: row.2,
    })
}

impl CaseSnapshot {
    /// Fail with 422 when the case no longer accepts new records
    pub fn ensure_active(&self) -> AppResult<()> {
        if self.status.is_active() {
            Ok(())
        } else {
            Err(AppError::InvalidStateTransition(
                "Case is discharged; reopen it before adding records".to_string(),
            ))
        }
    }
}

/// Ensure a user can be made responsible for cases or appointments
pub async fn ensure_assignable<'e, E>(executor: E, user_id: Uuid) -> AppResult<()>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, (String, bool)>("SELECT role, is_active FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Technician".to_string()))?;

    let role: shared::UserRole = stored(&row.0)?;
    if !row.1 || !role.can_hold_cases() {
        return Err(AppError::validation(
            "technician_id",
            "User must be an active technician or coordinator",
            "O usuário deve ser um técnico ou coordenador ativo",
        ));
    }
    Ok(())
}

impl CaseService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List cases matching a filter
    pub async fn list_cases(
        &self,
        viewer: &AuthUser,
        filter: &CaseFilter,
    ) -> AppResult<PaginatedResponse<Case>> {
        check_filter(filter)?;
        let pagination = filter.pagination();

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM cases c");
        push_case_filters(&mut count_query, filter, viewer.user_id);
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.db)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new(CASE_SELECT);
        push_case_filters(&mut query, filter, viewer.user_id);
        query
            .push(" ORDER BY ")
            .push(filter.sort.unwrap_or_default().order_by())
            .push(" LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let today = Utc::now().date_naive();
        let cases = query
            .build_query_as::<CaseRecord>()
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(|r| r.into_case(today))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(
            cases,
            pagination,
            u64::try_from(total).unwrap_or(0),
        ))
    }

    /// Cases for export, capped at [`MAX_EXPORT_ROWS`]
    pub async fn export_cases(&self, viewer: &AuthUser, filter: &CaseFilter) -> AppResult<Vec<Case>> {
        check_filter(filter)?;

        let mut query = QueryBuilder::<Postgres>::new(CASE_SELECT);
        push_case_filters(&mut query, filter, viewer.user_id);
        query
            .push(" ORDER BY ")
            .push(filter.sort.unwrap_or_default().order_by())
            .push(" LIMIT ")
            .push_bind(MAX_EXPORT_ROWS);

        let today = Utc::now().date_naive();
        query
            .build_query_as::<CaseRecord>()
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(|r| r.into_case(today))
            .collect()
    }

    /// Case with household, plan and agenda overview
    pub async fn get_case_detail(&self, case_id: Uuid) -> AppResult<CaseDetail> {
        let case = fetch_case(&self.db, case_id).await?;

        let household = FamilyService::new(self.db.clone())
            .household_summary(case_id)
            .await?;
        let action_plan = ActionPlanService::new(self.db.clone())
            .find_for_case(case_id)
            .await?;
        let next_appointment = AppointmentService::new(self.db.clone())
            .next_for_case(case_id)
            .await?;

        let (evolution_count, pending_referral_count) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM evolutions WHERE case_id = $1),
                (SELECT COUNT(*) FROM referrals WHERE case_id = $1 AND status = 'pending')
            "#,
        )
        .bind(case_id)
        .fetch_one(&self.db)
        .await?;

        Ok(CaseDetail {
            case,
            household,
            action_plan,
            evolution_count,
            pending_referral_count,
            next_appointment,
        })
    }

    /// Register a new case
    pub async fn create_case(&self, actor: &AuthUser, input: CreateCaseInput) -> AppResult<Case> {
        let today = Utc::now().date_naive();
        let intake_date = input.intake_date.unwrap_or(today);

        if intake_date > today {
            return Err(AppError::validation(
                "intake_date",
                "Intake date cannot be in the future",
                "A data de acolhida não pode estar no futuro",
            ));
        }

        let person = check_person_fields(
            Some(&input.full_name),
            input.birth_date,
            input.cpf.as_deref(),
            input.nis.as_deref(),
            input.phone.as_deref(),
            Some(&input.violation_types),
            today,
        )?;

        let mut tx = self.db.begin().await?;

        if let Some(technician_id) = input.responsible_technician_id {
            ensure_assignable(&mut *tx, technician_id).await?;
        }

        let sequence = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO case_code_counters (year, last_value)
            VALUES ($1, 1)
            ON CONFLICT (year) DO UPDATE SET last_value = case_code_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(intake_date.year())
        .fetch_one(&mut *tx)
        .await?;

        let code = generate_case_code(intake_date.year(), sequence);
        let violation_types: Vec<&str> = input.violation_types.iter().map(|v| v.as_str()).collect();

        let case_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO cases (
                code, full_name, social_name, birth_date, gender, cpf, nis, mother_name,
                phone, address, neighborhood, violation_types, referral_source,
                responsible_technician_id, status, intake_date, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 'intake', $15, $16, $17)
            RETURNING id
            "#,
        )
        .bind(&code)
        .bind(input.full_name.trim())
        .bind(&input.social_name)
        .bind(input.birth_date)
        .bind(&input.gender)
        .bind(&person.cpf)
        .bind(&person.nis)
        .bind(&input.mother_name)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.neighborhood)
        .bind(&violation_types)
        .bind(&input.referral_source)
        .bind(input.responsible_technician_id)
        .bind(intake_date)
        .bind(&input.notes)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_cpf)?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Create, AuditEntity::Case, case_id)
                .with_details(serde_json::json!({ "code": code })),
        )
        .await?;

        let case = fetch_case(&mut *tx, case_id).await?;
        tx.commit().await?;

        tracing::info!(case_id = %case_id, code = %case.code, "case registered");
        Ok(case)
    }

    /// Update personal fields
    pub async fn update_case(
        &self,
        actor: &AuthUser,
        case_id: Uuid,
        input: UpdateCaseInput,
    ) -> AppResult<Case> {
        let today = Utc::now().date_naive();
        let person = check_person_fields(
            input.full_name.as_deref(),
            input.birth_date,
            input.cpf.as_deref(),
            input.nis.as_deref(),
            input.phone.as_deref(),
            input.violation_types.as_deref(),
            today,
        )?;

        let violation_types: Option<Vec<&str>> = input
            .violation_types
            .as_ref()
            .map(|v| v.iter().map(|t| t.as_str()).collect());

        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE cases SET
                full_name = COALESCE($2, full_name),
                social_name = COALESCE($3, social_name),
                birth_date = COALESCE($4, birth_date),
                gender = COALESCE($5, gender),
                cpf = COALESCE($6, cpf),
                nis = COALESCE($7, nis),
                mother_name = COALESCE($8, mother_name),
                phone = COALESCE($9, phone),
                address = COALESCE($10, address),
                neighborhood = COALESCE($11, neighborhood),
                violation_types = COALESCE($12, violation_types),
                referral_source = COALESCE($13, referral_source),
                notes = COALESCE($14, notes),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(case_id)
        .bind(input.full_name.as_deref().map(str::trim))
        .bind(&input.social_name)
        .bind(input.birth_date)
        .bind(&input.gender)
        .bind(&person.cpf)
        .bind(&person.nis)
        .bind(&input.mother_name)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.neighborhood)
        .bind(&violation_types)
        .bind(&input.referral_source)
        .bind(&input.notes)
        .execute(&mut *tx)
        .await
        .map_err(map_unique_cpf)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Case".to_string()));
        }

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Update, AuditEntity::Case, case_id),
        )
        .await?;

        let case = fetch_case(&mut *tx, case_id).await?;
        tx.commit().await?;

        Ok(case)
    }

    /// Assign or remove the responsible technician
    pub async fn assign_technician(
        &self,
        actor: &AuthUser,
        case_id: Uuid,
        technician_id: Option<Uuid>,
    ) -> AppResult<Case> {
        let mut tx = self.db.begin().await?;

        let snapshot = case_snapshot(&mut *tx, case_id).await?;

        match technician_id {
            Some(id) => ensure_assignable(&mut *tx, id).await?,
            None if snapshot.status == CaseStatus::Paefi => {
                return Err(AppError::validation(
                    "technician_id",
                    "Cases under PAEFI follow-up must keep a responsible technician",
                    "Casos em acompanhamento PAEFI devem ter um técnico de referência",
                ));
            }
            None => {}
        }

        sqlx::query(
            "UPDATE cases SET responsible_technician_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(case_id)
        .bind(technician_id)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Assign, AuditEntity::Case, case_id)
                .with_details(serde_json::json!({
                    "from": snapshot.responsible_technician_id,
                    "to": technician_id,
                })),
        )
        .await?;

        let case = fetch_case(&mut *tx, case_id).await?;
        tx.commit().await?;

        tracing::info!(case_id = %case_id, technician_id = ?technician_id, "technician assigned");
        Ok(case)
    }

    /// Move a case through the workflow
    pub async fn change_status(
        &self,
        actor: &AuthUser,
        case_id: Uuid,
        input: ChangeStatusInput,
    ) -> AppResult<Case> {
        if input.status == CaseStatus::Discharged {
            actor.require(Resource::Case, Action::Discharge)?;
        }

        let today = Utc::now().date_naive();
        let effective_date = input.date.unwrap_or(today);

        let mut tx = self.db.begin().await?;

        let snapshot = sqlx::query_as::<_, (String, NaiveDate, Option<Uuid>)>(
            "SELECT status, intake_date, responsible_technician_id FROM cases WHERE id = $1 FOR UPDATE",
        )
        .bind(case_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Case".to_string()))?;
        let from: CaseStatus = stored(&snapshot.0)?;

        CaseTransition {
            from,
            to: input.status,
            reason: input.reason,
            has_technician: snapshot.2.is_some(),
            intake_date: snapshot.1,
            effective_date,
            today,
        }
        .validate()
        .map_err(transition_error)?;

        match input.status {
            CaseStatus::Paefi => {
                sqlx::query(
                    "UPDATE cases SET status = 'paefi', paefi_started_on = $2, updated_at = NOW() WHERE id = $1",
                )
                .bind(case_id)
                .bind(effective_date)
                .execute(&mut *tx)
                .await?;
            }
            CaseStatus::Discharged => {
                sqlx::query(
                    r#"
                    UPDATE cases SET
                        status = 'discharged',
                        discharged_on = $2,
                        discharge_reason = $3,
                        discharge_notes = $4,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(case_id)
                .bind(effective_date)
                .bind(input.reason.map(|r| r.as_str()))
                .bind(&input.notes)
                .execute(&mut *tx)
                .await?;
            }
            CaseStatus::Intake => {
                sqlx::query(
                    r#"
                    UPDATE cases SET
                        status = 'intake',
                        intake_date = $2,
                        paefi_started_on = NULL,
                        discharged_on = NULL,
                        discharge_reason = NULL,
                        discharge_notes = NULL,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(case_id)
                .bind(effective_date)
                .execute(&mut *tx)
                .await?;
            }
        }

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::StatusChange, AuditEntity::Case, case_id)
                .with_details(serde_json::json!({
                    "from": from,
                    "to": input.status,
                    "reason": input.reason,
                    "date": effective_date,
                })),
        )
        .await?;

        let case = fetch_case(&mut *tx, case_id).await?;
        tx.commit().await?;

        tracing::info!(case_id = %case_id, from = %from, to = %input.status, "case status changed");
        Ok(case)
    }

    /// Delete a case that has no recorded evolutions
    pub async fn delete_case(&self, actor: &AuthUser, case_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let code = sqlx::query_scalar::<_, String>("SELECT code FROM cases WHERE id = $1 FOR UPDATE")
            .bind(case_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Case".to_string()))?;

        let evolutions = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM evolutions WHERE case_id = $1",
        )
        .bind(case_id)
        .fetch_one(&mut *tx)
        .await?;

        if evolutions > 0 {
            return Err(AppError::validation(
                "case",
                "Cases with recorded evolutions cannot be deleted",
                "Casos com evoluções registradas não podem ser excluídos",
            ));
        }

        sqlx::query("DELETE FROM cases WHERE id = $1")
            .bind(case_id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut *tx,
            &NewAuditEntry::by(actor, AuditAction::Delete, AuditEntity::Case, case_id)
                .with_details(serde_json::json!({ "code": code })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(case_id = %case_id, %code, "case deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::CaseSort;

    fn sql_for(filter: &CaseFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM cases c");
        push_case_filters(&mut qb, filter, Uuid::new_v4());
        qb.sql().to_string()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ana"), "%ana%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(
            sql_for(&CaseFilter::default()),
            "SELECT COUNT(*) FROM cases c WHERE 1 = 1"
        );
    }

    #[test]
    fn search_with_digits_also_matches_cpf() {
        let filter = CaseFilter {
            search: Some("529.982".to_string()),
            ..Default::default()
        };
        let sql = sql_for(&filter);
        assert!(sql.contains("c.full_name ILIKE $1"));
        assert!(sql.contains("c.code ILIKE $3"));
        assert!(sql.contains("c.cpf LIKE $4"));

        let by_name = CaseFilter {
            search: Some("Maria".to_string()),
            ..Default::default()
        };
        assert!(!sql_for(&by_name).contains("c.cpf"));
    }

    #[test]
    fn flags_and_ranges() {
        let filter = CaseFilter {
            status: Some(CaseStatus::Paefi),
            mine: Some(true),
            unassigned: Some(false),
            violation_type: Some(ViolationType::Neglect),
            intake_from: NaiveDate::from_ymd_opt(2026, 1, 1),
            intake_to: NaiveDate::from_ymd_opt(2026, 3, 31),
            sort: Some(CaseSort::NameAsc),
            ..Default::default()
        };
        let sql = sql_for(&filter);
        assert!(sql.contains("c.status = $1"));
        assert!(sql.contains("c.responsible_technician_id = $2"));
        assert!(!sql.contains("IS NULL"));
        assert!(sql.contains("$3 = ANY(c.violation_types)"));
        assert!(sql.contains("c.intake_date >= $4"));
        assert!(sql.contains("c.intake_date <= $5"));
    }

    #[test]
    fn person_fields_are_normalized() {
        let fields = check_person_fields(
            Some("Maria da Silva"),
            None,
            Some("529.982.247-25"),
            Some(" "),
            Some("(11) 98765-4321"),
            Some(&[ViolationType::Physical]),
            today(),
        )
        .unwrap();
        assert_eq!(fields.cpf.as_deref(), Some("52998224725"));
        assert_eq!(fields.nis, None);
    }

    #[test]
    fn person_fields_reject_bad_input() {
        let bad_cpf = check_person_fields(None, None, Some("111.111.111-11"), None, None, None, today());
        assert!(matches!(bad_cpf, Err(AppError::Validation { field, .. }) if field == "cpf"));

        let future_birth = check_person_fields(
            None,
            NaiveDate::from_ymd_opt(2027, 1, 1),
            None,
            None,
            None,
            None,
            today(),
        );
        assert!(future_birth.is_err());

        let no_violations =
            check_person_fields(Some("Ana"), None, None, None, None, Some(&[]), today());
        assert!(
            matches!(no_violations, Err(AppError::Validation { field, .. }) if field == "violation_types")
        );
    }

    #[test]
    fn transition_errors_map_to_statuses() {
        use axum::http::StatusCode;

        let not_allowed = transition_error(CaseTransitionError::NotAllowed {
            from: CaseStatus::Paefi,
            to: CaseStatus::Intake,
        });
        assert_eq!(not_allowed.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            transition_error(CaseTransitionError::MissingDischargeReason).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn discharged_snapshot_is_not_active() {
        let snapshot = CaseSnapshot {
            status: CaseStatus::Discharged,
            intake_date: today(),
            responsible_technician_id: None,
        };
        assert!(matches!(
            snapshot.ensure_active(),
            Err(AppError::InvalidStateTransition(_))
        ));
    }
}
