//! Monthly statistics and case exports

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::{AuditAction, AuditEntity, CaseFilter, DischargeReason, EvolutionKind};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{self, NewAuditEntry};
use crate::services::case::{Case, CaseService};
use crate::services::dashboard::month_bounds;

/// Report service
#[derive(Clone)]
pub struct ReportService {
    db: PgPool,
}

/// Month selector
#[derive(Debug, Deserialize)]
pub struct MonthlyReportQuery {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Serialize)]
pub struct DischargeReasonCount {
    pub reason: DischargeReason,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct EvolutionKindCount {
    pub kind: EvolutionKind,
    pub count: i64,
}

/// Monthly activity of the unit
#[derive(Debug, Serialize)]
pub struct MonthlyReport {
    pub year: i32,
    pub month: u32,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub intakes: i64,
    pub paefi_inclusions: i64,
    pub discharges: i64,
    pub discharges_by_reason: Vec<DischargeReasonCount>,
    pub evolutions: i64,
    pub evolutions_by_kind: Vec<EvolutionKindCount>,
    pub referrals_sent: i64,
    pub appointments_completed: i64,
    pub appointments_missed: i64,
}

/// One CSV line per case
#[derive(Debug, Serialize)]
pub struct CaseExportRow {
    pub code: String,
    pub full_name: String,
    pub social_name: String,
    pub birth_date: String,
    pub age: String,
    pub cpf: String,
    pub nis: String,
    pub neighborhood: String,
    pub violation_types: String,
    pub status: String,
    pub responsible_technician: String,
    pub intake_date: NaiveDate,
    pub paefi_started_on: String,
    pub discharged_on: String,
    pub discharge_reason: String,
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl From<&Case> for CaseExportRow {
    fn from(c: &Case) -> Self {
        CaseExportRow {
            code: c.code.clone(),
            full_name: c.full_name.clone(),
            social_name: c.social_name.clone().unwrap_or_default(),
            birth_date: opt(c.birth_date),
            age: opt(c.age),
            cpf: opt(c.cpf.as_deref().and_then(shared::format_cpf)),
            nis: c.nis.clone().unwrap_or_default(),
            neighborhood: c.neighborhood.clone().unwrap_or_default(),
            violation_types: c
                .violation_types
                .iter()
                .map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(";"),
            status: c.status.to_string(),
            responsible_technician: c.responsible_technician_name.clone().unwrap_or_default(),
            intake_date: c.intake_date,
            paefi_started_on: opt(c.paefi_started_on),
            discharged_on: opt(c.discharged_on),
            discharge_reason: opt(c.discharge_reason),
        }
    }
}

/// Serialize rows as CSV with a header line
pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in data {
        wtr.serialize(record)
            .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
}

/// Parse `(text, count)` rows into typed counts, skipping unknown names
fn typed_counts<T: std::str::FromStr>(rows: Vec<(String, i64)>) -> Vec<(T, i64)> {
    rows.into_iter()
        .filter_map(|(name, count)| name.parse().ok().map(|v| (v, count)))
        .collect()
}

impl ReportService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn monthly(&self, query: &MonthlyReportQuery) -> AppResult<MonthlyReport> {
        let (start, end) = month_bounds(query.year, query.month)
            .filter(|_| (2000..=2100).contains(&query.year))
            .ok_or_else(|| {
                AppError::validation("month", "Invalid year or month", "Ano ou mês inválido")
            })?;

        let (intakes, paefi_inclusions, discharges) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE intake_date >= $1 AND intake_date < $2),
                COUNT(*) FILTER (WHERE paefi_started_on >= $1 AND paefi_started_on < $2),
                COUNT(*) FILTER (WHERE discharged_on >= $1 AND discharged_on < $2)
            FROM cases
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.db)
        .await?;

        let discharge_rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT discharge_reason, COUNT(*)
            FROM cases
            WHERE discharged_on >= $1 AND discharged_on < $2 AND discharge_reason IS NOT NULL
            GROUP BY discharge_reason
            ORDER BY COUNT(*) DESC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;

        let evolution_rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT kind, COUNT(*)
            FROM evolutions
            WHERE occurred_on >= $1 AND occurred_on < $2
            GROUP BY kind
            ORDER BY COUNT(*) DESC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;

        let (referrals_sent, appointments_completed, appointments_missed) =
            sqlx::query_as::<_, (i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM referrals WHERE sent_on >= $1 AND sent_on < $2),
                    (SELECT COUNT(*) FROM appointments
                     WHERE status = 'completed' AND scheduled_at >= $1 AND scheduled_at < $2),
                    (SELECT COUNT(*) FROM appointments
                     WHERE status = 'missed' AND scheduled_at >= $1 AND scheduled_at < $2)
                "#,
            )
            .bind(start)
            .bind(end)
            .fetch_one(&self.db)
            .await?;

        let evolutions_by_kind: Vec<EvolutionKindCount> = typed_counts(evolution_rows)
            .into_iter()
            .map(|(kind, count)| EvolutionKindCount { kind, count })
            .collect();

        Ok(MonthlyReport {
            year: query.year,
            month: query.month,
            period_start: start,
            period_end: end.pred_opt().unwrap_or(end),
            intakes,
            paefi_inclusions,
            discharges,
            discharges_by_reason: typed_counts(discharge_rows)
                .into_iter()
                .map(|(reason, count)| DischargeReasonCount { reason, count })
                .collect(),
            evolutions: evolutions_by_kind.iter().map(|e| e.count).sum(),
            evolutions_by_kind,
            referrals_sent,
            appointments_completed,
            appointments_missed,
        })
    }

    /// CSV of the cases matching a filter; the export itself is audited
    pub async fn export_cases_csv(&self, viewer: &AuthUser, filter: &CaseFilter) -> AppResult<String> {
        let cases = CaseService::new(self.db.clone())
            .export_cases(viewer, filter)
            .await?;
        let rows: Vec<CaseExportRow> = cases.iter().map(CaseExportRow::from).collect();
        let csv = export_to_csv(&rows)?;

        audit::record(
            &self.db,
            &NewAuditEntry {
                user_id: Some(viewer.user_id),
                user_name: Some(viewer.name.clone()),
                action: AuditAction::Export,
                entity_type: AuditEntity::Report,
                entity_id: None,
                details: serde_json::json!({
                    "report": "cases",
                    "rows": rows.len(),
                    "filters": filter,
                }),
            },
        )
        .await?;

        tracing::info!(user_id = %viewer.user_id, rows = rows.len(), "cases exported");
        Ok(csv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::{CaseStatus, ViolationType};
    use uuid::Uuid;

    fn sample_case() -> Case {
        Case {
            id: Uuid::new_v4(),
            code: "CREAS-2026-00001".to_string(),
            full_name: "Maria, da Silva".to_string(),
            social_name: None,
            birth_date: NaiveDate::from_ymd_opt(1990, 4, 2),
            age: Some(36),
            gender: None,
            cpf: Some("52998224725".to_string()),
            nis: None,
            mother_name: None,
            phone: None,
            address: None,
            neighborhood: Some("Centro".to_string()),
            violation_types: vec![ViolationType::Physical, ViolationType::Neglect],
            referral_source: None,
            responsible_technician_id: None,
            responsible_technician_name: None,
            status: CaseStatus::Paefi,
            intake_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            paefi_started_on: NaiveDate::from_ymd_opt(2026, 1, 20),
            discharged_on: None,
            discharge_reason: None,
            discharge_notes: None,
            notes: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn csv_has_header_and_quoted_values() {
        let rows = vec![CaseExportRow::from(&sample_case())];
        let csv = export_to_csv(&rows).unwrap();
        let mut lines = csv.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("code,full_name,social_name"));

        let line = lines.next().unwrap();
        assert!(line.contains("\"Maria, da Silva\""));
        assert!(line.contains("529.982.247-25"));
        assert!(line.contains("physical;neglect"));
        assert!(line.contains("2026-01-20"));
    }

    #[test]
    fn typed_counts_skip_unknown_names() {
        let counts: Vec<(EvolutionKind, i64)> = typed_counts(vec![
            ("home_visit".to_string(), 3),
            ("legacy".to_string(), 1),
        ]);
        assert_eq!(counts, vec![(EvolutionKind::HomeVisit, 3)]);
    }
}
