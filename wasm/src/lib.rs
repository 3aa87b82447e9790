//! WebAssembly module for the CREAS Case Management Platform
//!
//! Provides client-side checks for:
//! - Brazilian documents (CPF, NIS) and phone numbers
//! - Case workflow transitions
//! - Age and household income summaries
//! - Offline form validation

use chrono::NaiveDate;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

#[wasm_bindgen(js_name = validateCpf)]
pub fn validate_cpf_js(cpf: &str) -> bool {
    validate_cpf(cpf).is_ok()
}

/// `000.000.000-00` mask, or an empty string when the input has not 11 digits
#[wasm_bindgen(js_name = formatCpf)]
pub fn format_cpf_js(cpf: &str) -> String {
    format_cpf(cpf).unwrap_or_default()
}

#[wasm_bindgen(js_name = validateNis)]
pub fn validate_nis_js(nis: &str) -> bool {
    validate_nis(nis).is_ok()
}

#[wasm_bindgen(js_name = validatePhone)]
pub fn validate_phone_js(phone: &str) -> bool {
    validate_br_phone(phone).is_ok()
}

fn parse_status(value: &str) -> Result<CaseStatus, JsValue> {
    value
        .parse::<CaseStatus>()
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Whether a case may move from one status to another
#[wasm_bindgen(js_name = canTransitionCase)]
pub fn can_transition_case(from: &str, to: &str) -> Result<bool, JsValue> {
    Ok(parse_status(from)?.can_transition_to(parse_status(to)?))
}

/// JSON array of statuses reachable from `from`
#[wasm_bindgen(js_name = allowedCaseTransitions)]
pub fn allowed_case_transitions(from: &str) -> Result<String, JsValue> {
    let targets: Vec<&str> = parse_status(from)?
        .allowed_transitions()
        .iter()
        .map(|s| s.as_str())
        .collect();
    serde_json::to_string(&targets).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Age in whole years on a reference date, both `YYYY-MM-DD`
#[wasm_bindgen(js_name = calculateAge)]
pub fn calculate_age(birth_date: &str, on: &str) -> Result<u32, JsValue> {
    let birth = parse_date(birth_date)?;
    let reference = parse_date(on)?;
    age_on(birth, reference)
        .ok_or_else(|| JsValue::from_str("Birth date is after the reference date"))
}

/// Household size and income from a JSON array of family members
#[wasm_bindgen(js_name = householdSummary)]
pub fn household_summary_js(members_json: &str) -> Result<String, JsValue> {
    let members: Vec<HouseholdIncomeEntry> = serde_json::from_str(members_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid members JSON: {}", e)))?;

    serde_json::to_string(&household_summary(&members))
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Days left until an action plan review, negative when overdue
#[wasm_bindgen(js_name = daysUntilReview)]
pub fn days_until_review_js(review_on: &str, today: &str) -> Result<i32, JsValue> {
    let days = days_until_review(parse_date(review_on)?, parse_date(today)?);
    i32::try_from(days).map_err(|_| JsValue::from_str("Date range too large"))
}

fn parse_date(value: &str) -> Result<NaiveDate, JsValue> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| JsValue::from_str(&format!("Invalid date: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_checks() {
        assert!(validate_cpf_js("529.982.247-25"));
        assert!(!validate_cpf_js("111.111.111-11"));
        assert_eq!(format_cpf_js("52998224725"), "529.982.247-25");
        assert_eq!(format_cpf_js("123"), "");
    }

    #[test]
    fn test_case_transitions() {
        assert_eq!(can_transition_case("intake", "paefi").ok(), Some(true));
        assert_eq!(can_transition_case("discharged", "paefi").ok(), Some(false));
        assert_eq!(
            allowed_case_transitions("discharged").ok().as_deref(),
            Some(r#"["intake"]"#)
        );
    }

    #[test]
    fn test_household_summary() {
        let json = r#"[
            {"lives_in_household": true, "monthly_income": "1000.00"},
            {"lives_in_household": false, "monthly_income": "5000.00"},
            {"lives_in_household": true, "monthly_income": null}
        ]"#;
        let summary: HouseholdSummary =
            serde_json::from_str(&household_summary_js(json).unwrap()).unwrap();
        assert_eq!(summary.household_size, 3);
        assert_eq!(summary.total_income.to_string(), "1000.00");
        assert_eq!(summary.per_capita_income.to_string(), "333.33");
    }

    #[test]
    fn test_calculate_age() {
        assert_eq!(calculate_age("2010-06-15", "2024-06-14").ok(), Some(13));
        assert_eq!(calculate_age("2010-06-15", "2024-06-15").ok(), Some(14));
    }

    #[test]
    fn test_days_until_review() {
        assert_eq!(days_until_review_js("2024-03-10", "2024-03-01").ok(), Some(9));
        assert_eq!(days_until_review_js("2024-02-28", "2024-03-01").ok(), Some(-2));
    }
}
