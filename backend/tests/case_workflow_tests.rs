//! Case workflow tests
//!
//! Property-based and unit tests for:
//! - Status transitions (intake, PAEFI follow-up, discharge, reopening)
//! - Case codes and age calculation
//! - Household income summaries

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    age_on, generate_case_code, household_summary, CaseStatus, CaseTransition, CaseTransitionError,
    DischargeReason, HouseholdIncomeEntry,
};

// ============================================================================
// Property Test Strategies
// ============================================================================

fn status_strategy() -> impl Strategy<Value = CaseStatus> {
    prop::sample::select(CaseStatus::ALL.to_vec())
}

fn reason_strategy() -> impl Strategy<Value = Option<DischargeReason>> {
    prop::option::of(prop::sample::select(DischargeReason::ALL.to_vec()))
}

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..3650).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2016, 1, 1).unwrap() + Duration::days(offset)
    })
}

/// Monthly income in cents, up to R$ 20.000,00
fn income_strategy() -> impl Strategy<Value = Option<Decimal>> {
    prop::option::of((0i64..2_000_000).prop_map(|cents| Decimal::new(cents, 2)))
}

fn member_strategy() -> impl Strategy<Value = HouseholdIncomeEntry> {
    (any::<bool>(), income_strategy()).prop_map(|(lives_in_household, monthly_income)| {
        HouseholdIncomeEntry {
            lives_in_household,
            monthly_income,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A transition outside the workflow graph is always refused first
    #[test]
    fn test_disallowed_transitions_rejected(
        from in status_strategy(),
        to in status_strategy(),
        reason in reason_strategy(),
        has_technician in any::<bool>(),
        intake in date_strategy(),
    ) {
        prop_assume!(!from.can_transition_to(to));
        let transition = CaseTransition {
            from,
            to,
            reason,
            has_technician,
            intake_date: intake,
            effective_date: intake,
            today: intake,
        };
        prop_assert_eq!(
            transition.validate(),
            Err(CaseTransitionError::NotAllowed { from, to })
        );
    }

    #[test]
    fn test_discharge_requires_reason(
        from in prop::sample::select(vec![CaseStatus::Intake, CaseStatus::Paefi]),
        intake in date_strategy(),
        days_later in 0i64..365,
    ) {
        let effective = intake + Duration::days(days_later);
        let mut transition = CaseTransition {
            from,
            to: CaseStatus::Discharged,
            reason: None,
            has_technician: true,
            intake_date: intake,
            effective_date: effective,
            today: effective,
        };
        prop_assert_eq!(transition.validate(), Err(CaseTransitionError::MissingDischargeReason));

        transition.reason = Some(DischargeReason::ObjectivesAchieved);
        prop_assert!(transition.validate().is_ok());
    }

    #[test]
    fn test_future_dates_rejected(
        from in status_strategy(),
        today in date_strategy(),
        ahead in 1i64..60,
    ) {
        let Some(to) = from.allowed_transitions().first().copied() else {
            return Ok(());
        };
        let transition = CaseTransition {
            from,
            to,
            reason: Some(DischargeReason::MovedAway),
            has_technician: true,
            intake_date: today - Duration::days(30),
            effective_date: today + Duration::days(ahead),
            today,
        };
        prop_assert_eq!(transition.validate(), Err(CaseTransitionError::FutureDate));
    }

    #[test]
    fn test_case_code_format(year in 2000i32..2100, sequence in 1i32..100_000) {
        let code = generate_case_code(year, sequence);
        prop_assert_eq!(code.len(), "CREAS-2026-00001".len());
        let expected_prefix = format!("CREAS-{}-", year);
        prop_assert!(code.starts_with(&expected_prefix));
        let suffix: i32 = code.rsplit('-').next().unwrap().parse().unwrap();
        prop_assert_eq!(suffix, sequence);
    }

    #[test]
    fn test_household_counts_subject_and_residents(
        members in prop::collection::vec(member_strategy(), 0..12),
    ) {
        let summary = household_summary(&members);

        let residents: Vec<_> = members.iter().filter(|m| m.lives_in_household).collect();
        let expected_total: Decimal = residents
            .iter()
            .map(|m| m.monthly_income.unwrap_or(Decimal::ZERO))
            .sum();

        prop_assert_eq!(summary.household_size as usize, residents.len() + 1);
        prop_assert_eq!(summary.total_income, expected_total);

        let expected_per_capita =
            (expected_total / Decimal::from(summary.household_size)).round_dp(2);
        prop_assert_eq!(summary.per_capita_income, expected_per_capita);
        prop_assert!(summary.per_capita_income <= summary.total_income);
    }

    #[test]
    fn test_age_never_exceeds_elapsed_years(birth in date_strategy(), years in 0i64..90) {
        let on = birth + Duration::days(years * 365);
        let age = age_on(birth, on).unwrap();
        prop_assert!(i64::from(age) <= years);
    }
}

#[cfg(test)]
mod workflow_tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn transition(from: CaseStatus, to: CaseStatus) -> CaseTransition {
        CaseTransition {
            from,
            to,
            reason: None,
            has_technician: false,
            intake_date: date(2026, 1, 10),
            effective_date: date(2026, 2, 1),
            today: date(2026, 3, 1),
        }
    }

    #[test]
    fn test_paefi_requires_technician() {
        let mut t = transition(CaseStatus::Intake, CaseStatus::Paefi);
        assert_eq!(t.validate(), Err(CaseTransitionError::MissingTechnician));

        t.has_technician = true;
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_date_before_intake_rejected() {
        let mut t = transition(CaseStatus::Intake, CaseStatus::Paefi);
        t.has_technician = true;
        t.effective_date = date(2026, 1, 9);
        assert_eq!(t.validate(), Err(CaseTransitionError::BeforeIntake));
    }

    #[test]
    fn test_reopening_before_intake_rejected() {
        let mut t = transition(CaseStatus::Discharged, CaseStatus::Intake);
        t.effective_date = date(2025, 12, 1);
        assert_eq!(t.validate(), Err(CaseTransitionError::BeforeIntake));

        t.effective_date = date(2026, 2, 20);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_paefi_cannot_return_to_intake() {
        assert!(!CaseStatus::Paefi.can_transition_to(CaseStatus::Intake));
        assert!(!CaseStatus::Discharged.can_transition_to(CaseStatus::Paefi));
        assert!(CaseStatus::Discharged.can_transition_to(CaseStatus::Intake));
    }

    #[test]
    fn test_only_discharged_is_inactive() {
        assert!(CaseStatus::Intake.is_active());
        assert!(CaseStatus::Paefi.is_active());
        assert!(!CaseStatus::Discharged.is_active());
    }

    #[test]
    fn test_age_on_birthday() {
        let birth = date(2010, 6, 15);
        assert_eq!(age_on(birth, date(2024, 6, 14)), Some(13));
        assert_eq!(age_on(birth, date(2024, 6, 15)), Some(14));
        assert_eq!(age_on(birth, date(2009, 1, 1)), None);
    }

    #[test]
    fn test_household_without_members() {
        let summary = household_summary(&[]);
        assert_eq!(summary.household_size, 1);
        assert_eq!(summary.total_income, Decimal::ZERO);
        assert_eq!(summary.per_capita_income, Decimal::ZERO);
    }
}
