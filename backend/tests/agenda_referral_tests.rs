//! Agenda, referral and listing tests
//!
//! Property-based and unit tests for:
//! - Appointment slot overlap and duration bounds
//! - Referral status workflow
//! - Pagination and case list filters

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use shared::{
    slots_overlap, validate_duration, AppointmentStatus, CaseFilter, Pagination, ReferralStatus,
    MAX_APPOINTMENT_MINUTES, MAX_PER_PAGE, MIN_APPOINTMENT_MINUTES,
};

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Start times on a working week, at five-minute steps
fn start_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..(7 * 24 * 12)).prop_map(|step| {
        Utc.with_ymd_and_hms(2026, 4, 13, 0, 0, 0).unwrap() + Duration::minutes(step * 5)
    })
}

fn duration_strategy() -> impl Strategy<Value = i32> {
    MIN_APPOINTMENT_MINUTES..=MAX_APPOINTMENT_MINUTES
}

fn referral_status_strategy() -> impl Strategy<Value = ReferralStatus> {
    prop::sample::select(ReferralStatus::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn test_overlap_is_symmetric(
        a in start_strategy(),
        a_len in duration_strategy(),
        b in start_strategy(),
        b_len in duration_strategy(),
    ) {
        prop_assert_eq!(slots_overlap(a, a_len, b, b_len), slots_overlap(b, b_len, a, a_len));
    }

    #[test]
    fn test_slot_overlaps_itself(start in start_strategy(), len in duration_strategy()) {
        prop_assert!(slots_overlap(start, len, start, len));
    }

    /// Back-to-back appointments share a boundary but do not conflict
    #[test]
    fn test_adjacent_slots_do_not_overlap(
        start in start_strategy(),
        first in duration_strategy(),
        second in duration_strategy(),
    ) {
        let next = start + Duration::minutes(i64::from(first));
        prop_assert!(!slots_overlap(start, first, next, second));
        prop_assert!(slots_overlap(start, first, next - Duration::minutes(1), second));
    }

    #[test]
    fn test_duration_bounds(minutes in -100i32..1000) {
        let in_bounds = (MIN_APPOINTMENT_MINUTES..=MAX_APPOINTMENT_MINUTES).contains(&minutes);
        prop_assert_eq!(validate_duration(minutes).is_ok(), in_bounds);
    }

    #[test]
    fn test_terminal_referrals_do_not_move(from in referral_status_strategy(), to in referral_status_strategy()) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
        prop_assert!(!from.can_transition_to(from));
    }

    #[test]
    fn test_pagination_clamped(page in prop::option::of(0u32..1000), per_page in prop::option::of(0u32..1000)) {
        let p = Pagination::from_query(page, per_page);
        prop_assert!(p.page >= 1);
        prop_assert!((1..=MAX_PER_PAGE).contains(&p.per_page));
        prop_assert_eq!(p.offset(), i64::from(p.page - 1) * i64::from(p.per_page));
    }
}

#[cfg(test)]
mod appointment_tests {
    use super::*;

    #[test]
    fn test_only_scheduled_appointments_change() {
        for to in [
            AppointmentStatus::Completed,
            AppointmentStatus::Missed,
            AppointmentStatus::Cancelled,
        ] {
            assert!(AppointmentStatus::Scheduled.can_transition_to(to));
            assert!(!to.can_transition_to(AppointmentStatus::Scheduled));
        }
        assert!(!AppointmentStatus::Completed.can_transition_to(AppointmentStatus::Cancelled));
    }
}

#[cfg(test)]
mod referral_tests {
    use super::*;

    #[test]
    fn test_referral_workflow() {
        assert!(ReferralStatus::Pending.can_transition_to(ReferralStatus::Responded));
        assert!(ReferralStatus::Responded.can_transition_to(ReferralStatus::Completed));
        assert!(!ReferralStatus::Pending.can_transition_to(ReferralStatus::Completed));
        assert!(ReferralStatus::Refused.is_terminal());
        assert!(!ReferralStatus::Pending.is_terminal());
    }

    #[test]
    fn test_response_date_recorded_on_answer() {
        assert!(ReferralStatus::Responded.records_response());
        assert!(ReferralStatus::Refused.records_response());
        assert!(!ReferralStatus::Cancelled.records_response());
        assert!(!ReferralStatus::Completed.records_response());
    }
}

#[cfg(test)]
mod case_filter_tests {
    use super::*;

    #[test]
    fn test_inverted_intake_range_rejected() {
        let filter = CaseFilter {
            intake_from: NaiveDate::from_ymd_opt(2026, 3, 1),
            intake_to: NaiveDate::from_ymd_opt(2026, 2, 1),
            ..Default::default()
        };
        assert!(filter.validate().is_err());
    }

    #[test]
    fn test_blank_search_ignored() {
        let filter = CaseFilter {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(filter.validate().is_ok());
        assert_eq!(filter.search_text(), None);
    }

    #[test]
    fn test_filter_from_saved_json() {
        let filter: CaseFilter = serde_json::from_str(
            r#"{"status":"paefi","violation_type":"neglect","mine":true,"per_page":500}"#,
        )
        .unwrap();
        assert!(filter.validate().is_ok());
        assert_eq!(filter.mine, Some(true));
        assert_eq!(filter.pagination().per_page, MAX_PER_PAGE);
    }
}
