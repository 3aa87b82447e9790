//! PAF (individualized action plan) rules

use chrono::NaiveDate;

use super::CaseStatus;

/// Reasons an action plan cannot be created or saved
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionPlanError {
    #[error("an action plan can only be opened for cases under PAEFI follow-up")]
    CaseNotInFollowUp,

    #[error("the review date cannot be in the past")]
    ReviewInPast,

    #[error("objectives and interventions are required")]
    MissingContent,
}

/// Check a new action plan against the case state
pub fn validate_new_action_plan(
    case_status: CaseStatus,
    objectives: &str,
    interventions: &str,
    review_on: NaiveDate,
    today: NaiveDate,
) -> Result<(), ActionPlanError> {
    if case_status != CaseStatus::Paefi {
        return Err(ActionPlanError::CaseNotInFollowUp);
    }
    if objectives.trim().is_empty() || interventions.trim().is_empty() {
        return Err(ActionPlanError::MissingContent);
    }
    if review_on < today {
        return Err(ActionPlanError::ReviewInPast);
    }
    Ok(())
}

/// Days until the plan review; negative when overdue
pub fn days_until_review(review_on: NaiveDate, today: NaiveDate) -> i64 {
    (review_on - today).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    #[test]
    fn plan_requires_paefi() {
        assert_eq!(
            validate_new_action_plan(CaseStatus::Intake, "a", "b", date(6, 1), date(5, 1)),
            Err(ActionPlanError::CaseNotInFollowUp)
        );
        assert!(validate_new_action_plan(CaseStatus::Paefi, "a", "b", date(6, 1), date(5, 1)).is_ok());
    }

    #[test]
    fn plan_requires_content_and_future_review() {
        assert_eq!(
            validate_new_action_plan(CaseStatus::Paefi, " ", "b", date(6, 1), date(5, 1)),
            Err(ActionPlanError::MissingContent)
        );
        assert_eq!(
            validate_new_action_plan(CaseStatus::Paefi, "a", "b", date(4, 30), date(5, 1)),
            Err(ActionPlanError::ReviewInPast)
        );
    }

    #[test]
    fn review_countdown() {
        assert_eq!(days_until_review(date(5, 8), date(5, 1)), 7);
        assert_eq!(days_until_review(date(4, 28), date(5, 1)), -3);
    }
}
