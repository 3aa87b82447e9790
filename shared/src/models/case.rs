//! Case models and the intake-to-discharge workflow

use chrono::NaiveDate;

text_enum! {
    /// Stage of a case in the CREAS workflow
    pub enum CaseStatus: "case status" {
        /// Received and registered, awaiting technical assessment
        Intake => "intake",
        /// Under PAEFI follow-up
        Paefi => "paefi",
        Discharged => "discharged",
    }
}

text_enum! {
    /// Rights violation that brought the person to the service
    pub enum ViolationType: "violation type" {
        Physical => "physical",
        Psychological => "psychological",
        Sexual => "sexual",
        Neglect => "neglect",
        Abandonment => "abandonment",
        Financial => "financial",
        Discrimination => "discrimination",
        HumanTrafficking => "human_trafficking",
        ChildLabor => "child_labor",
        Other => "other",
    }
}

text_enum! {
    /// Why a case left follow-up
    pub enum DischargeReason: "discharge reason" {
        ObjectivesAchieved => "objectives_achieved",
        MovedAway => "moved_away",
        ReferredElsewhere => "referred_elsewhere",
        RefusedService => "refused_service",
        LostContact => "lost_contact",
        Death => "death",
        Other => "other",
    }
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaseTransitionError {
    #[error("case cannot move from {from} to {to}")]
    NotAllowed { from: CaseStatus, to: CaseStatus },

    #[error("a discharge reason is required")]
    MissingDischargeReason,

    #[error("a responsible technician must be assigned before PAEFI follow-up")]
    MissingTechnician,

    #[error("transition date cannot precede the intake date")]
    BeforeIntake,

    #[error("transition date cannot be in the future")]
    FutureDate,
}

impl CaseStatus {
    /// Statuses reachable from this one
    pub fn allowed_transitions(&self) -> &'static [CaseStatus] {
        match self {
            CaseStatus::Intake => &[CaseStatus::Paefi, CaseStatus::Discharged],
            CaseStatus::Paefi => &[CaseStatus::Discharged],
            CaseStatus::Discharged => &[CaseStatus::Intake],
        }
    }

    pub fn can_transition_to(&self, to: CaseStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Active cases are the ones still served by the team
    pub fn is_active(&self) -> bool {
        !matches!(self, CaseStatus::Discharged)
    }
}

/// Everything needed to decide whether a status change is acceptable
#[derive(Debug, Clone)]
pub struct CaseTransition {
    pub from: CaseStatus,
    pub to: CaseStatus,
    pub reason: Option<DischargeReason>,
    pub has_technician: bool,
    pub intake_date: NaiveDate,
    pub effective_date: NaiveDate,
    pub today: NaiveDate,
}

impl CaseTransition {
    pub fn validate(&self) -> Result<(), CaseTransitionError> {
        if !self.from.can_transition_to(self.to) {
            return Err(CaseTransitionError::NotAllowed {
                from: self.from,
                to: self.to,
            });
        }
        if self.effective_date > self.today {
            return Err(CaseTransitionError::FutureDate);
        }
        if self.effective_date < self.intake_date {
            return Err(CaseTransitionError::BeforeIntake);
        }
        match self.to {
            CaseStatus::Discharged if self.reason.is_none() => {
                Err(CaseTransitionError::MissingDischargeReason)
            }
            CaseStatus::Paefi if !self.has_technician => Err(CaseTransitionError::MissingTechnician),
            _ => Ok(()),
        }
    }
}

/// Generate a case code (e.g., "CREAS-2026-00042")
pub fn generate_case_code(year: i32, sequence: i32) -> String {
    format!("CREAS-{}-{:05}", year, sequence)
}

/// Age in whole years at `on`
pub fn age_on(birth_date: NaiveDate, on: NaiveDate) -> Option<u32> {
    on.years_since(birth_date)
}
