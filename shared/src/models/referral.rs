//! Referral models for the protection network

text_enum! {
    /// Service a case is referred to
    pub enum DestinationType: "destination type" {
        Cras => "cras",
        Health => "health",
        Education => "education",
        ConselhoTutelar => "conselho_tutelar",
        Judiciary => "judiciary",
        PublicDefender => "public_defender",
        PublicProsecutor => "public_prosecutor",
        Police => "police",
        Housing => "housing",
        Employment => "employment",
        Other => "other",
    }
}

text_enum! {
    /// Lifecycle of a referral
    pub enum ReferralStatus: "referral status" {
        Pending => "pending",
        Responded => "responded",
        Refused => "refused",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl ReferralStatus {
    pub fn allowed_transitions(&self) -> &'static [ReferralStatus] {
        match self {
            ReferralStatus::Pending => &[
                ReferralStatus::Responded,
                ReferralStatus::Refused,
                ReferralStatus::Cancelled,
            ],
            ReferralStatus::Responded => &[ReferralStatus::Completed, ReferralStatus::Cancelled],
            ReferralStatus::Refused | ReferralStatus::Completed | ReferralStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, to: ReferralStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Whether entering this status from pending records a response date
    pub fn records_response(&self) -> bool {
        matches!(self, ReferralStatus::Responded | ReferralStatus::Refused)
    }
}
