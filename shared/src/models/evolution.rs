//! Technical evolution models and field-level access rules

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserRole;

text_enum! {
    /// Kind of technical activity recorded in an evolution
    pub enum EvolutionKind: "evolution kind" {
        Attendance => "attendance",
        HomeVisit => "home_visit",
        GroupActivity => "group_activity",
        PhoneContact => "phone_contact",
        CaseDiscussion => "case_discussion",
        Report => "report",
        Other => "other",
    }
}

/// How much of an evolution a viewer may read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionVisibility {
    Full,
    /// Summary visible, technical notes removed
    SummaryOnly,
    /// Only date, kind and author are visible
    MetadataOnly,
}

/// Decide what a viewer may see of an evolution
pub fn evolution_visibility(
    viewer_role: UserRole,
    viewer_id: Uuid,
    author_id: Uuid,
    is_confidential: bool,
) -> EvolutionVisibility {
    match viewer_role {
        UserRole::Admin | UserRole::Coordinator => EvolutionVisibility::Full,
        UserRole::Technician => {
            if is_confidential && viewer_id != author_id {
                EvolutionVisibility::MetadataOnly
            } else {
                EvolutionVisibility::Full
            }
        }
        UserRole::Administrative => {
            if is_confidential {
                EvolutionVisibility::MetadataOnly
            } else {
                EvolutionVisibility::SummaryOnly
            }
        }
    }
}

/// A technical evolution as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evolution {
    pub id: Uuid,
    pub case_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub occurred_on: NaiveDate,
    pub kind: EvolutionKind,
    pub summary: Option<String>,
    pub technical_notes: Option<String>,
    pub is_confidential: bool,
    /// Set when fields were removed for the current viewer
    pub redacted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Evolution {
    /// Remove the fields the viewer is not allowed to read
    pub fn redact(mut self, visibility: EvolutionVisibility) -> Self {
        match visibility {
            EvolutionVisibility::Full => {}
            EvolutionVisibility::SummaryOnly => {
                self.redacted = self.technical_notes.is_some();
                self.technical_notes = None;
            }
            EvolutionVisibility::MetadataOnly => {
                self.summary = None;
                self.technical_notes = None;
                self.redacted = true;
            }
        }
        self
    }

    /// Apply the visibility rule for a viewer
    pub fn redact_for(self, viewer_role: UserRole, viewer_id: Uuid) -> Self {
        let visibility =
            evolution_visibility(viewer_role, viewer_id, self.author_id, self.is_confidential);
        self.redact(visibility)
    }
}

/// Whether a user may change an existing evolution
pub fn can_edit_evolution(viewer_role: UserRole, viewer_id: Uuid, author_id: Uuid) -> bool {
    viewer_role == UserRole::Admin || viewer_id == author_id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(author_id: Uuid, confidential: bool) -> Evolution {
        Evolution {
            id: Uuid::new_v4(),
            case_id: Uuid::new_v4(),
            author_id,
            author_name: "Ana".to_string(),
            occurred_on: NaiveDate::from_ymd_opt(2026, 2, 3).unwrap(),
            kind: EvolutionKind::HomeVisit,
            summary: Some("Visita domiciliar realizada".to_string()),
            technical_notes: Some("Relato de violência psicológica".to_string()),
            is_confidential: confidential,
            redacted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn coordination_sees_everything() {
        let author = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        for role in [UserRole::Admin, UserRole::Coordinator] {
            let e = sample(author, true).redact_for(role, viewer);
            assert!(!e.redacted);
            assert!(e.technical_notes.is_some());
        }
    }

    #[test]
    fn technician_sees_own_confidential_notes() {
        let author = Uuid::new_v4();
        let e = sample(author, true).redact_for(UserRole::Technician, author);
        assert!(!e.redacted);
        assert!(e.summary.is_some());
    }

    #[test]
    fn technician_cannot_read_others_confidential_notes() {
        let e = sample(Uuid::new_v4(), true).redact_for(UserRole::Technician, Uuid::new_v4());
        assert!(e.redacted);
        assert!(e.summary.is_none());
        assert!(e.technical_notes.is_none());
    }

    #[test]
    fn administrative_gets_summary_only() {
        let e = sample(Uuid::new_v4(), false).redact_for(UserRole::Administrative, Uuid::new_v4());
        assert!(e.redacted);
        assert!(e.summary.is_some());
        assert!(e.technical_notes.is_none());

        let e = sample(Uuid::new_v4(), true).redact_for(UserRole::Administrative, Uuid::new_v4());
        assert!(e.summary.is_none());
    }

    #[test]
    fn summary_only_without_notes_is_not_flagged() {
        let mut e = sample(Uuid::new_v4(), false);
        e.technical_notes = None;
        let e = e.redact(EvolutionVisibility::SummaryOnly);
        assert!(!e.redacted);
    }

    #[test]
    fn only_author_or_admin_edits() {
        let author = Uuid::new_v4();
        assert!(can_edit_evolution(UserRole::Technician, author, author));
        assert!(can_edit_evolution(UserRole::Admin, Uuid::new_v4(), author));
        assert!(!can_edit_evolution(UserRole::Coordinator, Uuid::new_v4(), author));
    }
}
