//! Access control tests
//!
//! Property-based and unit tests for:
//! - Role permissions
//! - Confidential evolution redaction
//! - Evolution edit rights

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use shared::{
    can_edit_evolution, evolution_visibility, permission, role_permissions, Action, Evolution,
    EvolutionKind, EvolutionVisibility, Resource, UserRole,
};
use uuid::Uuid;

// ============================================================================
// Property Test Strategies
// ============================================================================

fn role_strategy() -> impl Strategy<Value = UserRole> {
    prop::sample::select(UserRole::ALL.to_vec())
}

fn kind_strategy() -> impl Strategy<Value = EvolutionKind> {
    prop::sample::select(EvolutionKind::ALL.to_vec())
}

fn evolution(author_id: Uuid, kind: EvolutionKind, confidential: bool) -> Evolution {
    Evolution {
        id: Uuid::new_v4(),
        case_id: Uuid::new_v4(),
        author_id,
        author_name: "Técnica de referência".to_string(),
        occurred_on: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
        kind,
        summary: Some("Atendimento individual com a família".to_string()),
        technical_notes: Some("Parecer técnico".to_string()),
        is_confidential: confidential,
        redacted: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Coordinators and admins always read the full record
    #[test]
    fn test_supervisors_see_everything(
        role in prop::sample::select(vec![UserRole::Admin, UserRole::Coordinator]),
        kind in kind_strategy(),
        confidential in any::<bool>(),
    ) {
        let record = evolution(Uuid::new_v4(), kind, confidential).redact_for(role, Uuid::new_v4());
        prop_assert!(!record.redacted);
        prop_assert!(record.summary.is_some());
        prop_assert!(record.technical_notes.is_some());
    }

    /// Administrative staff never read technical notes
    #[test]
    fn test_administrative_never_sees_notes(kind in kind_strategy(), confidential in any::<bool>()) {
        let author = Uuid::new_v4();
        let record = evolution(author, kind, confidential).redact_for(UserRole::Administrative, author);
        prop_assert!(record.technical_notes.is_none());
        prop_assert!(record.redacted);
        prop_assert_eq!(record.summary.is_some(), !confidential);
    }

    /// Redaction keeps the metadata every viewer is allowed to see
    #[test]
    fn test_redaction_keeps_metadata(
        role in role_strategy(),
        kind in kind_strategy(),
        confidential in any::<bool>(),
    ) {
        let original = evolution(Uuid::new_v4(), kind, confidential);
        let record = original.clone().redact_for(role, Uuid::new_v4());
        prop_assert_eq!(record.id, original.id);
        prop_assert_eq!(record.author_id, original.author_id);
        prop_assert_eq!(record.kind, original.kind);
        prop_assert_eq!(record.occurred_on, original.occurred_on);
        prop_assert_eq!(record.is_confidential, original.is_confidential);
    }

    #[test]
    fn test_only_author_or_admin_edits(role in role_strategy()) {
        let author = Uuid::new_v4();
        prop_assert!(can_edit_evolution(role, author, author));
        prop_assert_eq!(
            can_edit_evolution(role, Uuid::new_v4(), author),
            role == UserRole::Admin
        );
    }

    #[test]
    fn test_permissions_are_resource_action_pairs(role in role_strategy()) {
        for perm in role_permissions(role) {
            let (resource, action) = perm.split_once(':').unwrap();
            prop_assert!(resource.parse::<Resource>().is_ok(), "bad resource in {}", perm);
            prop_assert!(action.parse::<Action>().is_ok(), "bad action in {}", perm);
        }
    }
}

#[cfg(test)]
mod confidentiality_tests {
    use super::*;

    #[test]
    fn test_technician_author_sees_own_confidential_record() {
        let author = Uuid::new_v4();
        assert_eq!(
            evolution_visibility(UserRole::Technician, author, author, true),
            EvolutionVisibility::Full
        );
    }

    #[test]
    fn test_other_technician_sees_metadata_only() {
        let record = evolution(Uuid::new_v4(), EvolutionKind::HomeVisit, true)
            .redact_for(UserRole::Technician, Uuid::new_v4());
        assert!(record.redacted);
        assert!(record.summary.is_none());
        assert!(record.technical_notes.is_none());
    }

    #[test]
    fn test_non_confidential_record_open_to_technicians() {
        let record = evolution(Uuid::new_v4(), EvolutionKind::Attendance, false)
            .redact_for(UserRole::Technician, Uuid::new_v4());
        assert!(!record.redacted);
        assert!(record.technical_notes.is_some());
    }
}

#[cfg(test)]
mod role_permission_tests {
    use super::*;

    fn has(role: UserRole, resource: Resource, action: Action) -> bool {
        role_permissions(role).contains(&permission(resource, action))
    }

    #[test]
    fn test_admin_has_all_permissions() {
        for resource in Resource::ALL {
            for action in Action::ALL {
                assert!(has(UserRole::Admin, *resource, *action));
            }
        }
    }

    #[test]
    fn test_coordinator_cannot_manage_users() {
        assert!(has(UserRole::Coordinator, Resource::User, Action::View));
        assert!(!has(UserRole::Coordinator, Resource::User, Action::Create));
        assert!(!has(UserRole::Coordinator, Resource::User, Action::Edit));
        assert!(has(UserRole::Coordinator, Resource::Audit, Action::View));
    }

    #[test]
    fn test_technician_cannot_delete_cases_or_evolutions() {
        assert!(has(UserRole::Technician, Resource::Case, Action::Discharge));
        assert!(!has(UserRole::Technician, Resource::Case, Action::Delete));
        assert!(!has(UserRole::Technician, Resource::Evolution, Action::Delete));
        assert!(!has(UserRole::Technician, Resource::Audit, Action::View));
        assert!(!has(UserRole::Technician, Resource::Report, Action::Export));
    }

    #[test]
    fn test_administrative_cannot_write_evolutions() {
        assert!(has(UserRole::Administrative, Resource::Evolution, Action::View));
        assert!(!has(UserRole::Administrative, Resource::Evolution, Action::Create));
        assert!(!has(UserRole::Administrative, Resource::Case, Action::Discharge));
        assert!(!has(UserRole::Administrative, Resource::ActionPlan, Action::View));
    }

    #[test]
    fn test_permission_format() {
        assert_eq!(permission(Resource::ActionPlan, Action::Edit), "action_plan:edit");
        assert_eq!(permission(Resource::SavedFilter, Action::View), "saved_filter:view");
    }
}
