//! User and role models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    /// Staff roles inside a CREAS unit
    pub enum UserRole: "role" {
        Admin => "admin",
        Coordinator => "coordinator",
        /// Social worker, psychologist or lawyer on the specialized team
        Technician => "technician",
        /// Reception and administrative support
        Administrative => "administrative",
    }
}

text_enum! {
    /// Resources that can be accessed
    pub enum Resource: "resource" {
        Case => "case",
        Evolution => "evolution",
        Family => "family",
        Referral => "referral",
        Appointment => "appointment",
        ActionPlan => "action_plan",
        Audit => "audit",
        User => "user",
        SavedFilter => "saved_filter",
        Dashboard => "dashboard",
        Report => "report",
    }
}

text_enum! {
    /// Actions that can be performed on resources
    pub enum Action: "action" {
        View => "view",
        Create => "create",
        Edit => "edit",
        Delete => "delete",
        Export => "export",
        Discharge => "discharge",
    }
}

/// A staff account as exposed by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub phone: Option<String>,
    /// Professional council registration (CRESS, CRP, OAB)
    pub professional_registry: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Permission string in `resource:action` form
pub fn permission(resource: Resource, action: Action) -> String {
    format!("{}:{}", resource, action)
}

impl UserRole {
    /// Whether cases can be assigned to users with this role
    pub fn can_hold_cases(&self) -> bool {
        matches!(self, UserRole::Technician | UserRole::Coordinator)
    }
}

/// Permissions granted to each role
pub fn role_permissions(role: UserRole) -> Vec<String> {
    use Action::{Create, Delete, Discharge, Edit, View};

    let grants: Vec<(Resource, Vec<Action>)> = match role {
        UserRole::Admin => Resource::ALL
            .iter()
            .map(|r| (*r, Action::ALL.to_vec()))
            .collect(),
        UserRole::Coordinator => Resource::ALL
            .iter()
            .map(|r| match r {
                Resource::User => (*r, vec![View]),
                _ => (*r, Action::ALL.to_vec()),
            })
            .collect(),
        UserRole::Technician => vec![
            (Resource::Case, vec![View, Create, Edit, Discharge]),
            (Resource::Evolution, vec![View, Create, Edit]),
            (Resource::Family, vec![View, Create, Edit, Delete]),
            (Resource::Referral, vec![View, Create, Edit]),
            (Resource::Appointment, vec![View, Create, Edit, Delete]),
            (Resource::ActionPlan, vec![View, Create, Edit]),
            (Resource::SavedFilter, vec![View, Create, Edit, Delete]),
            (Resource::Dashboard, vec![View]),
            (Resource::Report, vec![View]),
            (Resource::User, vec![View]),
        ],
        UserRole::Administrative => vec![
            (Resource::Case, vec![View, Create]),
            (Resource::Evolution, vec![View]),
            (Resource::Family, vec![View, Create, Edit]),
            (Resource::Referral, vec![View]),
            (Resource::Appointment, vec![View, Create, Edit]),
            (Resource::SavedFilter, vec![View, Create, Edit, Delete]),
            (Resource::Dashboard, vec![View]),
            (Resource::User, vec![View]),
        ],
    };

    grants
        .into_iter()
        .flat_map(|(resource, actions)| {
            actions
                .into_iter()
                .map(move |action| permission(resource, action))
        })
        .collect()
}
