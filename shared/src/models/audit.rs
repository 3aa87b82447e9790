//! Audit log models

text_enum! {
    /// What happened
    pub enum AuditAction: "audit action" {
        Create => "create",
        Update => "update",
        Delete => "delete",
        StatusChange => "status_change",
        Assign => "assign",
        Login => "login",
        LoginFailed => "login_failed",
        Logout => "logout",
        PasswordChange => "password_change",
        Export => "export",
    }
}

text_enum! {
    /// What it happened to
    pub enum AuditEntity: "audit entity" {
        Case => "case",
        Evolution => "evolution",
        FamilyMember => "family_member",
        Referral => "referral",
        Appointment => "appointment",
        ActionPlan => "action_plan",
        User => "user",
        SavedFilter => "saved_filter",
        Session => "session",
        Report => "report",
    }
}
