//! Business logic services for the CREAS Case Management Platform

pub mod action_plan;
pub mod appointment;
pub mod audit;
pub mod auth;
pub mod case;
pub mod dashboard;
pub mod evolution;
pub mod family;
pub mod referral;
pub mod report;
pub mod saved_filter;
pub mod user;

pub use action_plan::ActionPlanService;
pub use appointment::AppointmentService;
pub use audit::AuditService;
pub use auth::AuthService;
pub use case::CaseService;
pub use dashboard::DashboardService;
pub use evolution::EvolutionService;
pub use family::FamilyService;
pub use referral::ReferralService;
pub use report::ReportService;
pub use saved_filter::SavedFilterService;
pub use user::UserService;
