//! HTTP request handlers

pub mod action_plan;
pub mod appointment;
pub mod audit;
pub mod auth;
pub mod case;
pub mod dashboard;
pub mod evolution;
pub mod family;
pub mod health;
pub mod referral;
pub mod report;
pub mod saved_filter;
pub mod user;

pub use action_plan::*;
pub use appointment::*;
pub use audit::*;
pub use auth::*;
pub use case::*;
pub use dashboard::*;
pub use evolution::*;
pub use family::*;
pub use health::*;
pub use referral::*;
pub use report::*;
pub use saved_filter::*;
pub use user::*;
