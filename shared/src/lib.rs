//! Shared types and models for the CREAS Case Management Platform
//!
//! This crate contains the workflow rules, access rules and validations shared
//! between the backend and the frontend (via WASM).

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
