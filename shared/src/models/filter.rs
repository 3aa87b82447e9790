//! Case list filters, used both as query parameters and as saved filters

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CaseStatus, ViolationType};
use crate::types::Pagination;

text_enum! {
    /// Sort order for case lists
    pub enum CaseSort: "case sort" {
        IntakeDateDesc => "intake_date_desc",
        IntakeDateAsc => "intake_date_asc",
        NameAsc => "name_asc",
        UpdatedDesc => "updated_desc",
    }
}

impl Default for CaseSort {
    fn default() -> Self {
        CaseSort::IntakeDateDesc
    }
}

impl CaseSort {
    /// ORDER BY clause for the `cases` table aliased as `c`
    pub fn order_by(&self) -> &'static str {
        match self {
            CaseSort::IntakeDateDesc => "c.intake_date DESC, c.created_at DESC",
            CaseSort::IntakeDateAsc => "c.intake_date ASC, c.created_at ASC",
            CaseSort::NameAsc => "LOWER(c.full_name) ASC, c.id ASC",
            CaseSort::UpdatedDesc => "c.updated_at DESC",
        }
    }
}

/// Filters for the case list
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CaseFilter {
    pub status: Option<CaseStatus>,
    /// Free text matched against name, social name, code and CPF
    pub search: Option<String>,
    pub technician_id: Option<Uuid>,
    /// Restrict to cases held by the caller
    pub mine: Option<bool>,
    /// Restrict to cases without a responsible technician
    pub unassigned: Option<bool>,
    pub violation_type: Option<ViolationType>,
    pub neighborhood: Option<String>,
    pub intake_from: Option<NaiveDate>,
    pub intake_to: Option<NaiveDate>,
    pub sort: Option<CaseSort>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl CaseFilter {
    pub fn validate(&self) -> Result<(), &'static str> {
        if let (Some(from), Some(to)) = (self.intake_from, self.intake_to) {
            if from > to {
                return Err("intake_from must not be after intake_to");
            }
        }
        if let Some(search) = &self.search {
            if search.chars().count() > 100 {
                return Err("search text is too long");
            }
        }
        Ok(())
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::from_query(self.page, self.per_page)
    }

    /// Trimmed, non-empty search text
    pub fn search_text(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
