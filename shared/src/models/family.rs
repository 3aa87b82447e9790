//! Family composition models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

text_enum! {
    /// Relationship of a family member to the case subject
    pub enum Relationship: "relationship" {
        Mother => "mother",
        Father => "father",
        Sibling => "sibling",
        Child => "child",
        Grandparent => "grandparent",
        Grandchild => "grandchild",
        Spouse => "spouse",
        UncleAunt => "uncle_aunt",
        Cousin => "cousin",
        Stepparent => "stepparent",
        Guardian => "guardian",
        Other => "other",
    }
}

/// The part of a family member relevant to household income
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseholdIncomeEntry {
    pub lives_in_household: bool,
    pub monthly_income: Option<Decimal>,
}

/// Household composition and income
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HouseholdSummary {
    /// Case subject plus members living in the same household
    pub household_size: u32,
    pub total_income: Decimal,
    pub per_capita_income: Decimal,
}

/// Summarize household size and income.
///
/// The case subject always counts as one resident; only members living in
/// the household contribute to size and income.
pub fn household_summary(members: &[HouseholdIncomeEntry]) -> HouseholdSummary {
    let residents = members.iter().filter(|m| m.lives_in_household);

    let (count, total_income) = residents.fold((1u32, Decimal::ZERO), |(count, total), m| {
        (count + 1, total + m.monthly_income.unwrap_or(Decimal::ZERO))
    });

    HouseholdSummary {
        household_size: count,
        total_income,
        per_capita_income: (total_income / Decimal::from(count)).round_dp(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(lives: bool, income: Option<i64>) -> HouseholdIncomeEntry {
        HouseholdIncomeEntry {
            lives_in_household: lives,
            monthly_income: income.map(Decimal::from),
        }
    }

    #[test]
    fn subject_alone() {
        let summary = household_summary(&[]);
        assert_eq!(summary.household_size, 1);
        assert_eq!(summary.total_income, Decimal::ZERO);
        assert_eq!(summary.per_capita_income, Decimal::ZERO);
    }

    #[test]
    fn only_residents_count() {
        let summary = household_summary(&[
            member(true, Some(1200)),
            member(true, None),
            member(false, Some(5000)),
        ]);
        assert_eq!(summary.household_size, 3);
        assert_eq!(summary.total_income, Decimal::from(1200));
        assert_eq!(summary.per_capita_income, Decimal::from(400));
    }

    #[test]
    fn per_capita_is_rounded() {
        let summary = household_summary(&[member(true, Some(1000)), member(true, Some(0))]);
        assert_eq!(summary.per_capita_income, Decimal::new(33333, 2));
    }
}
