//! Brazilian document and contact validation tests
//!
//! Property-based and unit tests for CPF, NIS and phone checks used at
//! intake and on family members.

use proptest::prelude::*;
use shared::{digits_only, format_cpf, normalize_document, validate_br_phone, validate_cpf, validate_nis};

// ============================================================================
// Helpers
// ============================================================================

fn cpf_check_digit(digits: &[u32]) -> u32 {
    let weight_start = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();
    (sum * 10) % 11 % 10
}

fn complete_cpf(base: &[u32]) -> String {
    let mut digits = base.to_vec();
    digits.push(cpf_check_digit(&digits));
    digits.push(cpf_check_digit(&digits));
    digits.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect()
}

fn complete_nis(base: &[u32]) -> String {
    const WEIGHTS: [u32; 10] = [3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    let sum: u32 = base.iter().zip(WEIGHTS).map(|(d, w)| d * w).sum();
    let remainder = 11 - (sum % 11);
    let check = if remainder >= 10 { 0 } else { remainder };
    base.iter()
        .chain(std::iter::once(&check))
        .map(|d| char::from_digit(*d, 10).unwrap())
        .collect()
}

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Nine leading CPF digits that are not all the same
fn cpf_base_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u32..10, 9).prop_filter("repeated digits", |d| {
        d.iter().any(|x| *x != d[0])
    })
}

fn nis_base_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u32..10, 10).prop_filter("all zeros", |d| d.iter().any(|x| *x != 0))
}

fn mobile_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[1-9][1-9]9[0-9]{8}",
        "\\([1-9][1-9]\\) 9[0-9]{4}-[0-9]{4}",
        "\\+55 [1-9][1-9] 9[0-9]{4}-[0-9]{4}",
    ]
}

fn landline_strategy() -> impl Strategy<Value = String> {
    prop_oneof!["[1-9][1-9][2-5][0-9]{7}", "\\([1-9][1-9]\\) [2-5][0-9]{3}-[0-9]{4}",]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn test_generated_cpf_is_valid(base in cpf_base_strategy()) {
        let cpf = complete_cpf(&base);
        prop_assert!(validate_cpf(&cpf).is_ok());

        let formatted = format_cpf(&cpf).unwrap();
        prop_assert!(validate_cpf(&formatted).is_ok());
        prop_assert_eq!(digits_only(&formatted), cpf);
    }

    #[test]
    fn test_cpf_with_wrong_check_digit_is_rejected(base in cpf_base_strategy(), bump in 1u32..10) {
        let cpf = complete_cpf(&base);
        let mut digits: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();
        digits[10] = (digits[10] + bump) % 10;
        let tampered: String = digits.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect();
        prop_assert!(validate_cpf(&tampered).is_err());
    }

    #[test]
    fn test_generated_nis_is_valid(base in nis_base_strategy()) {
        let nis = complete_nis(&base);
        prop_assert!(validate_nis(&nis).is_ok());
    }

    #[test]
    fn test_mobile_numbers_accepted(phone in mobile_strategy()) {
        prop_assert!(validate_br_phone(&phone).is_ok(), "rejected {}", phone);
    }

    #[test]
    fn test_landline_numbers_accepted(phone in landline_strategy()) {
        prop_assert!(validate_br_phone(&phone).is_ok(), "rejected {}", phone);
    }

    #[test]
    fn test_short_numbers_rejected(phone in "[1-9]{1,9}") {
        prop_assert!(validate_br_phone(&phone).is_err());
    }
}

#[cfg(test)]
mod cpf_tests {
    use super::*;

    #[test]
    fn test_known_cpfs() {
        assert!(validate_cpf("529.982.247-25").is_ok());
        assert!(validate_cpf("111.444.777-35").is_ok());
        assert!(validate_cpf("529.982.247-26").is_err());
    }

    #[test]
    fn test_repeated_digit_cpfs_rejected() {
        for d in 0..10 {
            let cpf: String = std::iter::repeat(char::from_digit(d, 10).unwrap())
                .take(11)
                .collect();
            assert!(validate_cpf(&cpf).is_err(), "{} accepted", cpf);
        }
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(validate_cpf("5299822472").is_err());
        assert!(validate_cpf("529982247250").is_err());
        assert!(validate_cpf("").is_err());
    }

    #[test]
    fn test_format_cpf() {
        assert_eq!(format_cpf("52998224725").as_deref(), Some("529.982.247-25"));
        assert_eq!(format_cpf("529.982.247-25").as_deref(), Some("529.982.247-25"));
        assert_eq!(format_cpf("1234"), None);
    }
}

#[cfg(test)]
mod document_normalization_tests {
    use super::*;

    #[test]
    fn test_blank_documents_become_none() {
        assert_eq!(normalize_document(None), None);
        assert_eq!(normalize_document(Some("")), None);
        assert_eq!(normalize_document(Some("   ")), None);
    }

    #[test]
    fn test_documents_reduced_to_digits() {
        assert_eq!(
            normalize_document(Some(" 529.982.247-25 ")).as_deref(),
            Some("52998224725")
        );
        assert_eq!(
            normalize_document(Some("120.30456.78-2")).as_deref(),
            Some("12030456782")
        );
    }

    #[test]
    fn test_known_nis() {
        assert!(validate_nis("120.30456.78-2").is_ok());
        assert!(validate_nis("00000000000").is_err());
        assert!(validate_nis("1203045678").is_err());
    }

    #[test]
    fn test_mobile_must_start_with_nine() {
        assert!(validate_br_phone("(11) 98765-4321").is_ok());
        assert!(validate_br_phone("(11) 88765-4321").is_err());
        assert!(validate_br_phone("(01) 98765-4321").is_err());
    }
}
