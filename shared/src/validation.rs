//! Validation utilities for the CREAS Case Management Platform
//!
//! Includes Brazil-specific document checks (CPF, NIS) used at intake.

use rust_decimal::Decimal;

// ============================================================================
// General Validations
// ============================================================================

/// Maximum length for person names
pub const MAX_NAME_LENGTH: usize = 200;

/// Minimum password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err("Invalid email format");
    };
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.')
    {
        return Err("Invalid email format");
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

/// Validate a person's name
pub fn validate_person_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name cannot be empty");
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err("Name is too long");
    }
    Ok(())
}

/// Validate a monetary amount that cannot be negative
pub fn validate_non_negative_amount(amount: Decimal) -> Result<(), &'static str> {
    if amount < Decimal::ZERO {
        return Err("Amount cannot be negative");
    }
    Ok(())
}

/// Keep only ASCII digits
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

// ============================================================================
// Brazil-Specific Validations
// ============================================================================

/// Validate CPF (Cadastro de Pessoas Físicas)
/// Accepts formatted ("529.982.247-25") or bare digits
pub fn validate_cpf(cpf: &str) -> Result<(), &'static str> {
    let digits: Vec<u32> = digits_only(cpf).chars().filter_map(|c| c.to_digit(10)).collect();

    if digits.len() != 11 {
        return Err("CPF must have 11 digits");
    }

    // Sequences like 111.111.111-11 pass the checksum but are invalid
    if digits.iter().all(|&d| d == digits[0]) {
        return Err("Invalid CPF");
    }

    for check_position in [9, 10] {
        let sum: u32 = digits
            .iter()
            .take(check_position)
            .enumerate()
            .map(|(i, &d)| d * (check_position as u32 + 1 - i as u32))
            .sum();
        let check_digit = (sum * 10) % 11 % 10;
        if check_digit != digits[check_position] {
            return Err("Invalid CPF checksum");
        }
    }

    Ok(())
}

/// Format an 11-digit CPF as 000.000.000-00
pub fn format_cpf(cpf: &str) -> Option<String> {
    let digits = digits_only(cpf);
    if digits.len() != 11 {
        return None;
    }
    Some(format!(
        "{}.{}.{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..11]
    ))
}

/// Validate NIS/PIS (Número de Identificação Social)
pub fn validate_nis(nis: &str) -> Result<(), &'static str> {
    const WEIGHTS: [u32; 10] = [3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

    let digits: Vec<u32> = digits_only(nis).chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 {
        return Err("NIS must have 11 digits");
    }
    if digits.iter().all(|&d| d == 0) {
        return Err("Invalid NIS");
    }

    let sum: u32 = digits.iter().zip(WEIGHTS).map(|(d, w)| d * w).sum();
    let remainder = 11 - (sum % 11);
    let check_digit = if remainder >= 10 { 0 } else { remainder };

    if check_digit != digits[10] {
        return Err("Invalid NIS checksum");
    }
    Ok(())
}

/// Validate Brazilian phone number format
/// Accepts: (11) 98765-4321, 1132654321, +55 11 98765-4321
pub fn validate_br_phone(phone: &str) -> Result<(), &'static str> {
    let mut digits = digits_only(phone);

    if (digits.len() == 12 || digits.len() == 13) && digits.starts_with("55") {
        digits.drain(..2);
    }

    if digits.len() != 10 && digits.len() != 11 {
        return Err("Phone must have area code plus 8 or 9 digits");
    }

    let bytes = digits.as_bytes();
    if bytes[0] == b'0' || bytes[1] == b'0' {
        return Err("Invalid area code");
    }

    // 9-digit subscriber numbers are mobiles and always start with 9
    if digits.len() == 11 && bytes[2] != b'9' {
        return Err("Mobile numbers must start with 9");
    }

    Ok(())
}

/// Normalize an optional document field: None or blank becomes None,
/// anything else is reduced to digits
pub fn normalize_document(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(digits_only)
}
