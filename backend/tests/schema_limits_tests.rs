//! Column width tests
//!
//! Every bounded text column must hold the longest value the validators
//! accept, otherwise valid input fails at the INSERT.

use std::collections::BTreeMap;

use shared::MAX_NAME_LENGTH;

const SCHEMA: &str = include_str!("../migrations/0001_initial_schema.sql");

/// `(table, column) -> width` for every VARCHAR column in the schema
fn varchar_columns() -> BTreeMap<(String, String), usize> {
    let mut columns = BTreeMap::new();
    let mut table = String::new();

    for line in SCHEMA.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("CREATE TABLE ") {
            table = rest.split_whitespace().next().unwrap_or_default().to_string();
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(column), Some(kind)) = (parts.next(), parts.next()) else {
            continue;
        };
        if let Some(width) = kind
            .strip_prefix("VARCHAR(")
            .and_then(|w| w.split(')').next())
            .and_then(|w| w.parse::<usize>().ok())
        {
            columns.insert((table.clone(), column.to_string()), width);
        }
    }
    columns
}

/// Longest accepted value for each bounded column
fn accepted_widths() -> BTreeMap<(String, String), usize> {
    [
        ("users", "name", MAX_NAME_LENGTH),
        // bcrypt hashes are 60 characters
        ("users", "password_hash", 60),
        ("users", "professional_registry", 50),
        // base64 of a SHA-256 digest
        ("refresh_tokens", "token_hash", 44),
        ("cases", "code", "CREAS-2026-00001".len()),
        ("cases", "full_name", MAX_NAME_LENGTH),
        ("cases", "cpf", 11),
        ("cases", "nis", 11),
        ("family_members", "full_name", MAX_NAME_LENGTH),
        ("family_members", "cpf", 11),
        ("family_members", "nis", 11),
        ("audit_logs", "user_name", MAX_NAME_LENGTH),
        ("saved_filters", "name", 80),
    ]
    .into_iter()
    .map(|(t, c, w)| ((t.to_string(), c.to_string()), w))
    .collect()
}

#[test]
fn test_bounded_columns_fit_accepted_values() {
    let columns = varchar_columns();
    let accepted = accepted_widths();

    for (key, width) in &columns {
        let Some(longest) = accepted.get(key) else {
            panic!("{}.{} is bounded but nothing limits its input", key.0, key.1);
        };
        assert!(
            width >= longest,
            "{}.{} holds {} characters but {} are accepted",
            key.0,
            key.1,
            width,
            longest
        );
    }
}

#[test]
fn test_user_names_fit_the_longest_valid_name() {
    let columns = varchar_columns();
    let name = "a".repeat(MAX_NAME_LENGTH);
    assert!(shared::validate_person_name(&name).is_ok());

    for key in [("users", "name"), ("audit_logs", "user_name")] {
        let width = columns[&(key.0.to_string(), key.1.to_string())];
        assert!(name.chars().count() <= width, "{}.{}", key.0, key.1);
    }
}

#[test]
fn test_schema_is_parsed() {
    let columns = varchar_columns();
    assert!(columns.contains_key(&("users".to_string(), "name".to_string())));
    assert!(columns.contains_key(&("saved_filters".to_string(), "name".to_string())));
}
