//! SQL identifier checks.
//!
//! Table and column names come from model declarations, never from query
//! parameters, so they are validated once when a model is defined and then
//! written into SQL text directly. Unquoted names must match
//! `[A-Za-z_][A-Za-z0-9_]*`; names that collide with SQL keywords are quoted
//! by the dialect when rendered.

use crate::error::{OrmError, OrmResult};

/// Keywords that must be quoted when used as a table or column name.
const RESERVED: &[&str] = &[
    "add", "all", "alter", "and", "as", "asc", "between", "by", "case", "check", "column",
    "constraint", "create", "cross", "default", "delete", "desc", "distinct", "drop", "else",
    "end", "exists", "foreign", "from", "full", "group", "having", "in", "index", "inner",
    "insert", "into", "is", "join", "key", "left", "like", "limit", "not", "null", "offset",
    "on", "or", "order", "outer", "primary", "references", "right", "select", "set", "table",
    "then", "to", "union", "unique", "update", "user", "using", "values", "when", "where",
];

/// Validate an unquoted identifier.
pub fn validate(name: &str) -> OrmResult<()> {
    if name.is_empty() {
        return Err(OrmError::mapping("Identifier cannot be empty"));
    }
    if !is_simple(name) {
        return Err(OrmError::mapping(format!("Invalid identifier: {name:?}")));
    }
    Ok(())
}

/// `true` for names matching `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_simple(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `true` when `name` is a SQL keyword (case-insensitive).
pub fn is_reserved(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    RESERVED.binary_search(&lower.as_str()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_table_is_sorted() {
        let mut sorted = RESERVED.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, RESERVED);
    }

    #[test]
    fn accepts_simple_names() {
        assert!(validate("people").is_ok());
        assert!(validate("_private").is_ok());
        assert!(validate("CompanyPerson").is_ok());
        assert!(validate("modified_by_person_id").is_ok());
    }

    #[test]
    fn rejects_unsafe_names() {
        assert!(validate("").is_err());
        assert!(validate("1users").is_err());
        assert!(validate("users; drop table users; --").is_err());
        assert!(validate("users name").is_err());
        assert!(validate("users.name").is_err());
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert!(is_reserved("order"));
        assert!(is_reserved("ORDER"));
        assert!(is_reserved("Group"));
        assert!(!is_reserved("number"));
        assert!(!is_reserved("name"));
    }
}
