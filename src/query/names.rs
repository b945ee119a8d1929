//! Database/collection name validation (spec §4.D).

use thiserror::Error;

const FORBIDDEN_DATABASE_CHARS: &[char] = &['/', '\\', '.', ' ', '"', '$', '*', '<', '>', ':', '|', '?'];
const MAX_DATABASE_BYTES: usize = 64;
const MAX_COLLECTION_BYTES: usize = 120;

/// Errors from [`validate_database_name`] / [`validate_collection_name`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    /// The name is empty.
    #[error("name must not be empty")]
    Empty,
    /// The name exceeds its byte-length limit.
    #[error("name exceeds {0} bytes")]
    TooLong(usize),
    /// The name contains a forbidden character.
    #[error("name contains forbidden character {0:?}")]
    ForbiddenChar(char),
    /// The name contains a NUL byte.
    #[error("name contains a NUL byte")]
    ContainsNul,
    /// A collection name starts with `$` without starting with `system.`.
    #[error("collection name must not start with '$' unless it starts with 'system.'")]
    ReservedDollarPrefix,
}

/// Validates a database name: at most 64 bytes, none of `/\. "$*<>:|?` or NUL.
pub fn validate_database_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_DATABASE_BYTES {
        return Err(NameError::TooLong(MAX_DATABASE_BYTES));
    }
    if name.contains('\0') {
        return Err(NameError::ContainsNul);
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_DATABASE_CHARS.contains(c)) {
        return Err(NameError::ForbiddenChar(c));
    }
    Ok(())
}

/// Validates a collection name: at most 120 bytes, no NUL, valid UTF-8 (guaranteed by
/// `&str`), and must not start with `$` unless it starts with `system.`.
pub fn validate_collection_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_COLLECTION_BYTES {
        return Err(NameError::TooLong(MAX_COLLECTION_BYTES));
    }
    if name.contains('\0') {
        return Err(NameError::ContainsNul);
    }
    if name.starts_with('$') && !name.starts_with("system.") {
        return Err(NameError::ReservedDollarPrefix);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accepts_an_ordinary_database_name() {
        assert!(validate_database_name("analytics").is_ok());
    }

    #[test]
    fn rejects_forbidden_database_characters() {
        assert_eq!(validate_database_name("bad/name"), Err(NameError::ForbiddenChar('/')));
        assert_eq!(validate_database_name("bad name"), Err(NameError::ForbiddenChar(' ')));
    }

    #[test]
    fn rejects_oversized_database_name() {
        let name = "a".repeat(65);
        assert_eq!(validate_database_name(&name), Err(NameError::TooLong(64)));
    }

    #[test]
    fn accepts_an_ordinary_collection_name() {
        assert!(validate_collection_name("orders.2024").is_ok());
    }

    #[test]
    fn rejects_dollar_prefixed_collection_name() {
        assert_eq!(validate_collection_name("$cmd"), Err(NameError::ReservedDollarPrefix));
    }

    #[test]
    fn accepts_system_dot_prefixed_collection_name() {
        assert!(validate_collection_name("system.indexes").is_ok());
    }

    #[test]
    fn rejects_oversized_collection_name() {
        let name = "a".repeat(121);
        assert_eq!(validate_collection_name(&name), Err(NameError::TooLong(120)));
    }

    #[test]
    fn rejects_empty_names() {
        assert_eq!(validate_database_name(""), Err(NameError::Empty));
        assert_eq!(validate_collection_name(""), Err(NameError::Empty));
    }
}
