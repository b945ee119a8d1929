//! The Document-ID parser (spec §4.D): `docID` may be a 24-hex ObjectId, an
//! extended-JSON value, or a plain string. This exact ordering is load-bearing for
//! fidelity with collections that mix `_id` types.

use mongodb::bson::{oid::ObjectId, Bson};
use thiserror::Error;

/// Errors from [`parse_document_id`].
#[derive(Debug, Error)]
pub enum DocumentIdError {
    /// The input looked like extended JSON (started with `{`) but failed to parse.
    #[error("invalid extended-JSON document id: {0}")]
    InvalidExtendedJson(String),
}

fn looks_like_object_id(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parses a Document-ID string into the `Bson` value it should be matched against,
/// trying in order: (1) a 24-hex-char ObjectId, (2) extended JSON if it starts with
/// `{`, (3) a plain string.
pub fn parse_document_id(doc_id: &str) -> Result<Bson, DocumentIdError> {
    if looks_like_object_id(doc_id) {
        if let Ok(oid) = ObjectId::parse_str(doc_id) {
            return Ok(Bson::ObjectId(oid));
        }
    }
    if doc_id.trim_start().starts_with('{') {
        return serde_json::from_str::<Bson>(doc_id).map_err(|e| DocumentIdError::InvalidExtendedJson(e.to_string()));
    }
    Ok(Bson::String(doc_id.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex24_parses_as_object_id() {
        let id = "507f1f77bcf86cd799439011";
        match parse_document_id(id).unwrap() {
            Bson::ObjectId(oid) => assert_eq!(oid.to_hex(), id),
            other => panic!("expected ObjectId, got {other:?}"),
        }
    }

    #[test]
    fn extended_json_oid_parses_as_object_id() {
        let id = r#"{"$oid":"507f1f77bcf86cd799439011"}"#;
        match parse_document_id(id).unwrap() {
            Bson::ObjectId(oid) => assert_eq!(oid.to_hex(), "507f1f77bcf86cd799439011"),
            other => panic!("expected ObjectId, got {other:?}"),
        }
    }

    #[test]
    fn extended_json_number_long_parses_as_int64() {
        let id = r#"{"$numberLong":"42"}"#;
        match parse_document_id(id).unwrap() {
            Bson::Int64(n) => assert_eq!(n, 42),
            other => panic!("expected Int64, got {other:?}"),
        }
    }

    #[test]
    fn plain_string_falls_through_to_string_bson() {
        match parse_document_id("user-1234").unwrap() {
            Bson::String(s) => assert_eq!(s, "user-1234"),
            other => panic!("expected String, got {other:?}"),
        }
    }

    #[test]
    fn a_24_char_non_hex_string_is_treated_as_plain_string() {
        // 24 characters but not all hex digits — must not attempt ObjectId parsing.
        let id = "not-a-valid-object-id!!!";
        assert_eq!(id.len(), 24);
        match parse_document_id(id).unwrap() {
            Bson::String(s) => assert_eq!(s, id),
            other => panic!("expected String, got {other:?}"),
        }
    }

    #[test]
    fn malformed_extended_json_is_an_error() {
        assert!(parse_document_id("{not valid json").is_err());
    }
}
