//! Canonical extended-JSON v2 serialization helpers (spec §4.D).

use mongodb::bson::Bson;

/// Serializes `value` to a canonical extended-JSON v2 [`serde_json::Value`], so
/// dates, Decimal128, ObjectIds, and binary survive a round trip exactly rather than
/// collapsing into the shorthand "relaxed" forms.
pub fn to_canonical_extjson(value: &Bson) -> serde_json::Value {
    value.clone().into_canonical_extjson()
}

/// Serializes a document to its canonical extended-JSON v2 string form.
pub fn to_canonical_extjson_string(doc: &mongodb::bson::Document) -> String {
    Bson::Document(doc.clone()).into_canonical_extjson().to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn object_id_round_trips_as_canonical_oid() {
        let oid = mongodb::bson::oid::ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let document = doc! { "_id": oid };
        let text = to_canonical_extjson_string(&document);
        assert!(text.contains(r#""$oid":"507f1f77bcf86cd799439011""#));
    }

    #[test]
    fn int64_round_trips_as_number_long() {
        let document = doc! { "n": 9_000_000_000i64 };
        let text = to_canonical_extjson_string(&document);
        assert!(text.contains(r#""$numberLong":"9000000000""#));
    }
}
