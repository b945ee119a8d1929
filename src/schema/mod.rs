//! Schema Inference (spec §4.E): interval-sampled (not random) field/type discovery
//! over a collection, producing a nested [`SchemaField`] tree.

use std::collections::{BTreeMap, BTreeSet};

use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::FindOptions,
    Client,
};
use serde::Serialize;

use thiserror::Error;

use crate::query::{validate_collection_name, validate_database_name, NameError};

/// Errors from [`infer_schema`].
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A database or collection name failed validation.
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),
    /// A driver operation failed.
    #[error("mongodb error: {0}")]
    MongoDb(#[from] mongodb::error::Error),
}

/// One inferred field, possibly recursive for object/array-of-object paths (spec
/// §4.E).
#[derive(Clone, Debug, Serialize)]
pub struct SchemaField {
    /// Sorted, `|`-joined set of BSON type names observed for this path.
    pub types: String,
    /// Percentage of sampled documents in which this path was present, `0.0..=100.0`.
    pub occurrence: f64,
    /// Nested schema for object or array-of-object paths; empty otherwise.
    pub nested: BTreeMap<String, SchemaField>,
}

/// Inferred schema for a collection: top-level path name to [`SchemaField`].
pub type Schema = BTreeMap<String, SchemaField>;

struct Accumulator {
    field_counts: BTreeMap<String, usize>,
    field_types: BTreeMap<String, BTreeSet<&'static str>>,
    field_schemas: BTreeMap<String, Vec<Document>>,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            field_counts: BTreeMap::new(),
            field_types: BTreeMap::new(),
            field_schemas: BTreeMap::new(),
        }
    }
}

/// Infers a [`Schema`] for `coll` using `sample_size` interval samples (clamped to at
/// least 1). Returns an empty schema for an empty collection.
pub async fn infer_schema(client: &Client, db: &str, coll: &str, sample_size: u64) -> Result<Schema, SchemaError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let sample_size = sample_size.max(1);

    let collection = client.database(db).collection::<Document>(coll);
    let total = collection.count_documents(doc! {}, None).await?;
    if total == 0 {
        return Ok(Schema::new());
    }

    let interval = (total / sample_size).max(1);
    let mut accumulator = Accumulator::new();

    for i in 0..sample_size {
        let skip = i * interval;
        if skip >= total {
            break;
        }
        let options = FindOptions::builder().skip(skip).limit(1).build();
        let mut cursor = match collection.find(doc! {}, options).await {
            Ok(cursor) => cursor,
            Err(_) => continue,
        };
        if let Ok(Some(document)) = cursor.try_next().await {
            walk_document(&document, String::new(), &mut accumulator);
        }
    }

    Ok(build_schema(&accumulator, sample_size))
}

fn walk_document(document: &Document, prefix: String, accumulator: &mut Accumulator) {
    for (key, value) in document {
        let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
        *accumulator.field_counts.entry(path.clone()).or_insert(0) += 1;
        accumulator
            .field_types
            .entry(path.clone())
            .or_default()
            .insert(bson_type_name(value));

        match value {
            Bson::Document(nested) => {
                accumulator.field_schemas.entry(path.clone()).or_default().push(nested.clone());
                walk_document(nested, path, accumulator);
            }
            Bson::Array(items) => {
                let array_path = format!("{path}[]");
                for item in items {
                    if let Bson::Document(nested) = item {
                        accumulator.field_schemas.entry(array_path.clone()).or_default().push(nested.clone());
                        walk_document(nested, array_path.clone(), accumulator);
                    }
                }
            }
            _ => {}
        }
    }
}

fn build_schema(accumulator: &Accumulator, sample_size: u64) -> Schema {
    let mut top_level_paths: BTreeSet<&str> = BTreeSet::new();
    for path in accumulator.field_counts.keys() {
        let top = path.split('.').next().unwrap_or(path);
        let top = top.split("[]").next().unwrap_or(top);
        top_level_paths.insert(top);
    }

    let mut schema = Schema::new();
    for top in top_level_paths {
        if let Some(field) = build_field(accumulator, top, sample_size) {
            schema.insert(top.to_string(), field);
        }
    }
    schema
}

fn build_field(accumulator: &Accumulator, path: &str, sample_size: u64) -> Option<SchemaField> {
    let count = *accumulator.field_counts.get(path)?;
    let types = accumulator.field_types.get(path)?;
    let type_string = types.iter().cloned().collect::<Vec<_>>().join("|");
    let occurrence = count as f64 / sample_size as f64 * 100.0;

    let mut nested = BTreeMap::new();
    if accumulator.field_schemas.contains_key(path) {
        let child_prefix = format!("{path}.");
        let array_prefix = format!("{path}[].");
        let mut child_tops: BTreeSet<String> = BTreeSet::new();
        for candidate in accumulator.field_counts.keys() {
            if let Some(rest) = candidate.strip_prefix(&child_prefix) {
                child_tops.insert(format!("{path}.{}", rest.split('.').next().unwrap_or(rest).split("[]").next().unwrap_or(rest)));
            } else if let Some(rest) = candidate.strip_prefix(&array_prefix) {
                child_tops.insert(format!("{path}[].{}", rest.split('.').next().unwrap_or(rest).split("[]").next().unwrap_or(rest)));
            }
        }
        for child_path in child_tops {
            if let Some(child_field) = build_field(accumulator, &child_path, sample_size) {
                let display_name = child_path.rsplit(['.', ']']).next().unwrap_or(&child_path).trim_start_matches('[');
                nested.insert(display_name.to_string(), child_field);
            }
        }
    }

    Some(SchemaField {
        types: type_string,
        occurrence,
        nested,
    })
}

/// The fixed BSON type-name vocabulary used in [`SchemaField::types`] (spec §4.E).
fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Null => "Null",
        Bson::ObjectId(_) => "ObjectId",
        Bson::String(_) => "String",
        Bson::Int32(_) => "Int32",
        Bson::Int64(_) => "Int64",
        Bson::Double(_) => "Double",
        Bson::Boolean(_) => "Boolean",
        Bson::DateTime(_) => "Date",
        Bson::Timestamp(_) => "Timestamp",
        Bson::Document(_) => "Object",
        Bson::Array(items) => {
            if items.is_empty() {
                "Array"
            } else {
                "Array<T>"
            }
        }
        Bson::Binary(_) => "Binary",
        Bson::Decimal128(_) => "Decimal128",
        Bson::RegularExpression(_) => "Regex",
        _ => "String",
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bson_type_name_covers_the_fixed_vocabulary() {
        assert_eq!(bson_type_name(&Bson::Null), "Null");
        assert_eq!(bson_type_name(&Bson::Int32(1)), "Int32");
        assert_eq!(bson_type_name(&Bson::Array(vec![Bson::Int32(1)])), "Array<T>");
        assert_eq!(bson_type_name(&Bson::Array(vec![])), "Array");
    }

    #[test]
    fn walk_document_uses_bracket_suffix_for_array_paths() {
        let mut accumulator = Accumulator::new();
        let document = doc! { "tags": [ { "name": "x" } ] };
        walk_document(&document, String::new(), &mut accumulator);
        assert!(accumulator.field_counts.contains_key("tags"));
        assert!(accumulator.field_counts.contains_key("tags[].name"));
    }

    #[test]
    fn build_schema_computes_occurrence_percentage() {
        let mut accumulator = Accumulator::new();
        walk_document(&doc! { "name": "a" }, String::new(), &mut accumulator);
        walk_document(&doc! { "other": "b" }, String::new(), &mut accumulator);
        let schema = build_schema(&accumulator, 2);
        assert_eq!(schema.get("name").unwrap().occurrence, 50.0);
    }
}
