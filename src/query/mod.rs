//! The Query Engine (spec §4.D): find/insert/update/delete, diagnostics, index and
//! database administration. Filters, projections, sorts, and documents are all
//! *strings in MongoDB extended JSON v2* — parsed in relaxed mode, round-tripped back
//! out in canonical mode so dates, ObjectIds, Decimal128, and binary survive exactly.

mod document_id;
mod extjson;
mod names;

pub use document_id::parse_document_id;
pub use names::{validate_collection_name, validate_database_name, NameError};

use std::collections::BTreeMap;

use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::{FindOptions, IndexOptions},
    Client, Database, IndexModel,
};
use serde::Serialize;
use thiserror::Error;

pub use extjson::{to_canonical_extjson, to_canonical_extjson_string};

/// Errors from the Query Engine.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A database or collection name failed [`validate_database_name`] /
    /// [`validate_collection_name`].
    #[error("invalid name: {0}")]
    InvalidName(String),
    /// A filter/projection/sort/document string failed to parse as extended JSON, or
    /// parsed to something other than the expected shape (e.g. a non-object root).
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    /// A driver operation failed.
    #[error("mongodb error: {0}")]
    MongoDb(#[from] mongodb::error::Error),
}

impl From<NameError> for QueryError {
    fn from(e: NameError) -> Self {
        QueryError::InvalidName(e.to_string())
    }
}

/// `FindDocuments` options (spec §4.D).
#[derive(Clone, Debug, Default)]
pub struct FindDocumentsOptions {
    /// Extended-JSON projection document, if any.
    pub projection: Option<String>,
    /// Extended-JSON sort document, if any.
    pub sort: Option<String>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
    /// Use `estimatedDocumentCount` instead of `countDocuments` for `total`. Faster on
    /// large collections, but ignores `filter` and is flagged approximate.
    pub use_estimated_count: bool,
}

/// The result of `FindDocuments`/`Aggregate` (spec §4.D).
#[derive(Clone, Debug, Serialize)]
pub struct QueryResult {
    /// Matching documents, each serialized to canonical extended JSON v2.
    pub documents: Vec<String>,
    /// Total matching document count (or collection-wide estimate, see `total_is_estimated`).
    pub total: u64,
    /// Whether `total` came from `estimatedDocumentCount` rather than `countDocuments`.
    pub total_is_estimated: bool,
}

/// Structured result of `ExplainQuery` (spec §4.D).
#[derive(Clone, Debug, Serialize)]
pub struct ExplainResult {
    /// Human-readable summary of the winning plan's stage name.
    pub winning_plan_summary: String,
    /// The top-level stage of the winning plan (e.g. `"IXSCAN"`, `"COLLSCAN"`).
    pub top_stage: String,
    /// Index used by the winning plan, if any.
    pub index_name: Option<String>,
    /// Whether the winning plan is a full collection scan.
    pub is_collection_scan: bool,
    /// Documents examined, from `executionStats`.
    pub docs_examined: i64,
    /// Documents returned, from `executionStats`.
    pub docs_returned: i64,
    /// Total execution time in milliseconds, from `executionStats`.
    pub execution_time_ms: i64,
    /// The full `explain` output, for callers that want more than the summary.
    pub raw: serde_json::Value,
}

/// Structured result of `GetCollectionProfile` (spec §4.D).
#[derive(Clone, Debug, Serialize)]
pub struct CollectionProfile {
    /// Approximate document count, from `collStats`.
    pub document_count: i64,
    /// Storage size in bytes, from `collStats`.
    pub storage_size_bytes: i64,
    /// Number of distinct field paths observed across the sample.
    pub field_count: usize,
    /// Total field-path occurrences across the sample (paths counted per document).
    pub total_field_paths: usize,
    /// Maximum nesting depth observed, capped at 20.
    pub max_nesting_depth: u32,
    /// Sorted top-level field names observed across the sample.
    pub top_level_fields: Vec<String>,
}

/// One enriched index entry from `ListIndexes` (spec §4.D).
#[derive(Clone, Debug, Serialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Index key specification, as canonical extended JSON.
    pub keys: String,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Whether the index is sparse.
    pub sparse: bool,
    /// Number of operations served by this index, from `$indexStats`.
    pub usage_count: i64,
    /// Index size in bytes, from `collStats.indexSizes`.
    pub size_bytes: i64,
}

/// `CreateIndex` options (spec §4.D).
#[derive(Clone, Debug, Default)]
pub struct CreateIndexOptions {
    /// Enforce uniqueness.
    pub unique: bool,
    /// Allow documents missing the indexed field(s).
    pub sparse: bool,
    /// Explicit index name; the driver derives one from the keys if omitted.
    pub name: Option<String>,
    /// TTL in seconds, for expiring indexes.
    pub expire_after_seconds: Option<u32>,
}

const PROFILE_SAMPLE_SIZE: i64 = 5;
const PROFILE_MAX_DEPTH: u32 = 20;

/// Finds documents matching `filter` (spec §4.D). `db`/`coll` are validated before any
/// network call.
pub async fn find_documents(
    client: &Client,
    db: &str,
    coll: &str,
    filter: &str,
    opts: FindDocumentsOptions,
) -> Result<QueryResult, QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let filter_doc = parse_object_body(filter)?;
    let collection = client.database(db).collection::<Document>(coll);

    let mut find_options = FindOptions::default();
    if let Some(projection) = &opts.projection {
        find_options.projection = Some(parse_object_body(projection)?);
    }
    if let Some(sort) = &opts.sort {
        find_options.sort = Some(parse_object_body(sort)?);
    }
    find_options.skip = opts.skip;
    find_options.limit = opts.limit;

    let cursor = collection.find(filter_doc.clone(), find_options).await?;
    let docs: Vec<Document> = cursor.try_collect().await?;
    let documents = docs.iter().map(to_canonical_extjson_string).collect();

    let total = if opts.use_estimated_count {
        collection.estimated_document_count(None).await? as u64
    } else {
        collection.count_documents(filter_doc, None).await?
    };

    Ok(QueryResult {
        documents,
        total,
        total_is_estimated: opts.use_estimated_count,
    })
}

/// Runs an extended-JSON aggregation pipeline, returning the same envelope as
/// [`find_documents`] (spec.md §9 "added" note: pass-through, not a builder).
pub async fn aggregate(client: &Client, db: &str, coll: &str, pipeline_json: &str) -> Result<QueryResult, QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let trimmed = pipeline_json.trim();
    if !trimmed.starts_with('[') {
        return Err(QueryError::InvalidFilter("aggregation pipeline must be a JSON array".to_string()));
    }
    let pipeline: Vec<Document> =
        serde_json::from_str(trimmed).map_err(|e| QueryError::InvalidFilter(format!("invalid aggregation pipeline: {e}")))?;

    let collection = client.database(db).collection::<Document>(coll);
    let cursor = collection.aggregate(pipeline, None).await?;
    let docs: Vec<Document> = cursor.try_collect().await?;
    let documents = docs.iter().map(to_canonical_extjson_string).collect();
    let total = documents.len() as u64;
    Ok(QueryResult {
        documents,
        total,
        total_is_estimated: false,
    })
}

/// Count primitive `find_documents` composes (spec.md §9 "added" note).
pub async fn count_documents(client: &Client, db: &str, coll: &str, filter: &str, use_estimated: bool) -> Result<u64, QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let collection = client.database(db).collection::<Document>(coll);
    if use_estimated {
        Ok(collection.estimated_document_count(None).await? as u64)
    } else {
        let filter_doc = parse_object_body(filter)?;
        Ok(collection.count_documents(filter_doc, None).await?)
    }
}

/// Fetches one document by id (spec §4.D Document-ID parser).
pub async fn get_document(client: &Client, db: &str, coll: &str, doc_id: &str) -> Result<String, QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let id = parse_document_id(doc_id).map_err(|e| QueryError::InvalidFilter(e.to_string()))?;
    let collection = client.database(db).collection::<Document>(coll);
    let found = collection
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| QueryError::InvalidFilter(format!("no document with id {doc_id}")))?;
    Ok(to_canonical_extjson_string(&found))
}

/// Inserts a document, returning its `_id` as canonical extended JSON.
pub async fn insert_document(client: &Client, db: &str, coll: &str, document_json: &str) -> Result<String, QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let document = parse_object_body(document_json)?;
    let collection = client.database(db).collection::<Document>(coll);
    let result = collection.insert_one(document, None).await?;
    Ok(to_canonical_extjson(&result.inserted_id).to_string())
}

/// Replaces the whole document identified by `doc_id` with `new_document_json` (spec
/// §4.D: "replace semantics (whole-document)").
pub async fn update_document(client: &Client, db: &str, coll: &str, doc_id: &str, new_document_json: &str) -> Result<(), QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let id = parse_document_id(doc_id).map_err(|e| QueryError::InvalidFilter(e.to_string()))?;
    let replacement = parse_object_body(new_document_json)?;
    let collection = client.database(db).collection::<Document>(coll);
    collection.replace_one(doc! { "_id": id }, replacement, None).await?;
    Ok(())
}

/// Deletes the document identified by `doc_id`.
pub async fn delete_document(client: &Client, db: &str, coll: &str, doc_id: &str) -> Result<(), QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let id = parse_document_id(doc_id).map_err(|e| QueryError::InvalidFilter(e.to_string()))?;
    let collection = client.database(db).collection::<Document>(coll);
    collection.delete_one(doc! { "_id": id }, None).await?;
    Ok(())
}

/// Validates that `s` parses as extended JSON with an object root. Rejects a bare
/// `null` even though it's valid JSON, since a document can never itself be `null`
/// (spec §9: resolved as a bug rather than carried over).
pub fn validate_json(s: &str) -> Result<(), QueryError> {
    parse_object_body(s).map(|_| ())
}

fn parse_object_body(s: &str) -> Result<Document, QueryError> {
    let trimmed = s.trim();
    if trimmed == "null" {
        return Err(QueryError::InvalidFilter("document root must not be null".to_string()));
    }
    serde_json::from_str::<Document>(trimmed).map_err(|e| QueryError::InvalidFilter(e.to_string()))
}

/// Runs `explain` with `executionStats` verbosity over `filter` (spec §4.D).
pub async fn explain_query(client: &Client, db: &str, coll: &str, filter: &str) -> Result<ExplainResult, QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let filter_doc = parse_object_body(filter)?;
    let database = client.database(db);
    let command = doc! {
        "explain": { "find": coll, "filter": filter_doc },
        "verbosity": "executionStats",
    };
    let raw = database.run_command(command, None).await?;

    let winning_plan = raw
        .get_document("queryPlanner")
        .and_then(|qp| qp.get_document("winningPlan"))
        .cloned()
        .unwrap_or_default();
    let top_stage = winning_plan.get_str("stage").unwrap_or("UNKNOWN").to_string();
    let is_collection_scan = top_stage == "COLLSCAN";
    let index_name = find_index_name(&winning_plan);

    let exec_stats = raw.get_document("executionStats").cloned().unwrap_or_default();
    let docs_examined = exec_stats.get_i64("totalDocsExamined").unwrap_or(0);
    let docs_returned = exec_stats.get_i64("nReturned").unwrap_or(0);
    let execution_time_ms = exec_stats.get_i64("executionTimeMillis").unwrap_or(0);

    Ok(ExplainResult {
        winning_plan_summary: format!("{top_stage}{}", index_name.as_deref().map(|n| format!(" using {n}")).unwrap_or_default()),
        top_stage,
        index_name,
        is_collection_scan,
        docs_examined,
        docs_returned,
        execution_time_ms,
        raw: to_canonical_extjson(&Bson::Document(raw)),
    })
}

fn find_index_name(plan: &Document) -> Option<String> {
    if let Ok(name) = plan.get_str("indexName") {
        return Some(name.to_string());
    }
    plan.get_document("inputStage").ok().and_then(find_index_name)
}

/// Runs `collStats` and a bounded, recursively-walked document sample (spec §4.D).
pub async fn get_collection_profile(client: &Client, db: &str, coll: &str) -> Result<CollectionProfile, QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let database = client.database(db);
    let stats = database.run_command(doc! { "collStats": coll }, None).await?;
    let document_count = stats.get_i64("count").unwrap_or(0);
    let storage_size_bytes = stats.get_i64("storageSize").unwrap_or(0);

    let collection = client.database(db).collection::<Document>(coll);
    let mut cursor = collection
        .find(None, FindOptions::builder().limit(PROFILE_SAMPLE_SIZE).build())
        .await?;

    let mut field_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut max_depth = 0u32;
    let mut top_level = std::collections::BTreeSet::new();
    let mut sampled = 0usize;
    while let Some(doc) = cursor.try_next().await? {
        sampled += 1;
        for key in doc.keys() {
            top_level.insert(key.clone());
        }
        walk_fields(&Bson::Document(doc), String::new(), 1, &mut field_counts, &mut max_depth);
    }
    let _ = sampled;

    Ok(CollectionProfile {
        document_count,
        storage_size_bytes,
        field_count: field_counts.len(),
        total_field_paths: field_counts.values().sum(),
        max_nesting_depth: max_depth,
        top_level_fields: top_level.into_iter().collect(),
    })
}

fn walk_fields(value: &Bson, prefix: String, depth: u32, counts: &mut BTreeMap<String, usize>, max_depth: &mut u32) {
    if depth > PROFILE_MAX_DEPTH {
        return;
    }
    *max_depth = (*max_depth).max(depth);
    match value {
        Bson::Document(doc) => {
            for (key, v) in doc {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                *counts.entry(path.clone()).or_insert(0) += 1;
                walk_fields(v, path, depth + 1, counts, max_depth);
            }
        }
        Bson::Array(items) => {
            let path = format!("{prefix}[]");
            for item in items {
                walk_fields(item, path.clone(), depth + 1, counts, max_depth);
            }
        }
        _ => {}
    }
}

/// Lists indexes enriched with `$indexStats` usage counts and `collStats` sizes (spec
/// §4.D).
pub async fn list_indexes(client: &Client, db: &str, coll: &str) -> Result<Vec<IndexInfo>, QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let collection = client.database(db).collection::<Document>(coll);

    let mut indexes = Vec::new();
    let mut cursor = collection.list_indexes(None).await?;
    while let Some(model) = cursor.try_next().await? {
        let name = model.options.as_ref().and_then(|o| o.name.clone()).unwrap_or_default();
        let unique = model.options.as_ref().and_then(|o| o.unique).unwrap_or(false);
        let sparse = model.options.as_ref().and_then(|o| o.sparse).unwrap_or(false);
        indexes.push(IndexInfo {
            name,
            keys: to_canonical_extjson_string(&model.keys),
            unique,
            sparse,
            usage_count: 0,
            size_bytes: 0,
        });
    }

    if let Ok(mut stats_cursor) = collection.aggregate(vec![doc! { "$indexStats": {} }], None).await {
        while let Ok(Some(entry)) = stats_cursor.try_next().await {
            let Ok(name) = entry.get_str("name") else { continue };
            let ops = entry
                .get_document("accesses")
                .and_then(|a| a.get_i64("ops"))
                .unwrap_or(0);
            if let Some(info) = indexes.iter_mut().find(|i| i.name == name) {
                info.usage_count = ops;
            }
        }
    }

    let database = client.database(db);
    if let Ok(stats) = database.run_command(doc! { "collStats": coll }, None).await {
        if let Ok(sizes) = stats.get_document("indexSizes") {
            for info in &mut indexes {
                if let Ok(size) = sizes.get_i64(&info.name) {
                    info.size_bytes = size;
                }
            }
        }
    }

    Ok(indexes)
}

/// Creates an index. `keys` maps field name to direction: `1` ascending, `-1`
/// descending, `0` a text index on that field (spec §4.D).
pub async fn create_index(
    client: &Client,
    db: &str,
    coll: &str,
    keys: &BTreeMap<String, i32>,
    opts: CreateIndexOptions,
) -> Result<String, QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let mut key_doc = Document::new();
    for (field, direction) in keys {
        if *direction == 0 {
            key_doc.insert(field.clone(), "text");
        } else {
            key_doc.insert(field.clone(), *direction);
        }
    }

    let mut options = IndexOptions::default();
    options.unique = Some(opts.unique);
    options.sparse = Some(opts.sparse);
    options.name = opts.name;
    options.expire_after = opts.expire_after_seconds.map(|s| std::time::Duration::from_secs(s as u64));

    let model = IndexModel::builder().keys(key_doc).options(options).build();
    let collection = client.database(db).collection::<Document>(coll);
    let result = collection.create_index(model, None).await?;
    Ok(result.index_name)
}

/// Drops an index by name. Refuses `_id_` (spec §4.D).
pub async fn drop_index(client: &Client, db: &str, coll: &str, name: &str) -> Result<(), QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    if name == "_id_" {
        return Err(QueryError::InvalidFilter("the _id_ index cannot be dropped".to_string()));
    }
    let collection = client.database(db).collection::<Document>(coll);
    collection.drop_index(name, None).await?;
    Ok(())
}

/// Drops an entire database.
pub async fn drop_database(client: &Client, db: &str) -> Result<(), QueryError> {
    validate_database_name(db)?;
    client.database(db).drop(None).await?;
    Ok(())
}

/// Drops a single collection.
pub async fn drop_collection(client: &Client, db: &str, coll: &str) -> Result<(), QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    client.database(db).collection::<Document>(coll).drop(None).await?;
    Ok(())
}

/// Deletes every document in a collection without dropping the collection itself
/// (`deleteMany {}`).
pub async fn clear_collection(client: &Client, db: &str, coll: &str) -> Result<u64, QueryError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let collection = client.database(db).collection::<Document>(coll);
    let result = collection.delete_many(doc! {}, None).await?;
    Ok(result.deleted_count)
}

/// Returns a handle to `db` on `client`, for callers (e.g. the export/import
/// pipelines) that need the raw driver type after name validation.
pub fn validated_database(client: &Client, db: &str) -> Result<Database, QueryError> {
    validate_database_name(db)?;
    Ok(client.database(db))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validate_json_accepts_an_object() {
        assert!(validate_json(r#"{"a": 1}"#).is_ok());
    }

    #[test]
    fn validate_json_rejects_null() {
        assert!(validate_json("null").is_err());
    }

    #[test]
    fn validate_json_rejects_non_object_root() {
        assert!(validate_json("[1, 2, 3]").is_err());
        assert!(validate_json("42").is_err());
    }

    #[test]
    fn walk_fields_respects_max_depth() {
        let mut counts = BTreeMap::new();
        let mut max_depth = 0;
        let nested = doc! { "a": { "b": { "c": 1 } } };
        walk_fields(&Bson::Document(nested), String::new(), 1, &mut counts, &mut max_depth);
        assert_eq!(max_depth, 3);
        assert!(counts.contains_key("a.b.c"));
    }

    #[test]
    fn walk_fields_uses_parent_brackets_for_arrays() {
        let mut counts = BTreeMap::new();
        let mut max_depth = 0;
        let doc_with_array = doc! { "tags": [ { "name": "x" } ] };
        walk_fields(&Bson::Document(doc_with_array), String::new(), 1, &mut counts, &mut max_depth);
        assert!(counts.contains_key("tags[].name"));
    }
}
