//! The CSV Exporter (spec §4.F): a two-pass, temp-file-spill design. MongoDB
//! documents are not column-oriented, so the full field set can't be known until every
//! document has been seen — pass one discovers it while spilling to a temp file, pass
//! two re-reads that file to emit stable-ordered rows.

use std::{
    collections::BTreeSet,
    io::{BufRead, BufReader, Write},
    path::Path,
    sync::{atomic::AtomicBool, Arc},
};

use futures::stream::TryStreamExt;
use mongodb::{
    bson::{Bson, Document},
    options::FindOptions,
    Client,
};
use thiserror::Error;

use crate::{
    cancel::CancelToken,
    events::{CoreEvent, EventEmitter, JobPhase, ProgressEvent},
    pause::PauseController,
    query::{validate_collection_name, validate_database_name, NameError},
};

/// Errors from the CSV exporter.
#[derive(Debug, Error)]
pub enum CsvExportError {
    /// A database or collection name failed validation.
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),
    /// A driver operation failed.
    #[error("mongodb error: {0}")]
    MongoDb(#[from] mongodb::error::Error),
    /// Temp-file or destination-file I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Writing a CSV row failed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// The operation was cancelled.
    #[error("export cancelled")]
    Cancelled,
}

/// Options controlling a CSV export (spec §4.F).
#[derive(Clone, Debug)]
pub struct CsvExportOptions {
    /// Column delimiter.
    pub delimiter: u8,
    /// Whether to write a header row.
    pub write_header: bool,
    /// Array formatting: `true` joins scalars with `;`, `false` writes a JSON array string.
    pub flatten_arrays: bool,
    /// Filter document, as extended JSON; `None` exports the whole collection.
    pub filter: Option<Document>,
    /// Number of documents/rows between pause/cancel checks and progress events.
    pub checkpoint_interval: u64,
}

impl Default for CsvExportOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            write_header: true,
            flatten_arrays: true,
            filter: None,
            checkpoint_interval: 100,
        }
    }
}

/// Summary returned on a successful export.
#[derive(Clone, Debug)]
pub struct CsvExportSummary {
    /// Number of documents written.
    pub row_count: u64,
    /// Column names, in the order written (`_id` first, then alphabetical).
    pub columns: Vec<String>,
}

/// Streams `coll` to a CSV file at `dest_path` (spec §4.F).
#[allow(clippy::too_many_arguments)]
pub async fn export_collection_to_csv(
    client: &Client,
    db: &str,
    coll: &str,
    dest_path: &Path,
    options: CsvExportOptions,
    job_id: &str,
    emitter: &Arc<dyn EventEmitter>,
    cancel: &CancelToken,
    pause: &PauseController,
) -> Result<CsvExportSummary, CsvExportError> {
    validate_database_name(db)?;
    validate_collection_name(coll)?;
    let collection = client.database(db).collection::<Document>(coll);

    let estimated_total = collection.estimated_document_count(None).await?.max(1);

    let mut spill = tempfile::NamedTempFile::new()?;
    let mut all_fields: BTreeSet<String> = BTreeSet::new();
    let mut processed: u64 = 0;

    let mut cursor = collection
        .find(options.filter.clone().unwrap_or_default(), FindOptions::builder().batch_size(500).build())
        .await?;

    while let Some(document) = cursor.try_next().await? {
        for key in flattened_keys(&document) {
            all_fields.insert(key);
        }
        writeln!(spill, "{}", serde_json::to_string(&document).unwrap_or_default())?;
        processed += 1;

        if processed % options.checkpoint_interval == 0 {
            if !pause.wait_if_paused(cancel.as_atomic()).await {
                return Err(CsvExportError::Cancelled);
            }
            let percent = ((processed * 80) / estimated_total).min(80);
            emitter.emit(CoreEvent::ExportProgress(ProgressEvent {
                job_id: job_id.to_string(),
                phase: JobPhase::Downloading,
                database: db.to_string(),
                collection: coll.to_string(),
                current: percent,
                total: 100,
                processed_docs: processed,
            }));
        }
    }

    let mut columns: Vec<String> = Vec::with_capacity(all_fields.len());
    if all_fields.remove("_id") {
        columns.push("_id".to_string());
    }
    columns.extend(all_fields.into_iter());

    let mut writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .from_path(dest_path)?;
    if options.write_header {
        writer.write_record(&columns)?;
    }

    let reader = BufReader::with_capacity(16 * 1024 * 1024, std::fs::File::open(spill.path())?);
    let mut row_count: u64 = 0;
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let Ok(document) = serde_json::from_str::<Document>(&line) else {
            continue;
        };
        let flat = flatten_document(&document);
        let row: Vec<String> = columns
            .iter()
            .map(|col| flat.get(col).map(|v| format_value(v, options.flatten_arrays)).unwrap_or_default())
            .collect();
        writer.write_record(&row)?;
        row_count += 1;

        if row_count % options.checkpoint_interval == 0 {
            if !pause.wait_if_paused(cancel.as_atomic()).await {
                return Err(CsvExportError::Cancelled);
            }
            let percent = 80 + ((row_count * 20) / processed.max(1)).min(20);
            emitter.emit(CoreEvent::ExportProgress(ProgressEvent {
                job_id: job_id.to_string(),
                phase: JobPhase::Writing,
                database: db.to_string(),
                collection: coll.to_string(),
                current: percent,
                total: 100,
                processed_docs: row_count,
            }));
        }
    }
    writer.flush()?;
    spill.close()?;

    Ok(CsvExportSummary { row_count, columns })
}

fn flattened_keys(document: &Document) -> Vec<String> {
    flatten_document(document).into_keys().collect()
}

/// Flattens nested objects into dot-notation keys. Arrays are *not* indexed into
/// separate columns — the whole array value is formatted by [`format_value`] instead.
fn flatten_document(document: &Document) -> std::collections::BTreeMap<String, Bson> {
    let mut out = std::collections::BTreeMap::new();
    flatten_into(document, String::new(), &mut out);
    out
}

fn flatten_into(document: &Document, prefix: String, out: &mut std::collections::BTreeMap<String, Bson>) {
    for (key, value) in document {
        let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
        match value {
            Bson::Document(nested) => flatten_into(nested, path, out),
            other => {
                out.insert(path, other.clone());
            }
        }
    }
}

fn format_value(value: &Bson, flatten_arrays: bool) -> String {
    match value {
        Bson::Null => String::new(),
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(n) => n.to_string(),
        Bson::Boolean(b) => b.to_string(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        Bson::Binary(bin) => format!("Binary({:x})", u8::from(bin.subtype)),
        Bson::Array(items) => {
            if flatten_arrays && items.iter().all(is_scalar) {
                items.iter().map(|v| format_value(v, flatten_arrays)).collect::<Vec<_>>().join(";")
            } else {
                serde_json::to_string(&Bson::Array(items.clone()).into_relaxed_extjson()).unwrap_or_default()
            }
        }
        other => serde_json::to_string(&other.clone().into_relaxed_extjson()).unwrap_or_default(),
    }
}

fn is_scalar(value: &Bson) -> bool {
    !matches!(value, Bson::Document(_) | Bson::Array(_))
}

#[cfg(test)]
mod test {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn flatten_document_uses_dot_notation_for_nested_objects() {
        let document = doc! { "address": { "city": "Berlin" }, "name": "a" };
        let flat = flatten_document(&document);
        assert_eq!(flat.get("address.city"), Some(&Bson::String("Berlin".to_string())));
        assert_eq!(flat.get("name"), Some(&Bson::String("a".to_string())));
    }

    #[test]
    fn format_value_flattens_scalar_arrays_with_semicolons() {
        let value = Bson::Array(vec![Bson::String("a".to_string()), Bson::String("b".to_string())]);
        assert_eq!(format_value(&value, true), "a;b");
    }

    #[test]
    fn format_value_writes_json_array_when_flattening_disabled() {
        let value = Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)]);
        assert_eq!(format_value(&value, false), "[1,2]");
    }

    #[test]
    fn format_value_writes_object_id_as_hex() {
        let oid = mongodb::bson::oid::ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(format_value(&Bson::ObjectId(oid), true), "507f1f77bcf86cd799439011");
    }
}
