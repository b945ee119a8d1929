//! The Import Pipeline (spec §4.H): `PreviewImportFile`, `DryRunImport`, and the real
//! `ImportDatabases`/`ImportCollections` ingest, all built on the same per-document
//! loop.

use std::{
    collections::BTreeMap,
    io::Read,
    path::Path,
    sync::Arc,
};

use mongodb::{
    bson::{doc, Document},
    Client,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use zip::ZipArchive;

use crate::{
    cancel::{CancelRegistry, CancelToken},
    events::{CompleteEvent, CancelledEvent, CoreEvent, EventEmitter, JobErrorEvent, JobPhase, ProgressEvent},
    export::IndexEntry,
    pause::PauseController,
    query::{validate_collection_name, validate_database_name, NameError},
};

/// Errors from the import pipeline.
#[derive(Debug, Error)]
pub enum ImportError {
    /// A database or collection name failed validation.
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),
    /// A driver operation failed.
    #[error("mongodb error: {0}")]
    MongoDb(#[from] mongodb::error::Error),
    /// Reading the archive or its entries failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The archive did not match its manifest, was not a valid zip, or was missing an
    /// expected entry.
    #[error("archive corrupted: {0}")]
    ArchiveCorrupted(String),
    /// The job was cancelled.
    #[error("import cancelled")]
    Cancelled,
}

impl From<zip::result::ZipError> for ImportError {
    fn from(e: zip::result::ZipError) -> Self {
        ImportError::ArchiveCorrupted(e.to_string())
    }
}

/// Conflict-resolution mode for a target collection that already has documents (spec
/// §4.H).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportMode {
    /// Leave existing documents; duplicate `_id` inserts are counted as skipped, not
    /// surfaced as errors.
    Skip,
    /// Drop the target collection before inserting.
    Override,
}

/// What to import from the archive: an empty collection list means "every collection
/// under that database".
pub type ImportSelection = Vec<(String, Vec<String>)>;

/// `ImportOptions` (spec §4.H).
#[derive(Clone, Debug)]
pub struct ImportOptions {
    /// Path to the archive on disk.
    pub file_path: std::path::PathBuf,
    /// What to import.
    pub selection: ImportSelection,
    /// Conflict mode.
    pub mode: ImportMode,
}

/// `[database -> [collection -> estimated doc count]]` from [`preview_import_file`].
pub type ImportPreview = BTreeMap<String, BTreeMap<String, u64>>;

/// Per-collection ingest counters (spec §4.H).
#[derive(Clone, Debug, Default, Serialize)]
pub struct CollectionImportResult {
    /// Collection name.
    pub name: String,
    /// Documents successfully inserted.
    pub documents_inserted: u64,
    /// Documents skipped due to duplicate `_id` in [`ImportMode::Skip`].
    pub documents_skipped: u64,
    /// NDJSON lines that failed to parse.
    pub documents_parse_error: u64,
    /// Documents dropped from this collection before re-inserting (only set when
    /// [`ImportMode::Override`] found existing documents).
    pub documents_dropped: u64,
    /// Document count in the target collection after ingest.
    pub current_count: u64,
    /// Errors recreating indexes from the archive's `.indexes.json`.
    pub index_errors: Vec<String>,
}

/// Per-database ingest counters (spec §4.H).
#[derive(Clone, Debug, Default, Serialize)]
pub struct DatabaseImportResult {
    /// Database name.
    pub name: String,
    /// Document count across its imported collections after ingest.
    pub current_count: u64,
    /// Per-collection results.
    pub collections: Vec<CollectionImportResult>,
}

/// The full result of an import job (spec §4.H). Counts at all three levels are
/// internally consistent: totals equal the sum over collections.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ImportResult {
    /// Per-database results.
    pub databases: Vec<DatabaseImportResult>,
    /// Total documents inserted across every collection.
    pub documents_inserted: u64,
    /// Total documents skipped across every collection.
    pub documents_skipped: u64,
    /// Total documents dropped by [`ImportMode::Override`] before re-inserting.
    pub documents_dropped: u64,
    /// Non-fatal errors collected during the job (e.g. index-recreation failures are
    /// not included here — they live on each collection's `index_errors`).
    pub errors: Vec<String>,
    /// Whether the job was cancelled before completing every selected collection.
    pub cancelled: bool,
}

/// Opens `file_path` and describes `[database -> [collection -> estimated doc count]]`,
/// preferring the archive's `manifest.json` and falling back to enumerating entries
/// (spec §4.H).
pub fn preview_import_file(file_path: &Path) -> Result<ImportPreview, ImportError> {
    let file = std::fs::File::open(file_path)?;
    let mut archive = ZipArchive::new(file)?;

    if let Ok(mut manifest_entry) = archive.by_name("manifest.json") {
        let mut contents = String::new();
        manifest_entry.read_to_string(&mut contents)?;
        drop(manifest_entry);
        if let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&contents) {
            if let Some(preview) = preview_from_manifest(&manifest) {
                return Ok(preview);
            }
        }
    }

    let mut preview = ImportPreview::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let Some((db_name, coll_name)) = split_ndjson_entry_name(entry.name()) else {
            continue;
        };
        preview.entry(db_name).or_default().insert(coll_name, 0);
    }
    Ok(preview)
}

fn preview_from_manifest(manifest: &serde_json::Value) -> Option<ImportPreview> {
    let databases = manifest.get("databases")?.as_array()?;
    let mut preview = ImportPreview::new();
    for database in databases {
        let name = database.get("name")?.as_str()?.to_string();
        let mut collections = BTreeMap::new();
        for collection in database.get("collections")?.as_array()? {
            let coll_name = collection.get("name")?.as_str()?.to_string();
            let doc_count = collection.get("docCount").and_then(|v| v.as_u64()).unwrap_or(0);
            collections.insert(coll_name, doc_count);
        }
        preview.insert(name, collections);
    }
    Some(preview)
}

fn split_ndjson_entry_name(entry_name: &str) -> Option<(String, String)> {
    let stripped = entry_name.strip_suffix(".ndjson")?;
    let (db_name, coll_name) = stripped.split_once('/')?;
    Some((db_name.to_string(), coll_name.to_string()))
}

/// Runs the full ingest logic without mutating the server: counts what would be
/// inserted/skipped/dropped and emits the same progress events as a real import, but
/// performs no driver writes (spec §4.H).
pub async fn dry_run_import(
    client: &Client,
    opts: &ImportOptions,
    job_id: &str,
    registry: &CancelRegistry,
    emitter: &Arc<dyn EventEmitter>,
) -> Result<ImportResult, ImportError> {
    run_import_job(client, opts, job_id, registry, emitter, true).await
}

/// Executes the real ingest (spec §4.H `ImportDatabases`/`ImportCollections`; both
/// reduce to the same selection-driven loop, scoped by the caller's `opts.selection`).
#[instrument(skip(client, emitter, registry, opts))]
pub async fn run_import(
    client: &Client,
    opts: &ImportOptions,
    job_id: &str,
    registry: &CancelRegistry,
    emitter: &Arc<dyn EventEmitter>,
) -> Result<ImportResult, ImportError> {
    run_import_job(client, opts, job_id, registry, emitter, false).await
}

async fn run_import_job(
    client: &Client,
    opts: &ImportOptions,
    job_id: &str,
    registry: &CancelRegistry,
    emitter: &Arc<dyn EventEmitter>,
    dry_run: bool,
) -> Result<ImportResult, ImportError> {
    let pause = Arc::new(PauseController::new());
    let token = registry.register(job_id.to_string(), pause.clone()).await;

    let result = import_inner(client, opts, job_id, &token, &pause, emitter, dry_run).await;
    registry.deregister(job_id).await;

    match result {
        Ok(mut outcome) => {
            if !dry_run {
                emitter.emit(CoreEvent::ImportComplete(CompleteEvent {
                    job_id: job_id.to_string(),
                    file_path: Some(opts.file_path.display().to_string()),
                    database: String::new(),
                    collection: String::new(),
                }));
            }
            outcome.cancelled = false;
            info!(job_id, dry_run, "import finished");
            Ok(outcome)
        }
        Err(ImportError::Cancelled) => Err(ImportError::Cancelled),
        Err(e) => {
            warn!(job_id, error = %e, "import failed");
            emitter.emit(CoreEvent::ImportError(JobErrorEvent {
                job_id: job_id.to_string(),
                message: e.to_string(),
            }));
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn import_inner(
    client: &Client,
    opts: &ImportOptions,
    job_id: &str,
    token: &CancelToken,
    pause: &PauseController,
    emitter: &Arc<dyn EventEmitter>,
    dry_run: bool,
) -> Result<ImportResult, ImportError> {
    let file = std::fs::File::open(&opts.file_path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut result = ImportResult::default();

    for (db_name, colls) in &opts.selection {
        validate_database_name(db_name)?;
        let mut db_result = DatabaseImportResult {
            name: db_name.clone(),
            ..Default::default()
        };

        let coll_names = if colls.is_empty() {
            entries_for_database(&mut archive, db_name)
        } else {
            colls.clone()
        };

        for coll_name in coll_names {
            validate_collection_name(&coll_name)?;
            match import_collection(client, &mut archive, db_name, &coll_name, opts, job_id, token, pause, emitter, dry_run).await {
                Ok(coll_result) => {
                    result.documents_inserted += coll_result.documents_inserted;
                    result.documents_skipped += coll_result.documents_skipped;
                    result.documents_dropped += coll_result.documents_dropped;
                    db_result.current_count += coll_result.current_count;
                    db_result.collections.push(coll_result);
                }
                Err(ImportError::Cancelled) => {
                    result.cancelled = true;
                    db_result.collections.push(CollectionImportResult {
                        name: coll_name,
                        ..Default::default()
                    });
                    result.databases.push(db_result);
                    emitter.emit(CoreEvent::ImportCancelled(CancelledEvent {
                        job_id: job_id.to_string(),
                        database: db_name.to_string(),
                        collection: String::new(),
                    }));
                    return Ok(result);
                }
                Err(e) => return Err(e),
            }
        }
        result.databases.push(db_result);
    }

    Ok(result)
}

fn entries_for_database<R: std::io::Read + std::io::Seek>(archive: &mut ZipArchive<R>, db_name: &str) -> Vec<String> {
    let prefix = format!("{db_name}/");
    let mut names = Vec::new();
    for i in 0..archive.len() {
        let Ok(entry) = archive.by_index(i) else { continue };
        if let Some(stripped) = entry.name().strip_prefix(&prefix) {
            if let Some(coll_name) = stripped.strip_suffix(".ndjson") {
                names.push(coll_name.to_string());
            }
        }
    }
    names
}

#[allow(clippy::too_many_arguments)]
async fn import_collection<R: std::io::Read + std::io::Seek>(
    client: &Client,
    archive: &mut ZipArchive<R>,
    db_name: &str,
    coll_name: &str,
    opts: &ImportOptions,
    job_id: &str,
    token: &CancelToken,
    pause: &PauseController,
    emitter: &Arc<dyn EventEmitter>,
    dry_run: bool,
) -> Result<CollectionImportResult, ImportError> {
    let collection = client.database(db_name).collection::<Document>(coll_name);
    let mut result = CollectionImportResult {
        name: coll_name.to_string(),
        ..Default::default()
    };

    if opts.mode == ImportMode::Override {
        // Recorded even in a dry run: spec §4.H requires the preview to count what
        // would be dropped, it just skips the actual `drop`.
        result.documents_dropped = collection.estimated_document_count(None).await.unwrap_or(0);
        if !dry_run {
            collection.drop(None).await?;
        }
    }

    let ndjson_path = format!("{db_name}/{coll_name}.ndjson");
    let mut contents = String::new();
    match archive.by_name(&ndjson_path) {
        Ok(mut entry) => {
            entry.read_to_string(&mut contents)?;
        }
        Err(_) => return Ok(result),
    }

    let total_lines = contents.lines().filter(|line| !line.is_empty()).count().max(1) as u64;
    let mut processed: u64 = 0;
    for line in contents.lines() {
        if line.is_empty() {
            continue;
        }
        processed += 1;
        if processed % 100 == 0 {
            if !pause.wait_if_paused(token.as_atomic()).await {
                return Err(ImportError::Cancelled);
            }
            let current = ((processed * 10_000) / total_lines).min(9_999);
            emitter.emit(CoreEvent::ImportProgress(ProgressEvent {
                job_id: job_id.to_string(),
                phase: JobPhase::Downloading,
                database: db_name.to_string(),
                collection: coll_name.to_string(),
                current,
                total: 10_000,
                processed_docs: processed,
            }));
        }

        let document = match serde_json::from_str::<Document>(line) {
            Ok(document) => document,
            Err(_) => {
                result.documents_parse_error += 1;
                continue;
            }
        };

        if dry_run {
            result.documents_inserted += 1;
            continue;
        }

        match collection.insert_one(document, None).await {
            Ok(_) => result.documents_inserted += 1,
            Err(e) if opts.mode == ImportMode::Skip && is_duplicate_key_error(&e) => {
                result.documents_skipped += 1;
            }
            Err(e) => return Err(ImportError::MongoDb(e)),
        }
    }

    if !dry_run {
        result.current_count = collection.estimated_document_count(None).await?;
        recreate_indexes(archive, db_name, coll_name, &collection, &mut result).await;
    }

    Ok(result)
}

fn is_duplicate_key_error(error: &mongodb::error::Error) -> bool {
    matches!(error.kind.as_ref(), mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(we)) if we.code == 11000)
}

async fn recreate_indexes<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    db_name: &str,
    coll_name: &str,
    collection: &mongodb::Collection<Document>,
    result: &mut CollectionImportResult,
) {
    let indexes_path = format!("{db_name}/{coll_name}.indexes.json");
    let Ok(mut entry) = archive.by_name(&indexes_path) else {
        return;
    };
    let mut contents = String::new();
    if entry.read_to_string(&mut contents).is_err() {
        return;
    }
    drop(entry);

    let Ok(specs) = serde_json::from_str::<Vec<IndexEntry>>(&contents) else {
        result.index_errors.push("indexes.json did not parse".to_string());
        return;
    };

    for entry in specs {
        let mut options = mongodb::options::IndexOptions::default();
        options.name = entry.options.name;
        options.unique = entry.options.unique;
        options.sparse = entry.options.sparse;
        options.expire_after = entry.options.expire_after_seconds.map(std::time::Duration::from_secs);

        let keys = entry.key.clone();
        let model = mongodb::IndexModel::builder().keys(entry.key).options(options).build();
        if let Err(e) = collection.create_index(model, None).await {
            result.index_errors.push(format!("{keys}: {e}"));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_ndjson_entry_name_parses_database_and_collection() {
        assert_eq!(
            split_ndjson_entry_name("analytics/events.ndjson"),
            Some(("analytics".to_string(), "events".to_string()))
        );
    }

    #[test]
    fn split_ndjson_entry_name_rejects_non_ndjson_entries() {
        assert_eq!(split_ndjson_entry_name("manifest.json"), None);
        assert_eq!(split_ndjson_entry_name("analytics/events.indexes.json"), None);
    }

    #[test]
    fn preview_from_manifest_reads_doc_counts() {
        let manifest = serde_json::json!({
            "version": "1.0",
            "databases": [{
                "name": "analytics",
                "collections": [{"name": "events", "docCount": 42, "indexCount": 1}]
            }]
        });
        let preview = preview_from_manifest(&manifest).unwrap();
        assert_eq!(preview["analytics"]["events"], 42);
    }
}
