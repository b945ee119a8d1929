//! The Export Pipeline (spec §4.G): streams any subset of `{database -> [collection]}`
//! of one connection into a ZIP archive at a user-chosen path.

use std::{fs::File, io::Write, path::Path, sync::Arc};

use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    options::FindOptions,
    Client,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use zip::{write::SimpleFileOptions, ZipWriter};

use crate::{
    cancel::{CancelRegistry, CancelToken},
    events::{CompleteEvent, CancelledEvent, CoreEvent, EventEmitter, JobPhase, ProgressEvent},
    pause::PauseController,
    query::{to_canonical_extjson_string, validate_collection_name, validate_database_name, NameError},
};

/// Errors from the export pipeline.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A database or collection name failed validation.
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),
    /// A driver operation failed.
    #[error("mongodb error: {0}")]
    MongoDb(#[from] mongodb::error::Error),
    /// Writing the archive or its temporary files failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The zip writer failed to finalize the archive.
    #[error("zip error: {0}")]
    Zip(String),
    /// The job was cancelled. Not a failure — the caller should emit `export:cancelled`,
    /// not `export:error`.
    #[error("export cancelled")]
    Cancelled,
}

impl From<zip::result::ZipError> for ExportError {
    fn from(e: zip::result::ZipError) -> Self {
        ExportError::Zip(e.to_string())
    }
}

/// Selection of what to export: every named collection under each database; an empty
/// collection list means "every collection in that database".
pub type ExportSelection = Vec<(String, Vec<String>)>;

const MANIFEST_VERSION: &str = "1.0";

#[derive(Serialize)]
struct Manifest {
    version: &'static str,
    databases: Vec<ManifestDatabase>,
}

#[derive(Serialize)]
struct ManifestDatabase {
    name: String,
    collections: Vec<ManifestCollection>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestCollection {
    name: String,
    doc_count: u64,
    index_count: u64,
}

/// One index entry in `<collection>.indexes.json`: the key spec alongside the options
/// that matter for recreating it faithfully (spec §6). Shared with the import
/// pipeline, which reads back what this module writes.
#[derive(Serialize, serde::Deserialize)]
pub(crate) struct IndexEntry {
    pub(crate) key: Document,
    pub(crate) options: IndexEntryOptions,
}

#[derive(Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IndexEntryOptions {
    pub(crate) name: Option<String>,
    pub(crate) unique: Option<bool>,
    pub(crate) sparse: Option<bool>,
    pub(crate) expire_after_seconds: Option<u64>,
}

/// Builds the export job id: `"export-<db-or-all>-<unix-nanos>"` (spec §4.G).
pub fn job_id(selection: &ExportSelection, unix_nanos: u128) -> String {
    let db_part = match selection {
        [(only_db, _)] => only_db.clone(),
        _ => "all".to_string(),
    };
    format!("export-{db_part}-{unix_nanos}")
}

/// Runs an export job to completion, registering it in `registry` for the duration and
/// deregistering on every terminal outcome (success, cancel, or error).
#[instrument(skip(client, emitter, registry, dest_path))]
pub async fn run_export(
    client: &Client,
    selection: &ExportSelection,
    dest_path: &Path,
    job_id: &str,
    registry: &CancelRegistry,
    emitter: &Arc<dyn EventEmitter>,
) -> Result<(), ExportError> {
    let pause = Arc::new(PauseController::new());
    let token = registry.register(job_id.to_string(), pause.clone()).await;

    let result = export_inner(client, selection, dest_path, job_id, &token, &pause, emitter).await;

    registry.deregister(job_id).await;

    match result {
        Ok(()) => {
            info!(job_id, "export complete");
            Ok(())
        }
        Err(ExportError::Cancelled) => {
            let _ = std::fs::remove_file(dest_path);
            info!(job_id, "export cancelled, partial archive removed");
            Err(ExportError::Cancelled)
        }
        Err(e) => {
            warn!(job_id, error = %e, "export failed");
            Err(e)
        }
    }
}

async fn export_inner(
    client: &Client,
    selection: &ExportSelection,
    dest_path: &Path,
    job_id: &str,
    token: &CancelToken,
    pause: &PauseController,
    emitter: &Arc<dyn EventEmitter>,
) -> Result<(), ExportError> {
    let file = File::create(dest_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut manifest = Manifest {
        version: MANIFEST_VERSION,
        databases: Vec::new(),
    };

    for (db_name, collections) in selection {
        validate_database_name(db_name)?;
        let database = client.database(db_name);
        let coll_names = if collections.is_empty() {
            database.list_collection_names(None).await?
        } else {
            collections.clone()
        };

        let mut manifest_collections = Vec::new();
        for coll_name in &coll_names {
            validate_collection_name(coll_name)?;
            let (doc_count, index_count) = stream_collection(
                client,
                db_name,
                coll_name,
                &mut zip,
                options,
                job_id,
                token,
                pause,
                emitter,
            )
            .await?;
            manifest_collections.push(ManifestCollection {
                name: coll_name.clone(),
                doc_count,
                index_count,
            });
        }
        manifest.databases.push(ManifestDatabase {
            name: db_name.clone(),
            collections: manifest_collections,
        });
    }

    zip.start_file("manifest.json", options)?;
    zip.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())?;
    zip.finish()?;

    emitter.emit(CoreEvent::ExportComplete(CompleteEvent {
        job_id: job_id.to_string(),
        file_path: Some(dest_path.display().to_string()),
        database: manifest_db_label(selection),
        collection: String::new(),
    }));

    Ok(())
}

fn manifest_db_label(selection: &ExportSelection) -> String {
    match selection {
        [(only_db, _)] => only_db.clone(),
        _ => String::new(),
    }
}

#[allow(clippy::too_many_arguments)]
async fn stream_collection<W: std::io::Write + std::io::Seek>(
    client: &Client,
    db_name: &str,
    coll_name: &str,
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    job_id: &str,
    token: &CancelToken,
    pause: &PauseController,
    emitter: &Arc<dyn EventEmitter>,
) -> Result<(u64, u64), ExportError> {
    let collection = client.database(db_name).collection::<Document>(coll_name);
    let estimated_total = collection.estimated_document_count(None).await?.max(1);

    zip.start_file(format!("{db_name}/{coll_name}.ndjson"), options)?;
    let mut cursor = collection.find(doc! {}, FindOptions::builder().batch_size(500).build()).await?;
    let mut doc_count: u64 = 0;
    while let Some(document) = cursor.try_next().await? {
        if doc_count % 100 == 0 {
            if !pause.wait_if_paused(token.as_atomic()).await {
                cancel_cleanup(emitter, job_id, db_name, coll_name);
                return Err(ExportError::Cancelled);
            }
            let current = ((doc_count * 10_000) / estimated_total as u64).min(9_999);
            emitter.emit(CoreEvent::ExportProgress(ProgressEvent {
                job_id: job_id.to_string(),
                phase: JobPhase::Downloading,
                database: db_name.to_string(),
                collection: coll_name.to_string(),
                current,
                total: 10_000,
                processed_docs: doc_count,
            }));
        }
        writeln!(zip, "{}", to_canonical_extjson_string(&document))?;
        doc_count += 1;
    }

    let indexes: Vec<IndexEntry> = collection
        .list_indexes(None)
        .await?
        .try_filter(|model| {
            let keep = model.options.as_ref().and_then(|o| o.name.as_deref()) != Some("_id_");
            futures::future::ready(keep)
        })
        .try_fold(Vec::new(), |mut acc, model| async move {
            let opts = model.options.unwrap_or_default();
            acc.push(IndexEntry {
                key: model.keys,
                options: IndexEntryOptions {
                    name: opts.name,
                    unique: opts.unique,
                    sparse: opts.sparse,
                    expire_after_seconds: opts.expire_after.map(|d| d.as_secs()),
                },
            });
            Ok(acc)
        })
        .await?;
    let index_count = indexes.len() as u64;

    zip.start_file(format!("{db_name}/{coll_name}.indexes.json"), options)?;
    zip.write_all(serde_json::to_string_pretty(&indexes)?.as_bytes())?;

    emitter.emit(CoreEvent::ExportProgress(ProgressEvent {
        job_id: job_id.to_string(),
        phase: JobPhase::Writing,
        database: db_name.to_string(),
        collection: coll_name.to_string(),
        current: 10_000,
        total: 10_000,
        processed_docs: doc_count,
    }));

    Ok((doc_count, index_count))
}

fn cancel_cleanup(emitter: &Arc<dyn EventEmitter>, job_id: &str, db_name: &str, coll_name: &str) {
    emitter.emit(CoreEvent::ExportCancelled(CancelledEvent {
        job_id: job_id.to_string(),
        database: db_name.to_string(),
        collection: coll_name.to_string(),
    }));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn job_id_uses_the_single_database_name_when_selection_is_scoped() {
        let selection: ExportSelection = vec![("analytics".to_string(), vec!["events".to_string()])];
        assert_eq!(job_id(&selection, 1_700_000_000_000_000_000), "export-analytics-1700000000000000000");
    }

    #[test]
    fn job_id_uses_all_when_selection_spans_multiple_databases() {
        let selection: ExportSelection = vec![
            ("analytics".to_string(), vec![]),
            ("billing".to_string(), vec![]),
        ];
        assert_eq!(job_id(&selection, 42), "export-all-42");
    }

    #[test]
    fn manifest_version_serializes_as_the_string_1_0() {
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            databases: Vec::new(),
        };
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains(r#""version":"1.0""#));
    }

    #[test]
    fn index_entry_round_trips_options_through_json() {
        let entry = IndexEntry {
            key: doc! { "email": 1 },
            options: IndexEntryOptions {
                name: Some("email_1".to_string()),
                unique: Some(true),
                sparse: Some(false),
                expire_after_seconds: None,
            },
        };
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: IndexEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.options.name.as_deref(), Some("email_1"));
        assert_eq!(parsed.options.unique, Some(true));
    }
}
