//! End-to-end scenarios against a live MongoDB. Skipped entirely when
//! `MONGOPAL_TEST_MONGODB_URI` is not set in the environment.

mod common;

use std::sync::Arc;

use mongopal_core::{
    cancel::CancelRegistry,
    events::{CoreEvent, EventEmitter},
    export::{self, ExportSelection},
    import::{self, ImportMode, ImportOptions},
    query,
};

struct RecordingEmitter {
    events: tokio::sync::Mutex<Vec<CoreEvent>>,
}

impl RecordingEmitter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: tokio::sync::Mutex::new(Vec::new()),
        })
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, event: CoreEvent) {
        if let Ok(mut events) = self.events.try_lock() {
            events.push(event);
        }
    }
}

#[tokio::test]
async fn insert_then_get_document_round_trips_extended_json() {
    let Some(client) = common::test_client().await else {
        eprintln!("skipping: MONGOPAL_TEST_MONGODB_URI not set");
        return;
    };
    let db = common::unique_name("mongopal_test_db");
    let coll = "widgets";

    let inserted_id_json = query::insert_document(&client, &db, coll, r#"{"name": "left-handed widget", "qty": 4}"#)
        .await
        .expect("insert should succeed");

    let id: serde_json::Value = serde_json::from_str(&inserted_id_json).expect("inserted id is valid json");
    let oid = id.get("$oid").and_then(|v| v.as_str()).expect("insert produced an ObjectId");

    let fetched = query::get_document(&client, &db, coll, oid).await.expect("get_document should find the row");
    assert!(fetched.contains("left-handed widget"));

    query::drop_database(&client, &db).await.expect("cleanup should succeed");
}

#[tokio::test]
async fn export_then_import_round_trips_documents() {
    let Some(client) = common::test_client().await else {
        eprintln!("skipping: MONGOPAL_TEST_MONGODB_URI not set");
        return;
    };
    let db = common::unique_name("mongopal_export_test");
    let coll = "events";

    for i in 0..5 {
        query::insert_document(&client, &db, coll, &format!(r#"{{"seq": {i}}}"#))
            .await
            .unwrap();
    }

    let registry = CancelRegistry::new();
    let emitter: Arc<dyn EventEmitter> = RecordingEmitter::new();
    let dest = std::env::temp_dir().join(format!("{db}.zip"));
    let selection: ExportSelection = vec![(db.clone(), vec![coll.to_string()])];
    let job = export::job_id(&selection, 1);

    export::run_export(&client, &selection, &dest, &job, &registry, &emitter)
        .await
        .expect("export should succeed");
    assert!(dest.exists());

    query::drop_database(&client, &db).await.unwrap();

    let import_opts = ImportOptions {
        file_path: dest.clone(),
        selection: vec![(db.clone(), vec![coll.to_string()])],
        mode: ImportMode::Skip,
    };
    let import_job = "import-test-1";
    let result = import::run_import(&client, &import_opts, import_job, &registry, &emitter)
        .await
        .expect("import should succeed");
    assert_eq!(result.documents_inserted, 5);

    let after = query::count_documents(&client, &db, coll, "{}", false).await.unwrap();
    assert_eq!(after, 5);

    query::drop_database(&client, &db).await.unwrap();
    let _ = std::fs::remove_file(&dest);
}

#[tokio::test]
async fn import_skip_mode_counts_duplicate_ids_as_skipped_not_errors() {
    let Some(client) = common::test_client().await else {
        eprintln!("skipping: MONGOPAL_TEST_MONGODB_URI not set");
        return;
    };
    let db = common::unique_name("mongopal_skip_test");
    let coll = "accounts";

    let inserted_id = query::insert_document(&client, &db, coll, r#"{"balance": 100}"#).await.unwrap();
    let id_value: serde_json::Value = serde_json::from_str(&inserted_id).unwrap();
    let oid = id_value.get("$oid").and_then(|v| v.as_str()).unwrap().to_string();

    let registry = CancelRegistry::new();
    let emitter: Arc<dyn EventEmitter> = RecordingEmitter::new();
    let dest = std::env::temp_dir().join(format!("{db}.zip"));
    let selection: ExportSelection = vec![(db.clone(), vec![coll.to_string()])];
    let job = export::job_id(&selection, 2);
    export::run_export(&client, &selection, &dest, &job, &registry, &emitter).await.unwrap();

    // The collection still has its original document (id `oid` untouched); importing
    // the same archive back in skip mode must not duplicate it.
    let opts = ImportOptions {
        file_path: dest.clone(),
        selection: vec![(db.clone(), vec![coll.to_string()])],
        mode: ImportMode::Skip,
    };
    let result = import::run_import(&client, &opts, "import-skip-test", &registry, &emitter).await.unwrap();
    assert_eq!(result.documents_skipped, 1);
    assert_eq!(result.documents_inserted, 0);

    let count = query::count_documents(&client, &db, coll, "{}", false).await.unwrap();
    assert_eq!(count, 1);
    let _ = oid;

    query::drop_database(&client, &db).await.unwrap();
    let _ = std::fs::remove_file(&dest);
}
