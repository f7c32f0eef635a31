//! End-to-end export pipeline tests.
//!
//! Drives `ExportService` against a seeded in-memory store, including
//! the full import-then-export circle, saved queries resolved through
//! the `SQLite` template store, and the crypto transforms.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use secrecy::SecretString;
use serde_json::{Value, json};
use sluice::config::{CryptoSettings, SluiceConfig};
use sluice::models::{
    ColumnType, ColumnTypeSpec, Document, FieldType, FileKind, Template, Transform,
};
use sluice::schema::mapping_for;
use sluice::storage::{
    DocumentStore, MemoryDocumentStore, QuerySource, SqliteTemplateStore, WriteMode,
};
use sluice::{
    Error, ExportFormat, ExportService, ExportSpec, ImportOptions, ImportService,
    TransformPipeline,
};
use std::sync::Arc;
use tempfile::TempDir;

fn doc(pairs: &[(&str, Value)]) -> Document {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn people_columns() -> ColumnTypeSpec {
    let mut columns = ColumnTypeSpec::new();
    columns.insert("id".to_string(), ColumnType::scalar(FieldType::Long));
    columns.insert("name".to_string(), ColumnType::scalar(FieldType::Text));
    columns
}

/// Store pre-loaded with three people plus a field no export declares.
fn seeded_store() -> Arc<MemoryDocumentStore> {
    let store = MemoryDocumentStore::new();
    store
        .put_mapping("people", &mapping_for(&people_columns()))
        .expect("mapping push should succeed");
    store
        .bulk_write(
            "people",
            &[
                (
                    "1".to_string(),
                    doc(&[
                        ("id", json!(1)),
                        ("name", json!("ada")),
                        ("secret", json!("s3cr3t")),
                    ]),
                ),
                ("2".to_string(), doc(&[("id", json!(2)), ("name", json!("grace"))])),
                ("3".to_string(), doc(&[("id", json!(3)), ("name", json!("alan"))])),
            ],
            WriteMode::Upsert,
        )
        .expect("seed write should succeed");
    Arc::new(store)
}

fn people_spec(format: ExportFormat) -> ExportSpec {
    ExportSpec {
        table_name: "people".to_string(),
        format,
        columns: people_columns(),
        transformations: Vec::new(),
        query: Some(json!({ "match_all": {} })),
        query_id: None,
        rank: false,
    }
}

fn service(store: Arc<MemoryDocumentStore>) -> ExportService {
    let queries: Arc<dyn QuerySource> =
        Arc::new(SqliteTemplateStore::in_memory().expect("in-memory sqlite"));
    ExportService::new(store, queries, SluiceConfig::default())
}

#[test]
fn test_csv_export_to_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let service = service(seeded_store());

    let path = dir.path().join("out.csv");
    let summary = service
        .export_to_file(&path, &people_spec(ExportFormat::Csv))
        .expect("Export should succeed");

    assert_eq!(summary.documents, 3);
    let text = std::fs::read_to_string(&path).expect("output should exist");
    assert_eq!(text, "id,name\n1,ada\n2,grace\n3,alan\n");
}

#[test]
fn test_import_then_export_round_trip() {
    let staging = TempDir::new().expect("Failed to create staging dir");
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(MemoryDocumentStore::new());
    let config = SluiceConfig::default().with_staging_root(staging.path());

    let template = Template::new("people", 1, "local", "people")
        .with_original_names(vec!["id".to_string(), "name".to_string()])
        .with_column("id", ColumnType::scalar(FieldType::Long))
        .with_column("name", ColumnType::scalar(FieldType::Text))
        .with_primary_keys(vec!["id".to_string()]);

    let input = "id,name\n1,ada\n2,grace\n3,alan\n";
    let in_path = dir.path().join("in.csv");
    std::fs::write(&in_path, input).expect("Failed to write input");
    ImportService::new(store.clone(), config.clone())
        .upsert_from_file(&in_path, &template, &ImportOptions::new(FileKind::Csv))
        .expect("Import should succeed");

    let spec = ExportSpec::from_template(&template, ExportFormat::Csv)
        .with_query(json!({ "match_all": {} }));
    let queries: Arc<dyn QuerySource> =
        Arc::new(SqliteTemplateStore::in_memory().expect("in-memory sqlite"));
    let mut out = Vec::new();
    ExportService::new(store, queries, config)
        .export(&spec, &mut out)
        .expect("Export should succeed");

    assert_eq!(String::from_utf8(out).unwrap(), input);
}

#[test]
fn test_saved_query_drives_export() {
    let templates = SqliteTemplateStore::in_memory().expect("in-memory sqlite");
    let query_id = templates
        .save_query(&json!({ "term": { "name": "ada" } }))
        .expect("save_query should succeed");

    let queries: Arc<dyn QuerySource> = Arc::new(templates);
    let service = ExportService::new(seeded_store(), queries, SluiceConfig::default());

    let mut spec = people_spec(ExportFormat::Csv);
    spec.query = None;
    let spec = spec.with_query_id(query_id);

    let mut out = Vec::new();
    let summary = service.export(&spec, &mut out).expect("Export should succeed");
    assert_eq!(summary.documents, 1);
    assert_eq!(String::from_utf8(out).unwrap(), "id,name\n1,ada\n");
}

#[test]
fn test_unknown_saved_query_fails() {
    let service = service(seeded_store());
    let mut spec = people_spec(ExportFormat::Csv);
    spec.query = None;
    let spec = spec.with_query_id(999);

    let err = service
        .export(&spec, &mut Vec::new())
        .expect_err("Export should fail");
    assert!(matches!(err, Error::TemplateNotFound(999)), "got: {err}");
}

#[test]
fn test_wrapped_json_export_with_rank() {
    let service = service(seeded_store());
    let spec = people_spec(ExportFormat::JsonObject {
        key: "results".to_string(),
    })
    .with_rank(true);

    let mut out = Vec::new();
    service.export(&spec, &mut out).expect("Export should succeed");

    let parsed: Value = serde_json::from_slice(&out).expect("output should be valid JSON");
    let results = parsed
        .get("results")
        .and_then(Value::as_array)
        .expect("wrapped array");
    assert_eq!(results.len(), 3);
    for (position, item) in results.iter().enumerate() {
        let rank = item.get("rank").and_then(Value::as_u64);
        assert_eq!(rank, Some(position as u64 + 1));
    }
}

#[test]
fn test_pagination_spans_multiple_pages() {
    let service = ExportService::new(
        seeded_store(),
        Arc::new(SqliteTemplateStore::in_memory().expect("in-memory sqlite")),
        SluiceConfig::default().with_batch_size(1),
    );

    let mut out = Vec::new();
    let summary = service
        .export(&people_spec(ExportFormat::Csv), &mut out)
        .expect("Export should succeed");

    assert_eq!(summary.documents, 3, "page size 1 must still visit every doc");
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "id,name\n1,ada\n2,grace\n3,alan\n"
    );
}

#[test]
fn test_export_projects_declared_columns_only() {
    let service = service(seeded_store());
    let mut out = Vec::new();
    service
        .export(&people_spec(ExportFormat::Json), &mut out)
        .expect("Export should succeed");

    let parsed: Value = serde_json::from_slice(&out).expect("output should be valid JSON");
    let docs = parsed.as_array().expect("array output");
    assert!(
        docs.iter().all(|d| d.get("secret").is_none()),
        "undeclared fields must not leak into the export"
    );
}

#[test]
fn test_decrypt_transform_recovers_imported_ciphertext() {
    let crypto = CryptoSettings {
        encryption_key: Some(SecretString::from("0123456789abcdef0123456789abcdef".to_string())),
        ..CryptoSettings::default()
    };

    // Seed a doc whose name field is ciphertext.
    let pipeline = TransformPipeline::build(
        &[Transform::Encrypt {
            col: "name".to_string(),
        }],
        &crypto,
    )
    .expect("pipeline should build");
    let mut sealed = doc(&[("id", json!(1)), ("name", json!("ada"))]);
    pipeline.apply(0, &mut sealed).expect("encrypt should apply");
    assert_ne!(sealed.get("name").unwrap(), &json!("ada"));

    let store = MemoryDocumentStore::new();
    store
        .bulk_write("people", &[("1".to_string(), sealed)], WriteMode::Upsert)
        .expect("seed write should succeed");

    let config = SluiceConfig {
        crypto,
        ..SluiceConfig::default()
    };
    let service = ExportService::new(
        Arc::new(store),
        Arc::new(SqliteTemplateStore::in_memory().expect("in-memory sqlite")),
        config,
    );
    let mut spec = people_spec(ExportFormat::Json);
    spec.transformations = vec![Transform::Decrypt {
        col: "name".to_string(),
    }];

    let mut out = Vec::new();
    service.export(&spec, &mut out).expect("Export should succeed");
    let parsed: Value = serde_json::from_slice(&out).expect("output should be valid JSON");
    let name = parsed[0].get("name").and_then(Value::as_str);
    assert_eq!(name, Some("ada"), "decrypt must recover the plaintext");
}

#[test]
fn test_export_requires_exactly_one_query_source() {
    let both = people_spec(ExportFormat::Csv).with_query_id(1);
    let err = both.validate().expect_err("both sources must be rejected");
    assert!(matches!(err, Error::InvalidInput(_)), "got: {err}");

    let mut neither = people_spec(ExportFormat::Csv);
    neither.query = None;
    let err = neither.validate().expect_err("no source must be rejected");
    assert!(matches!(err, Error::InvalidInput(_)), "got: {err}");
}
