//! `SQLite` template store integration tests.
//!
//! Exercises the on-disk store through its public traits: CRUD,
//! filtered listing, saved queries, and persistence across reopen.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use serde_json::json;
use sluice::Error;
use sluice::models::{ColumnType, FieldType, Template, TemplateFilter, Transform};
use sluice::storage::{QuerySource, SqliteTemplateStore, TemplateStore};
use tempfile::TempDir;

fn people_template(name: &str, table: &str) -> Template {
    Template::new(name, 1, "local", table)
        .with_original_names(vec!["id".to_string(), "name".to_string()])
        .with_column("id", ColumnType::scalar(FieldType::Long))
        .with_column("name", ColumnType::scalar(FieldType::Text))
        .with_primary_keys(vec!["id".to_string()])
}

#[test]
fn test_save_and_get_round_trip() {
    let store = SqliteTemplateStore::in_memory().expect("in-memory sqlite");

    let mut template = people_template("people-import", "people").with_transform(
        Transform::Rename {
            col: "name".to_string(),
            new_name: "full_name".to_string(),
        },
    );
    template.primary_key_delimiter = "::".to_string();

    let saved = store.save(&template).expect("save should succeed");
    let id = saved.id.expect("save assigns an id");

    let loaded = store
        .get(id)
        .expect("get should succeed")
        .expect("template should exist");
    assert_eq!(loaded.name, "people-import");
    assert_eq!(loaded.table_name, "people");
    assert_eq!(loaded.primary_key_delimiter, "::");
    assert_eq!(loaded.column_types.len(), 2);
    assert_eq!(loaded.transformations.len(), 1);
    assert!(matches!(loaded.transformations[0], Transform::Rename { .. }));
}

#[test]
fn test_save_ignores_incoming_id() {
    let store = SqliteTemplateStore::in_memory().expect("in-memory sqlite");

    let mut template = people_template("first", "people");
    template.id = Some(4242);
    let saved = store.save(&template).expect("save should succeed");
    assert_eq!(saved.id, Some(1), "ids come from the database");

    let second = store
        .save(&people_template("second", "people"))
        .expect("save should succeed");
    assert_eq!(second.id, Some(2));
}

#[test]
fn test_invalid_template_is_rejected_on_save() {
    let store = SqliteTemplateStore::in_memory().expect("in-memory sqlite");

    // No declared columns and no primary keys.
    let bare = Template::new("bare", 1, "local", "people");
    let err = store.save(&bare).expect_err("save should fail");
    assert!(matches!(err, Error::InvalidInput(_)), "got: {err}");
}

#[test]
fn test_list_honors_filters() {
    let store = SqliteTemplateStore::in_memory().expect("in-memory sqlite");

    store
        .save(&people_template("people-in", "people"))
        .expect("save should succeed");
    let mut people_out = people_template("people-out", "people");
    people_out.export = true;
    store.save(&people_out).expect("save should succeed");
    let mut orders = people_template("orders-in", "orders");
    orders.store_id = 2;
    store.save(&orders).expect("save should succeed");

    let all = store.list(&TemplateFilter::new()).expect("list all");
    assert_eq!(all.len(), 3);

    let exports = store
        .list(&TemplateFilter::new().with_export(true))
        .expect("list exports");
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].name, "people-out");

    let imports = store
        .list(&TemplateFilter::new().with_export(false))
        .expect("list imports");
    assert_eq!(imports.len(), 2);

    let by_table = store
        .list(&TemplateFilter::new().with_table_name("orders"))
        .expect("list by table");
    assert_eq!(by_table.len(), 1);
    assert_eq!(by_table[0].name, "orders-in");

    let by_store = store
        .list(&TemplateFilter::new().with_store_id(2).with_table_name("orders"))
        .expect("list by store and table");
    assert_eq!(by_store.len(), 1);
}

#[test]
fn test_update_overwrites_in_place() {
    let store = SqliteTemplateStore::in_memory().expect("in-memory sqlite");

    let saved = store
        .save(&people_template("people", "people"))
        .expect("save should succeed");
    let id = saved.id.unwrap();

    let mut changed = saved;
    changed.name = "renamed".to_string();
    changed.export = true;
    store.update(&changed).expect("update should succeed");

    let loaded = store.get(id).unwrap().expect("template should exist");
    assert_eq!(loaded.name, "renamed");
    assert!(loaded.export);
}

#[test]
fn test_update_unknown_id_fails() {
    let store = SqliteTemplateStore::in_memory().expect("in-memory sqlite");

    let mut template = people_template("ghost", "people");
    template.id = Some(99);
    let err = store.update(&template).expect_err("update should fail");
    assert!(matches!(err, Error::TemplateNotFound(99)), "got: {err}");
}

#[test]
fn test_delete_reports_whether_anything_existed() {
    let store = SqliteTemplateStore::in_memory().expect("in-memory sqlite");

    let saved = store
        .save(&people_template("doomed", "people"))
        .expect("save should succeed");
    let id = saved.id.unwrap();

    assert!(store.delete(id).expect("delete should succeed"));
    assert!(!store.delete(id).expect("second delete should succeed"));
    assert!(store.get(id).expect("get should succeed").is_none());
}

#[test]
fn test_saved_query_round_trip() {
    let store = SqliteTemplateStore::in_memory().expect("in-memory sqlite");

    let body = json!({ "term": { "name": "ada" } });
    let id = store.save_query(&body).expect("save_query should succeed");

    let loaded = store
        .query_for(id)
        .expect("query_for should succeed")
        .expect("query should exist");
    assert_eq!(loaded, body);

    assert!(
        store.query_for(id + 1).expect("lookup should succeed").is_none(),
        "unknown query ids resolve to None"
    );
}

#[test]
fn test_data_survives_reopen() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("templates.db");

    let id = {
        let store = SqliteTemplateStore::new(&db_path).expect("open should succeed");
        store
            .save(&people_template("durable", "people"))
            .expect("save should succeed")
            .id
            .unwrap()
    };

    let reopened = SqliteTemplateStore::new(&db_path).expect("reopen should succeed");
    let loaded = reopened
        .get(id)
        .expect("get should succeed")
        .expect("template should persist");
    assert_eq!(loaded.name, "durable");
}
