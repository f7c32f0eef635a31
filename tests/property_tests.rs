//! Property-based tests for the streaming pipeline.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Splitters lose nothing and cut only on record boundaries
//! - Decoded chunk streams equal the original record stream
//! - Type inference suggests contracts its own validator accepts
//! - Document ids join primary-key values in declared order
//! - Crypto transforms round-trip
//! - Field type names round-trip through parse

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use sluice::config::CryptoSettings;
use sluice::io::splitter_for;
use sluice::io::validation::{decode_csv_chunk, decode_json_chunk, decode_ndjson_chunk};
use sluice::models::{ColumnType, Document, FieldType, FileKind, Template, Transform};
use sluice::{RecordValidator, TransformPipeline};

/// Feeds the input through a splitter in fixed-size windows and
/// collects every payload. Inputs are ASCII so any byte offset is a
/// char boundary.
fn split_in_windows(
    kind: FileKind,
    threshold: usize,
    has_header: bool,
    ndjson: bool,
    input: &str,
    window: usize,
) -> Vec<String> {
    let mut splitter = splitter_for(kind, threshold, has_header, ndjson);
    let mut payloads = Vec::new();
    for piece in input.as_bytes().chunks(window.max(1)) {
        let text = std::str::from_utf8(piece).expect("ASCII input");
        payloads.extend(splitter.feed(text).expect("feed should succeed"));
    }
    if let Some(tail) = splitter.finish().expect("finish should succeed") {
        payloads.push(tail);
    }
    payloads
}

fn csv_rows(names: &[(i64, String)]) -> String {
    let mut text = String::new();
    for (id, name) in names {
        text.push_str(&format!("{id},{name}\n"));
    }
    text
}

fn people_docs(rows: &[(i64, String)]) -> Vec<Document> {
    rows.iter()
        .map(|(id, name)| {
            let mut doc = Document::new();
            doc.insert("id".to_string(), serde_json::json!(id));
            doc.insert("name".to_string(), serde_json::json!(name));
            doc
        })
        .collect()
}

proptest! {
    /// Property: headerless CSV payloads concatenate back to the input,
    /// regardless of window and threshold geometry.
    #[test]
    fn prop_csv_splitter_loses_nothing(
        rows in prop::collection::vec((0i64..1000, "[a-z]{1,8}"), 0..40),
        threshold in 16usize..128,
        window in 1usize..64,
    ) {
        let input = csv_rows(&rows);
        let payloads = split_in_windows(
            FileKind::Csv, threshold, false, false, &input, window,
        );
        for payload in &payloads {
            prop_assert!(payload.ends_with('\n'), "payload not line-aligned: {payload:?}");
        }
        prop_assert_eq!(payloads.concat(), input);
    }

    /// Property: the header row is stripped exactly once, never data.
    #[test]
    fn prop_csv_splitter_strips_only_the_header(
        rows in prop::collection::vec((0i64..1000, "[a-z]{1,8}"), 1..40),
        threshold in 16usize..128,
        window in 1usize..64,
    ) {
        let body = csv_rows(&rows);
        let input = format!("id,name\n{body}");
        let payloads = split_in_windows(
            FileKind::Csv, threshold, true, false, &input, window,
        );
        prop_assert_eq!(payloads.concat(), body);
    }

    /// Property: a JSON array split across chunks decodes to the same
    /// record stream it was built from.
    #[test]
    fn prop_json_array_splitter_preserves_records(
        rows in prop::collection::vec((0i64..1000, "[a-z]{0,8}"), 0..30),
        threshold in 64usize..256,
        window in 1usize..48,
    ) {
        let expected = people_docs(&rows);
        let input = serde_json::to_string(&expected).unwrap();
        let payloads = split_in_windows(
            FileKind::Json, threshold, false, false, &input, window,
        );
        let mut decoded = Vec::new();
        for payload in &payloads {
            decoded.extend(decode_json_chunk(payload).expect("payload should parse"));
        }
        prop_assert_eq!(decoded, expected);
    }

    /// Property: newline-separated JSON splits back into the same
    /// record stream.
    #[test]
    fn prop_ndjson_splitter_preserves_records(
        rows in prop::collection::vec((0i64..1000, "[a-z]{0,8}"), 0..30),
        threshold in 64usize..256,
        window in 1usize..48,
    ) {
        let expected = people_docs(&rows);
        let input: String = expected
            .iter()
            .map(|doc| format!("{}\n", serde_json::to_string(doc).unwrap()))
            .collect();
        let payloads = split_in_windows(
            FileKind::Json, threshold, false, true, &input, window,
        );
        let mut decoded = Vec::new();
        for payload in &payloads {
            decoded.extend(decode_ndjson_chunk(payload).expect("payload should parse"));
        }
        prop_assert_eq!(decoded, expected);
    }

    /// Property: the validator accepts every row of the sample that
    /// produced its suggested column contract.
    #[test]
    fn prop_inference_accepts_its_own_suggestion(
        kinds in prop::collection::vec(0u8..4, 1..5),
        row_count in 1usize..20,
        seed in "[a-z]{1,8}",
    ) {
        let mut names = vec!["c0".to_string()];
        for i in 0..kinds.len() {
            names.push(format!("c{}", i + 1));
        }
        let mut rows: Vec<Vec<String>> = Vec::new();
        for row in 0..row_count {
            let mut cells = vec![row.to_string()];
            for (i, kind) in kinds.iter().enumerate() {
                cells.push(match kind {
                    0 => format!("{}", row as i64 * 7 - 3),
                    1 => format!("{}.{}", row, i + 1),
                    2 => if row % 2 == 0 { "true".to_string() } else { "false".to_string() },
                    _ => format!("{seed}{i}"),
                });
            }
            rows.push(cells);
        }

        let suggested = sluice::schema::infer::suggest_csv_columns(&names, &rows);
        prop_assert_eq!(suggested.len(), names.len());

        let validator = RecordValidator::new(suggested, vec!["c0".to_string()]);
        let payload: String = rows
            .iter()
            .map(|cells| format!("{}\n", cells.join(",")))
            .collect();
        let records = decode_csv_chunk(&payload, &names).expect("rows should decode");
        for (index, mut record) in records.into_iter().enumerate() {
            let outcome = validator.validate(index, &mut record, FileKind::Csv);
            prop_assert!(outcome.is_ok(), "row {} rejected: {:?}", index, outcome.err());
        }
    }

    /// Property: alphabetic text never coerces into a long column.
    #[test]
    fn prop_validator_rejects_unparseable_longs(
        name in "[a-z]{1,8}",
        index in 0usize..10_000,
    ) {
        let mut columns = sluice::models::ColumnTypeSpec::new();
        columns.insert("id".to_string(), ColumnType::scalar(FieldType::Long));
        let validator = RecordValidator::new(columns, vec!["id".to_string()]);

        let mut record = Document::new();
        record.insert("id".to_string(), serde_json::json!(name));
        let err = validator.validate(index, &mut record, FileKind::Csv);
        prop_assert!(err.is_err());
    }

    /// Property: document ids are the primary-key values joined with
    /// the declared delimiter, in declared key order.
    #[test]
    fn prop_document_id_joins_keys_in_order(
        keys in prop::collection::vec(("[a-z]{1,6}", 0i64..1000), 1..4),
        delimiter in prop::sample::select(vec!["-", "::", "|"]),
    ) {
        let mut template = Template::new("people", 1, "local", "people");
        let mut doc = Document::new();
        let mut key_names = Vec::new();
        let mut expected = Vec::new();
        for (i, (text, number)) in keys.iter().enumerate() {
            let key = format!("k{i}");
            if i % 2 == 0 {
                doc.insert(key.clone(), serde_json::json!(text));
                expected.push(text.clone());
            } else {
                doc.insert(key.clone(), serde_json::json!(number));
                expected.push(number.to_string());
            }
            key_names.push(key);
        }
        template = template.with_primary_keys(key_names);
        template.primary_key_delimiter = delimiter.to_string();

        prop_assert_eq!(template.document_id(&doc), expected.join(delimiter));
    }

    /// Property: encrypt then decrypt recovers the original value.
    #[test]
    fn prop_encrypt_decrypt_round_trip(value in "\\PC{0,32}") {
        let crypto = CryptoSettings {
            encryption_key: Some(secrecy::SecretString::from(
                "0123456789abcdef0123456789abcdef".to_string(),
            )),
            ..CryptoSettings::default()
        };
        let pipeline = TransformPipeline::build(
            &[
                Transform::Encrypt { col: "v".to_string() },
                Transform::Decrypt { col: "v".to_string() },
            ],
            &crypto,
        )
        .expect("pipeline should build");

        let mut record = Document::new();
        record.insert("v".to_string(), serde_json::json!(value));
        pipeline.apply(0, &mut record).expect("apply should succeed");
        prop_assert_eq!(
            record.get("v").and_then(serde_json::Value::as_str),
            Some(value.as_str())
        );
    }

    /// Property: renaming a column and renaming it back is identity.
    #[test]
    fn prop_rename_round_trips(value in "[a-z0-9]{0,16}") {
        let pipeline = TransformPipeline::build(
            &[
                Transform::Rename {
                    col: "a".to_string(),
                    new_name: "b".to_string(),
                },
                Transform::Rename {
                    col: "b".to_string(),
                    new_name: "a".to_string(),
                },
            ],
            &CryptoSettings::default(),
        )
        .expect("pipeline should build");

        let mut record = Document::new();
        record.insert("a".to_string(), serde_json::json!(value));
        let expected = record.clone();
        pipeline.apply(0, &mut record).expect("apply should succeed");
        prop_assert_eq!(record, expected);
    }

    /// Property: every field type's name parses back to itself.
    #[test]
    fn prop_field_type_name_round_trips(idx in 0usize..16) {
        let all = FieldType::all();
        if idx < all.len() {
            let kind = all[idx];
            prop_assert_eq!(FieldType::parse(kind.as_str()), Some(kind));
        }
    }

    /// Property: field type parsing is case-insensitive.
    #[test]
    fn prop_field_type_parse_case_insensitive(idx in 0usize..16) {
        let all = FieldType::all();
        if idx < all.len() {
            let name = all[idx].as_str();
            prop_assert_eq!(
                FieldType::parse(&name.to_uppercase()),
                FieldType::parse(name)
            );
        }
    }
}
