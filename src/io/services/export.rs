//! Streaming export jobs.
//!
//! An export walks a store query page by page and serializes each
//! document through a format sink: project to the declared columns,
//! run the transform pipeline, optionally attach a result rank, write.
//! Output is streamed, so an export never holds more than one page of
//! documents in memory.

use crate::config::SluiceConfig;
use crate::io::pipeline::TransformPipeline;
use crate::io::writers::{CsvSink, DocSink, ExportFormat, JsonSink};
use crate::models::{ColumnTypeSpec, ExportSummary, Template, Transform, validate_table_name};
use crate::storage::{DocumentStore, QuerySource};
use crate::{Error, Result};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// One export job: where to read, what to keep, and how to render it.
#[derive(Debug, Clone)]
pub struct ExportSpec {
    /// Source table.
    pub table_name: String,
    /// Output format.
    pub format: ExportFormat,
    /// Columns to keep; everything else is dropped from each document.
    pub columns: ColumnTypeSpec,
    /// Transform pipeline applied to each document on the way out.
    pub transformations: Vec<Transform>,
    /// Inline query body; mutually exclusive with `query_id`.
    pub query: Option<Value>,
    /// Saved query id; mutually exclusive with `query`.
    pub query_id: Option<i64>,
    /// Attach a 1-based `rank` field to each document in result order.
    pub rank: bool,
}

impl ExportSpec {
    /// Builds a spec from a stored template, with no query selected yet.
    #[must_use]
    pub fn from_template(template: &Template, format: ExportFormat) -> Self {
        Self {
            table_name: template.table_name.clone(),
            format,
            columns: template.column_types.clone(),
            transformations: template.transformations.clone(),
            query: None,
            query_id: None,
            rank: false,
        }
    }

    /// Sets the inline query body.
    #[must_use]
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Sets the saved query id.
    #[must_use]
    pub const fn with_query_id(mut self, id: i64) -> Self {
        self.query_id = Some(id);
        self
    }

    /// Enables or disables the rank field.
    #[must_use]
    pub const fn with_rank(mut self, rank: bool) -> Self {
        self.rank = rank;
        self
    }

    /// Checks the request before the store is touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the table name is invalid,
    /// no column is declared, a transform is malformed, or the query
    /// selection is not exactly one of inline body and saved id.
    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.table_name)?;
        if self.columns.is_empty() {
            return Err(Error::InvalidInput(
                "an export needs at least one column".to_string(),
            ));
        }
        for transform in &self.transformations {
            transform.validate()?;
        }
        match (&self.query, self.query_id) {
            (Some(_), Some(_)) => Err(Error::InvalidInput(
                "an export takes either an inline query or a saved query id, not both".to_string(),
            )),
            (None, None) => Err(Error::InvalidInput(
                "an export needs an inline query or a saved query id".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Service streaming store query results out as CSV or JSON.
pub struct ExportService {
    store: Arc<dyn DocumentStore>,
    queries: Arc<dyn QuerySource>,
    config: SluiceConfig,
}

impl ExportService {
    /// Creates a new export service.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        queries: Arc<dyn QuerySource>,
        config: SluiceConfig,
    ) -> Self {
        Self {
            store,
            queries,
            config,
        }
    }

    /// Exports to a file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created, plus everything
    /// [`export`](Self::export) returns.
    pub fn export_to_file(&self, path: &Path, spec: &ExportSpec) -> Result<ExportSummary> {
        let file = std::fs::File::create(path).map_err(|e| Error::OperationFailed {
            operation: "create_export_file".to_string(),
            cause: e.to_string(),
        })?;
        self.export(spec, std::io::BufWriter::new(file))
    }

    /// Runs one export job, writing serialized documents to `out`.
    ///
    /// Documents stream through in store result order; an empty result
    /// still produces valid output (a CSV header row, an empty JSON
    /// array).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a bad spec,
    /// [`Error::TemplateNotFound`] when a saved query id does not
    /// resolve, and [`Error::OperationFailed`] for store or write
    /// failures.
    pub fn export<W: Write>(&self, spec: &ExportSpec, out: W) -> Result<ExportSummary> {
        let _span = tracing::info_span!("export.job", table = %spec.table_name).entered();
        spec.validate()?;
        let query = self.resolve_query(spec)?;
        let pipeline = TransformPipeline::build(&spec.transformations, &self.config.crypto)?;
        tracing::info!(
            table = %spec.table_name,
            format = %spec.format,
            "export job started"
        );

        let mut columns: Vec<String> = spec.columns.keys().cloned().collect();
        if spec.rank {
            columns.push("rank".to_string());
        }
        let mut sink = sink_for(&spec.format, columns, out);

        let mut documents = 0usize;
        let mut cursor: Option<String> = None;
        loop {
            let page = self.store.read_page(
                &spec.table_name,
                Some(&query),
                cursor.as_deref(),
                self.config.batch_size.max(1),
            )?;
            if page.docs.is_empty() {
                break;
            }
            for mut doc in page.docs {
                doc.retain(|key, _| spec.columns.contains_key(key));
                pipeline.apply(documents, &mut doc)?;
                documents += 1;
                if spec.rank {
                    doc.insert("rank".to_string(), Value::from(documents));
                }
                sink.write(&doc)?;
            }
            let Some(next) = page.cursor else { break };
            cursor = Some(next);
        }
        sink.finalize()?;

        metrics::counter!("export_jobs_total").increment(1);
        metrics::counter!("export_documents_total").increment(documents as u64);
        tracing::info!(table = %spec.table_name, documents, "export job done");
        Ok(ExportSummary { documents })
    }

    fn resolve_query(&self, spec: &ExportSpec) -> Result<Value> {
        if let Some(query) = &spec.query {
            return Ok(query.clone());
        }
        let id = spec.query_id.ok_or_else(|| {
            Error::InvalidInput("an export needs an inline query or a saved query id".to_string())
        })?;
        self.queries
            .query_for(id)?
            .ok_or(Error::TemplateNotFound(id))
    }
}

/// Builds the sink for a format; the writer moves into the sink.
fn sink_for<'w, W: Write + 'w>(
    format: &ExportFormat,
    columns: Vec<String>,
    out: W,
) -> Box<dyn DocSink + 'w> {
    match format {
        ExportFormat::Csv => Box::new(CsvSink::new(out, columns)),
        ExportFormat::Json => Box::new(JsonSink::new(out, None)),
        ExportFormat::JsonObject { key } => Box::new(JsonSink::new(out, Some(key.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnType, Document, FieldType};
    use crate::storage::{MemoryDocumentStore, WriteMode};
    use serde_json::json;

    struct FixedQueries(Option<Value>);

    impl QuerySource for FixedQueries {
        fn query_for(&self, _id: i64) -> Result<Option<Value>> {
            Ok(self.0.clone())
        }
    }

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn seeded_store() -> Arc<MemoryDocumentStore> {
        let store = Arc::new(MemoryDocumentStore::new());
        store
            .bulk_write(
                "people",
                &[
                    (
                        "1".to_string(),
                        doc(&[("id", json!(1)), ("name", json!("ada")), ("secret", json!("x"))]),
                    ),
                    (
                        "2".to_string(),
                        doc(&[("id", json!(2)), ("name", json!("grace"))]),
                    ),
                ],
                WriteMode::Replace,
            )
            .unwrap();
        store
    }

    fn people_spec(format: ExportFormat) -> ExportSpec {
        let mut columns = ColumnTypeSpec::new();
        columns.insert("id".to_string(), ColumnType::scalar(FieldType::Long));
        columns.insert("name".to_string(), ColumnType::scalar(FieldType::Text));
        ExportSpec {
            table_name: "people".to_string(),
            format,
            columns,
            transformations: Vec::new(),
            query: Some(json!({"match_all": {}})),
            query_id: None,
            rank: false,
        }
    }

    fn service(store: Arc<MemoryDocumentStore>, queries: FixedQueries) -> ExportService {
        ExportService::new(store, Arc::new(queries), SluiceConfig::default())
    }

    #[test]
    fn test_spec_requires_exactly_one_query_source() {
        let both = people_spec(ExportFormat::Csv).with_query_id(7);
        assert!(both.validate().unwrap_err().to_string().contains("not both"));

        let mut neither = people_spec(ExportFormat::Csv);
        neither.query = None;
        assert!(neither.validate().is_err());

        assert!(people_spec(ExportFormat::Csv).validate().is_ok());
    }

    #[test]
    fn test_csv_export_trims_to_declared_columns() {
        let svc = service(seeded_store(), FixedQueries(None));
        let mut out = Vec::new();
        let summary = svc.export(&people_spec(ExportFormat::Csv), &mut out).unwrap();

        assert_eq!(summary.documents, 2);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "id,name\n1,ada\n2,grace\n");
    }

    #[test]
    fn test_csv_export_with_rank_column() {
        let svc = service(seeded_store(), FixedQueries(None));
        let mut out = Vec::new();
        svc.export(&people_spec(ExportFormat::Csv).with_rank(true), &mut out)
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "id,name,rank\n1,ada,1\n2,grace,2\n");
    }

    #[test]
    fn test_json_export_is_a_valid_array() {
        let svc = service(seeded_store(), FixedQueries(None));
        let mut out = Vec::new();
        svc.export(&people_spec(ExportFormat::Json), &mut out).unwrap();

        let parsed: Vec<Document> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["name"], json!("ada"));
        assert!(!parsed[0].contains_key("secret"));
    }

    #[test]
    fn test_json_object_export_wraps_under_key() {
        let svc = service(seeded_store(), FixedQueries(None));
        let format = ExportFormat::JsonObject {
            key: "results".to_string(),
        };
        let mut out = Vec::new();
        svc.export(&people_spec(format), &mut out).unwrap();

        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["results"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_term_query_filters_documents() {
        let svc = service(seeded_store(), FixedQueries(None));
        let spec = people_spec(ExportFormat::Csv).with_query(json!({"term": {"name": "ada"}}));
        let mut out = Vec::new();
        let summary = svc.export(&spec, &mut out).unwrap();

        assert_eq!(summary.documents, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "id,name\n1,ada\n");
    }

    #[test]
    fn test_saved_query_id_resolves_through_source() {
        let svc = service(
            seeded_store(),
            FixedQueries(Some(json!({"term": {"name": "grace"}}))),
        );
        let mut spec = people_spec(ExportFormat::Csv);
        spec.query = None;
        let mut out = Vec::new();
        let summary = svc.export(&spec.with_query_id(7), &mut out).unwrap();

        assert_eq!(summary.documents, 1);
        assert!(String::from_utf8(out).unwrap().contains("grace"));
    }

    #[test]
    fn test_unknown_saved_query_id_is_not_found() {
        let svc = service(seeded_store(), FixedQueries(None));
        let mut spec = people_spec(ExportFormat::Csv);
        spec.query = None;
        let err = svc
            .export(&spec.with_query_id(9), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound(9)));
    }

    #[test]
    fn test_transforms_apply_on_the_way_out() {
        let svc = service(seeded_store(), FixedQueries(None));
        let mut spec = people_spec(ExportFormat::Csv);
        spec.transformations.push(Transform::Prepend {
            col: "name".to_string(),
            text: "dr_".to_string(),
        });
        let mut out = Vec::new();
        svc.export(&spec, &mut out).unwrap();

        assert!(String::from_utf8(out).unwrap().contains("dr_ada"));
    }

    #[test]
    fn test_empty_result_still_produces_valid_output() {
        let store = Arc::new(MemoryDocumentStore::new());
        store
            .bulk_write("people", &[], WriteMode::Replace)
            .unwrap();
        let svc = service(store, FixedQueries(None));

        let mut csv_out = Vec::new();
        svc.export(&people_spec(ExportFormat::Csv), &mut csv_out)
            .unwrap();
        assert_eq!(String::from_utf8(csv_out).unwrap(), "id,name\n");

        let mut json_out = Vec::new();
        svc.export(&people_spec(ExportFormat::Json), &mut json_out)
            .unwrap();
        assert_eq!(String::from_utf8(json_out).unwrap(), "[]");
    }

    #[test]
    fn test_pagination_walks_every_page() {
        let store = Arc::new(MemoryDocumentStore::new());
        let batch: Vec<(String, Document)> = (0..5)
            .map(|i| {
                (
                    format!("id{i}"),
                    doc(&[("id", json!(i)), ("name", json!(format!("p{i}")))]),
                )
            })
            .collect();
        store.bulk_write("people", &batch, WriteMode::Replace).unwrap();

        let config = SluiceConfig {
            batch_size: 2,
            ..SluiceConfig::default()
        };
        let svc = ExportService::new(store, Arc::new(FixedQueries(None)), config);

        let mut out = Vec::new();
        let summary = svc
            .export(&people_spec(ExportFormat::Json), &mut out)
            .unwrap();
        assert_eq!(summary.documents, 5);
        let parsed: Vec<Document> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 5);
    }
}
