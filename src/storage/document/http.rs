//! HTTP document store backend.
//!
//! Talks to an Elasticsearch-compatible store over its REST API:
//! `_mapping` for schema reads and pushes, `_bulk` for batched writes,
//! and `_search` with scroll continuation for streaming reads.

use super::traits::{DocumentPage, DocumentStore, WriteMode};
use crate::config::StoreSettings;
use crate::models::{ColumnTypeSpec, Document};
use crate::schema::columns_from_mapping;
use crate::{Error, Result};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const SCROLL_KEEPALIVE: &str = "1m";

/// Document store backend over an Elasticsearch-compatible HTTP API.
pub struct HttpDocumentStore {
    settings: StoreSettings,
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: Document,
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

impl HttpDocumentStore {
    /// Creates a store client from connection settings.
    #[must_use]
    pub fn new(settings: StoreSettings) -> Self {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        let client = build_client(settings.timeout_secs);
        Self {
            settings,
            base_url,
            client,
        }
    }

    fn apply_auth(
        &self,
        builder: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        if let Some(username) = &self.settings.username {
            let password = self
                .settings
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string());
            return builder.basic_auth(username, password);
        }
        builder
    }

    fn send(
        &self,
        operation: &'static str,
        builder: reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::Response> {
        self.apply_auth(builder).send().map_err(|e| {
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connect"
            } else if e.is_request() {
                "request"
            } else {
                "unknown"
            };
            tracing::error!(
                operation = operation,
                error = %e,
                error_kind = error_kind,
                "Store request failed"
            );
            Error::OperationFailed {
                operation: operation.to_string(),
                cause: format!("{error_kind} error: {e}"),
            }
        })
    }

    fn expect_success(
        operation: &'static str,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().unwrap_or_default();
        tracing::error!(
            operation = operation,
            status = %status,
            body = %body,
            "Store returned error status"
        );
        Err(Error::OperationFailed {
            operation: operation.to_string(),
            cause: format!("store returned status: {status} - {body}"),
        })
    }

    // One NDJSON action/source pair per document. Upserts merge into any
    // existing document; replaces overwrite it.
    fn bulk_body(table: &str, batch: &[(String, Document)], mode: WriteMode) -> String {
        let mut body = String::new();
        for (id, doc) in batch {
            let (action, source) = match mode {
                WriteMode::Upsert => (
                    json!({"update": {"_index": table, "_id": id}}),
                    json!({"doc": doc, "doc_as_upsert": true}),
                ),
                WriteMode::Replace => (
                    json!({"index": {"_index": table, "_id": id}}),
                    Value::Object(doc.clone()),
                ),
            };
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&source.to_string());
            body.push('\n');
        }
        body
    }

    fn parse_mapping_response(body: &Value) -> ColumnTypeSpec {
        // Response nests under the concrete index name:
        // {"<table>": {"mappings": {"properties": ...}}}
        body.as_object()
            .and_then(|top| top.values().next())
            .and_then(|entry| entry.get("mappings"))
            .map(columns_from_mapping)
            .unwrap_or_default()
    }
}

impl DocumentStore for HttpDocumentStore {
    fn name(&self) -> &'static str {
        "http"
    }

    fn schema(&self, table: &str) -> Result<Option<ColumnTypeSpec>> {
        let url = format!("{}/{table}/_mapping", self.base_url);
        let response = self.send("schema", self.client.get(url))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = Self::expect_success("schema", response)?
            .json()
            .map_err(|e| Error::OperationFailed {
                operation: "schema".to_string(),
                cause: e.to_string(),
            })?;
        Ok(Some(Self::parse_mapping_response(&body)))
    }

    fn put_mapping(&self, table: &str, mapping: &Value) -> Result<()> {
        let url = format!("{}/{table}/_mapping", self.base_url);
        let response = self.send("put_mapping", self.client.put(url).json(mapping))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // Table does not exist yet: create it with the mapping inline.
            let create_url = format!("{}/{table}", self.base_url);
            let body = json!({"mappings": mapping});
            let response = self.send("create_table", self.client.put(create_url).json(&body))?;
            Self::expect_success("create_table", response)?;
            return Ok(());
        }
        Self::expect_success("put_mapping", response)?;
        Ok(())
    }

    fn bulk_write(
        &self,
        table: &str,
        batch: &[(String, Document)],
        mode: WriteMode,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let url = format!("{}/_bulk", self.base_url);
        let body = Self::bulk_body(table, batch, mode);
        let response = self.send(
            "bulk_write",
            self.client
                .post(url)
                .header("content-type", "application/x-ndjson")
                .body(body),
        )?;
        let parsed: BulkResponse = Self::expect_success("bulk_write", response)?
            .json()
            .map_err(|e| Error::OperationFailed {
                operation: "bulk_write".to_string(),
                cause: e.to_string(),
            })?;
        if parsed.errors {
            let first_error = parsed
                .items
                .iter()
                .filter_map(|item| item.as_object().and_then(|o| o.values().next()))
                .find_map(|entry| entry.get("error").map(std::string::ToString::to_string))
                .unwrap_or_else(|| "unreported item error".to_string());
            return Err(Error::OperationFailed {
                operation: "bulk_write".to_string(),
                cause: format!("bulk write rejected: {first_error}"),
            });
        }
        tracing::debug!(table = table, documents = batch.len(), mode = %mode, "Bulk write complete");
        Ok(())
    }

    fn read_page(
        &self,
        table: &str,
        query: Option<&Value>,
        cursor: Option<&str>,
        size: usize,
    ) -> Result<DocumentPage> {
        let response = if let Some(scroll_id) = cursor {
            let url = format!("{}/_search/scroll", self.base_url);
            let body = json!({"scroll": SCROLL_KEEPALIVE, "scroll_id": scroll_id});
            self.send("read_page", self.client.post(url).json(&body))?
        } else {
            let url = format!("{}/{table}/_search", self.base_url);
            let body = json!({
                "size": size,
                "query": query.cloned().unwrap_or_else(|| json!({"match_all": {}})),
            });
            self.send(
                "read_page",
                self.client
                    .post(url)
                    .query(&[("scroll", SCROLL_KEEPALIVE)])
                    .json(&body),
            )?
        };
        let parsed: SearchResponse = Self::expect_success("read_page", response)?
            .json()
            .map_err(|e| Error::OperationFailed {
                operation: "read_page".to_string(),
                cause: e.to_string(),
            })?;

        let docs: Vec<Document> = parsed.hits.hits.into_iter().map(|h| h.source).collect();
        let cursor = if docs.is_empty() {
            None
        } else {
            parsed.scroll_id
        };
        Ok(DocumentPage { docs, cursor })
    }
}

fn build_client(timeout_secs: u64) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build store HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}
