//! Streaming import jobs.
//!
//! An import runs as a small pipeline over one input stream: a reader
//! thread splits the input into record-aligned chunks and feeds them
//! through a bounded channel, and a pool of validator workers decodes,
//! transforms, and validates each chunk before writing it to the
//! staging area. The store is only touched after the entire input has
//! validated: first the additive mapping push, then the staged chunks
//! are replayed in batches. The first error stops the reader, and the
//! staging directory is removed on every exit path.

use crate::config::SluiceConfig;
use crate::io::pipeline::TransformPipeline;
use crate::io::splitter::{Chunk, ChunkSplitter, splitter_for};
use crate::io::validation::{
    RecordValidator, decode_csv_chunk, decode_json_chunk, decode_ndjson_chunk,
};
use crate::models::{FileKind, ImportSummary, JobState, Template};
use crate::schema::additive_mapping;
use crate::staging::{FlushCoordinator, StagingArea};
use crate::storage::{DocumentStore, WriteMode};
use crate::{Error, Result};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{SyncSender, sync_channel};
use std::sync::{Arc, Mutex};

/// Bytes read from the input per iteration of the reader loop.
const READ_WINDOW: usize = 64 * 1024;

/// Options for one import job.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Input format.
    pub file_kind: FileKind,
    /// Merge into existing documents instead of replacing them.
    pub update: bool,
    /// Whether the first CSV row is a header to strip.
    pub has_csv_header: bool,
    /// Whether JSON input is newline-separated objects rather than one
    /// top-level array.
    pub is_newline_separated_json: bool,
    /// Reject JSON records that omit a declared column instead of
    /// padding the column with null.
    pub require_all_fields: bool,
}

impl ImportOptions {
    /// Creates options for the given input format with the defaults:
    /// upsert writes, CSV header expected, array-shaped JSON, and all
    /// declared columns required.
    #[must_use]
    pub const fn new(file_kind: FileKind) -> Self {
        Self {
            file_kind,
            update: true,
            has_csv_header: true,
            is_newline_separated_json: false,
            require_all_fields: true,
        }
    }

    /// Sets whether writes merge into existing documents.
    #[must_use]
    pub const fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    /// Sets whether the first CSV row is a header.
    #[must_use]
    pub const fn with_csv_header(mut self, has_header: bool) -> Self {
        self.has_csv_header = has_header;
        self
    }

    /// Sets whether JSON input is newline-separated objects.
    #[must_use]
    pub const fn with_newline_separated_json(mut self, newline_separated: bool) -> Self {
        self.is_newline_separated_json = newline_separated;
        self
    }

    /// Sets whether JSON records must carry every declared column.
    #[must_use]
    pub const fn with_require_all_fields(mut self, require: bool) -> Self {
        self.require_all_fields = require;
        self
    }

    /// The store write mode these options select.
    #[must_use]
    pub const fn write_mode(&self) -> WriteMode {
        if self.update {
            WriteMode::Upsert
        } else {
            WriteMode::Replace
        }
    }
}

/// Service running streaming imports against a document store.
pub struct ImportService {
    store: Arc<dyn DocumentStore>,
    config: SluiceConfig,
}

impl ImportService {
    /// Creates a new import service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, config: SluiceConfig) -> Self {
        Self { store, config }
    }

    /// Imports a file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, plus everything
    /// [`upsert`](Self::upsert) returns.
    pub fn upsert_from_file(
        &self,
        path: &Path,
        template: &Template,
        options: &ImportOptions,
    ) -> Result<ImportSummary> {
        let file = std::fs::File::open(path).map_err(|e| Error::OperationFailed {
            operation: "open_import_file".to_string(),
            cause: e.to_string(),
        })?;
        self.upsert(std::io::BufReader::new(file), template, options)
    }

    /// Runs one import job to completion.
    ///
    /// The input is consumed as a stream: chunks are validated and
    /// staged on disk while the reader is still running, and the store
    /// is only written (mapping push, then batched document writes)
    /// after the whole input has validated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaConflict`] when a declared column cannot
    /// be reconciled with the stored table schema (checked before any
    /// byte is read), [`Error::InvalidInput`] for malformed input, and
    /// [`Error::RecordRejected`] for the first record that fails
    /// validation. On any error nothing has been written to the store
    /// and the staging directory has been removed.
    pub fn upsert<R>(
        &self,
        input: R,
        template: &Template,
        options: &ImportOptions,
    ) -> Result<ImportSummary>
    where
        R: Read + Send,
    {
        let started = std::time::Instant::now();
        let _span = tracing::info_span!(
            "import.job",
            table = %template.table_name,
            kind = %options.file_kind
        )
        .entered();
        let mut state = JobState::Configuring;

        template.validate()?;
        let pipeline = TransformPipeline::build(&template.transformations, &self.config.crypto)?;
        let validator =
            RecordValidator::new(template.column_types.clone(), template.primary_keys.clone())
                .with_require_all_fields(options.require_all_fields);

        // Reconcile the declared columns against the live schema before
        // anything is read or staged; a conflict aborts with no writes.
        let existing = self.store.schema(&template.table_name)?.unwrap_or_default();
        let mapping = additive_mapping(&template.column_types, &existing)?;

        let staging = StagingArea::create(&self.config.staging_root)?;
        tracing::info!(
            job_id = %staging.job_id(),
            table = %template.table_name,
            kind = %options.file_kind,
            "import job started"
        );

        let outcome = (|| -> Result<ImportSummary> {
            state.transition(JobState::Streaming)?;
            let staged = self.stream_chunks(input, template, options, &pipeline, &validator, &staging)?;
            tracing::debug!(job_id = %staging.job_id(), records = staged, "input fully staged");

            state.transition(JobState::MappingPushed)?;
            if mapping_has_fields(&mapping) {
                self.store.put_mapping(&template.table_name, &mapping)?;
            }

            state.transition(JobState::Flushing)?;
            let coordinator = FlushCoordinator::new(self.config.flush_workers, self.config.batch_size);
            let written =
                coordinator.flush(&staging, template, self.store.as_ref(), options.write_mode())?;

            state.transition(JobState::Done)?;
            Ok(ImportSummary {
                job_id: staging.job_id().to_string(),
                table_name: template.table_name.clone(),
                chunk_count: staging.chunk_count()?,
                record_count: written,
                state,
            })
        })();

        // The staging directory goes away on success and on failure; a
        // cleanup error must not mask the job error.
        let result = match outcome {
            Ok(summary) => {
                staging.cleanup()?;
                metrics::counter!("import_jobs_total", "status" => "done").increment(1);
                tracing::info!(
                    job_id = %summary.job_id,
                    records = summary.record_count,
                    chunks = summary.chunk_count,
                    "import job done"
                );
                Ok(summary)
            }
            Err(err) => {
                let _ = state.transition(JobState::Failed);
                if let Err(cleanup_err) = staging.cleanup() {
                    tracing::warn!(
                        job_id = %staging.job_id(),
                        error = %cleanup_err,
                        "staging cleanup failed after job error"
                    );
                }
                metrics::counter!("import_jobs_total", "status" => "failed").increment(1);
                tracing::error!(job_id = %staging.job_id(), error = %err, "import job failed");
                Err(err)
            }
        };
        metrics::histogram!("import_job_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);
        result
    }

    /// Streams the input through the splitter and the validator pool,
    /// staging every chunk. Returns the number of records staged.
    ///
    /// The reader thread owns the channel sender; workers share the
    /// receiver behind a mutex and drop it on exit, so a reader blocked
    /// on a full queue wakes up once the pool has shut down.
    fn stream_chunks<R>(
        &self,
        input: R,
        template: &Template,
        options: &ImportOptions,
        pipeline: &TransformPipeline,
        validator: &RecordValidator,
        staging: &StagingArea,
    ) -> Result<usize>
    where
        R: Read + Send,
    {
        let splitter = splitter_for(
            options.file_kind,
            self.config.chunk_threshold,
            options.has_csv_header,
            options.is_newline_separated_json,
        );
        let (sender, receiver) = sync_channel::<Chunk>(self.config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let failed = AtomicBool::new(false);
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let total_records = AtomicUsize::new(0);
        let worker_count = self.config.flush_workers.max(1);

        std::thread::scope(|scope| {
            let failed_ref = &failed;
            let errors_ref = &first_error;
            let totals_ref = &total_records;

            scope.spawn(move || read_and_split(input, splitter, sender, failed_ref, errors_ref));

            for _ in 0..worker_count {
                let chunks = Arc::clone(&receiver);
                scope.spawn(move || {
                    loop {
                        if failed_ref.load(Ordering::Relaxed) {
                            return;
                        }
                        let message = match chunks.lock() {
                            Ok(guard) => guard.recv(),
                            Err(_) => return,
                        };
                        let Ok(chunk) = message else { return };
                        let outcome = process_chunk(
                            &chunk, template, options, pipeline, validator, staging, totals_ref,
                        );
                        if let Err(err) = outcome {
                            record_error(failed_ref, errors_ref, err);
                            return;
                        }
                    }
                });
            }
            // Only the workers hold the receiver from here on; the
            // channel disconnects as soon as the last one exits.
            drop(receiver);
        });

        if let Ok(mut slot) = first_error.lock()
            && let Some(err) = slot.take()
        {
            return Err(err);
        }
        Ok(total_records.load(Ordering::Relaxed))
    }
}

/// Reader half of the streaming stage: reads byte windows, carries
/// incomplete UTF-8 sequences between reads, feeds the splitter, and
/// sends finished chunks. One payload is always held back so the final
/// chunk can be flagged as last.
fn read_and_split<R: Read>(
    mut input: R,
    mut splitter: Box<dyn ChunkSplitter>,
    sender: SyncSender<Chunk>,
    failed: &AtomicBool,
    first_error: &Mutex<Option<Error>>,
) {
    let mut window = vec![0u8; READ_WINDOW];
    let mut pending: Vec<u8> = Vec::new();
    let mut held: Option<String> = None;
    let mut next_index = 0usize;

    loop {
        if failed.load(Ordering::Relaxed) {
            return;
        }
        let read = match input.read(&mut window) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                record_error(
                    failed,
                    first_error,
                    Error::OperationFailed {
                        operation: "read_input".to_string(),
                        cause: err.to_string(),
                    },
                );
                return;
            }
        };
        pending.extend_from_slice(&window[..read]);
        let text = match take_valid_utf8(&mut pending) {
            Ok(text) => text,
            Err(err) => {
                record_error(failed, first_error, err);
                return;
            }
        };
        if text.is_empty() {
            continue;
        }
        let payloads = match splitter.feed(&text) {
            Ok(payloads) => payloads,
            Err(err) => {
                record_error(failed, first_error, err);
                return;
            }
        };
        for payload in payloads {
            if let Some(previous) = held.replace(payload)
                && !send_chunk(&sender, &mut next_index, previous, false)
            {
                return;
            }
        }
    }

    if !pending.is_empty() {
        record_error(
            failed,
            first_error,
            Error::InvalidInput("input ends inside a multi-byte UTF-8 sequence".to_string()),
        );
        return;
    }
    let tail = match splitter.finish() {
        Ok(tail) => tail,
        Err(err) => {
            record_error(failed, first_error, err);
            return;
        }
    };
    let last: Vec<String> = held.take().into_iter().chain(tail).collect();
    let count = last.len();
    for (position, payload) in last.into_iter().enumerate() {
        if !send_chunk(&sender, &mut next_index, payload, position + 1 == count) {
            return;
        }
    }
}

fn send_chunk(
    sender: &SyncSender<Chunk>,
    next_index: &mut usize,
    payload: String,
    is_last: bool,
) -> bool {
    let chunk = Chunk {
        index: *next_index,
        payload,
        is_last,
    };
    *next_index += 1;
    sender.send(chunk).is_ok()
}

/// Decodes, transforms, validates, and stages one chunk.
///
/// Record indices are allocated from a shared counter so rejection
/// messages carry a stable position within the job.
fn process_chunk(
    chunk: &Chunk,
    template: &Template,
    options: &ImportOptions,
    pipeline: &TransformPipeline,
    validator: &RecordValidator,
    staging: &StagingArea,
    total_records: &AtomicUsize,
) -> Result<()> {
    let records = match options.file_kind {
        FileKind::Csv => decode_csv_chunk(&chunk.payload, &template.original_names)?,
        FileKind::Json if options.is_newline_separated_json => decode_ndjson_chunk(&chunk.payload)?,
        FileKind::Json => decode_json_chunk(&chunk.payload)?,
    };
    let base = total_records.fetch_add(records.len(), Ordering::Relaxed);
    let mut docs = Vec::with_capacity(records.len());
    for (offset, mut record) in records.into_iter().enumerate() {
        let index = base + offset;
        pipeline.apply(index, &mut record)?;
        validator.validate(index, &mut record, options.file_kind)?;
        docs.push(record);
    }
    staging.stage_chunk(chunk.index, &docs)?;
    tracing::trace!(
        chunk = chunk.index,
        records = docs.len(),
        last = chunk.is_last,
        "chunk staged"
    );
    Ok(())
}

/// Takes the longest valid-UTF-8 prefix out of `pending`, leaving any
/// trailing incomplete sequence for the next read.
fn take_valid_utf8(pending: &mut Vec<u8>) -> Result<String> {
    let split = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(err) if err.error_len().is_none() => err.valid_up_to(),
        Err(_) => {
            return Err(Error::InvalidInput("input is not valid UTF-8".to_string()));
        }
    };
    let tail = pending.split_off(split);
    let valid = std::mem::replace(pending, tail);
    String::from_utf8(valid).map_err(|_| Error::InvalidInput("input is not valid UTF-8".to_string()))
}

fn record_error(failed: &AtomicBool, first_error: &Mutex<Option<Error>>, err: Error) {
    failed.store(true, Ordering::Relaxed);
    if let Ok(mut slot) = first_error.lock()
        && slot.is_none()
    {
        *slot = Some(err);
    }
}

fn mapping_has_fields(mapping: &Value) -> bool {
    mapping
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|properties| !properties.is_empty())
}
