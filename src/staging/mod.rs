//! Job-scoped temp staging and bounded flush replay.
//!
//! Each import job owns one uniquely-named directory under the staging
//! root. Validated chunks are serialized there exactly once; after the
//! whole input has been consumed and the mapping pushed, a bounded
//! worker pool replays the staged files to the target store. Staging
//! directories never outlive their job: cleanup runs on success and on
//! every failure path.

use crate::models::{Document, Template};
use crate::storage::{DocumentStore, WriteMode};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

/// Directory-name prefix for job staging areas.
const STAGING_DIR_PREFIX: &str = "sluice-job-";

/// Exclusively-owned temp directory holding one job's validated chunks.
///
/// Chunk files are JSON arrays named `chunk{n}`. Writing the same chunk
/// number twice is a hard error: the splitter numbers chunks
/// sequentially, so a repeat means the pipeline lost track of its own
/// state.
pub struct StagingArea {
    job_id: String,
    dir: PathBuf,
    staged: Mutex<BTreeSet<usize>>,
    sealed: AtomicBool,
}

impl StagingArea {
    /// Creates a fresh staging directory under `staging_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(staging_root: &Path) -> Result<Self> {
        let job_id = format!("{STAGING_DIR_PREFIX}{}", Uuid::new_v4());
        let dir = staging_root.join(&job_id);
        std::fs::create_dir_all(&dir).map_err(|e| Error::OperationFailed {
            operation: "create_staging_dir".to_string(),
            cause: e.to_string(),
        })?;
        tracing::debug!(job_id = %job_id, dir = %dir.display(), "Created staging directory");
        Ok(Self {
            job_id,
            dir,
            staged: Mutex::new(BTreeSet::new()),
            sealed: AtomicBool::new(false),
        })
    }

    /// Returns the job id (also the staging directory name).
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Returns the staging directory path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn chunk_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("chunk{index}"))
    }

    fn lock_staged(&self) -> Result<std::sync::MutexGuard<'_, BTreeSet<usize>>> {
        self.staged.lock().map_err(|_| Error::OperationFailed {
            operation: "lock_staging_state".to_string(),
            cause: "staging state lock poisoned".to_string(),
        })
    }

    /// Serializes one validated chunk to its numbered file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the chunk number was already
    /// staged or flush has begun, or an error if the write fails.
    pub fn stage_chunk(&self, index: usize, docs: &[Document]) -> Result<()> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(Error::InvalidState {
                state: "flushing".to_string(),
                action: format!("staging chunk {index}"),
            });
        }
        {
            let mut staged = self.lock_staged()?;
            if !staged.insert(index) {
                return Err(Error::InvalidState {
                    state: "streaming".to_string(),
                    action: format!("staging chunk {index} twice"),
                });
            }
        }

        let payload = serde_json::to_vec(docs).map_err(|e| Error::OperationFailed {
            operation: "serialize_chunk".to_string(),
            cause: e.to_string(),
        })?;
        std::fs::write(self.chunk_path(index), payload).map_err(|e| Error::OperationFailed {
            operation: "stage_chunk".to_string(),
            cause: e.to_string(),
        })?;

        metrics::counter!("import_chunks_staged_total").increment(1);
        tracing::debug!(
            job_id = %self.job_id,
            chunk = index,
            records = docs.len(),
            "Staged chunk"
        );
        Ok(())
    }

    /// Reads one staged chunk back.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unparseable.
    pub fn read_chunk(&self, index: usize) -> Result<Vec<Document>> {
        let bytes = std::fs::read(self.chunk_path(index)).map_err(|e| Error::OperationFailed {
            operation: "read_chunk".to_string(),
            cause: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| Error::OperationFailed {
            operation: "deserialize_chunk".to_string(),
            cause: e.to_string(),
        })
    }

    /// Returns the staged chunk numbers in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the staging state lock is poisoned.
    pub fn staged_chunks(&self) -> Result<Vec<usize>> {
        Ok(self.lock_staged()?.iter().copied().collect())
    }

    /// Returns the number of staged chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the staging state lock is poisoned.
    pub fn chunk_count(&self) -> Result<usize> {
        Ok(self.lock_staged()?.len())
    }

    /// Rejects any further staging; flush owns the directory from here.
    fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// Deletes the staging directory.
    ///
    /// Idempotent: a directory already removed is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub fn cleanup(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                tracing::debug!(job_id = %self.job_id, "Removed staging directory");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::OperationFailed {
                operation: "cleanup_staging".to_string(),
                cause: e.to_string(),
            }),
        }
    }
}

impl Drop for StagingArea {
    // Backstop only: the owning job calls cleanup() explicitly on every
    // exit path.
    fn drop(&mut self) {
        if self.dir.exists()
            && let Err(e) = std::fs::remove_dir_all(&self.dir)
        {
            tracing::warn!(
                job_id = %self.job_id,
                error = %e,
                "Failed to remove staging directory"
            );
        }
    }
}

/// Replays staged chunks to the target store with bounded parallelism.
///
/// Workers claim chunk numbers through a shared cursor, so chunks are
/// written at-least-once but not necessarily completed in order. The
/// first error stops all workers and is the one the caller sees.
pub struct FlushCoordinator {
    workers: usize,
    batch_size: usize,
}

impl FlushCoordinator {
    /// Creates a coordinator with the given pool size and per-call
    /// batch cap.
    #[must_use]
    pub const fn new(workers: usize, batch_size: usize) -> Self {
        Self {
            workers,
            batch_size,
        }
    }

    /// Replays every staged chunk and returns the number of documents
    /// written.
    ///
    /// Seals the staging area first: staging a chunk after flush has
    /// begun is a hard error.
    ///
    /// # Errors
    ///
    /// Returns the first chunk read, id rendering, or store write error
    /// encountered by any worker.
    pub fn flush(
        &self,
        staging: &StagingArea,
        template: &Template,
        store: &dyn DocumentStore,
        mode: WriteMode,
    ) -> Result<usize> {
        staging.seal();
        let chunks = staging.staged_chunks()?;
        if chunks.is_empty() {
            return Ok(0);
        }

        let cursor = AtomicUsize::new(0);
        let written = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let worker_count = self.workers.max(1).min(chunks.len());

        tracing::debug!(
            job_id = %staging.job_id(),
            chunks = chunks.len(),
            workers = worker_count,
            mode = %mode,
            "Starting flush"
        );

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                scope.spawn(|| {
                    loop {
                        if failed.load(Ordering::Acquire) {
                            break;
                        }
                        let slot = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(&index) = chunks.get(slot) else {
                            break;
                        };
                        match self.flush_chunk(staging, template, store, mode, index) {
                            Ok(count) => {
                                written.fetch_add(count, Ordering::SeqCst);
                            },
                            Err(e) => {
                                failed.store(true, Ordering::Release);
                                if let Ok(mut slot) = first_error.lock()
                                    && slot.is_none()
                                {
                                    *slot = Some(e);
                                }
                                break;
                            },
                        }
                    }
                });
            }
        });

        if let Some(error) = first_error.lock().ok().and_then(|mut slot| slot.take()) {
            return Err(error);
        }
        Ok(written.load(Ordering::SeqCst))
    }

    fn flush_chunk(
        &self,
        staging: &StagingArea,
        template: &Template,
        store: &dyn DocumentStore,
        mode: WriteMode,
        index: usize,
    ) -> Result<usize> {
        let docs = staging.read_chunk(index)?;
        let batch: Vec<(String, Document)> = docs
            .into_iter()
            .map(|doc| (template.document_id(&doc), doc))
            .collect();

        for slice in batch.chunks(self.batch_size.max(1)) {
            store.bulk_write(&template.table_name, slice, mode)?;
        }

        metrics::counter!("import_records_total").increment(batch.len() as u64);
        tracing::debug!(chunk = index, records = batch.len(), "Flushed chunk");
        Ok(batch.len())
    }
}
