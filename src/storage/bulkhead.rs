//! Bulkhead pattern implementation for document store calls.
//!
//! Provides concurrency limiting to prevent resource exhaustion when making
//! parallel store calls. Uses a semaphore-based approach to limit the number
//! of concurrent operations.
//!
//! # Why Bulkhead for the Store?
//!
//! The bulkhead pattern isolates store operations and prevents cascading
//! resource exhaustion:
//!
//! - **Connection pools**: Prevents HTTP pool exhaustion under load
//! - **Memory**: Each in-flight bulk write holds a serialized batch
//! - **Store load**: Backends shed load when flooded by flush workers
//!   from several jobs at once
//!
//! # Usage
//!
//! ```rust,ignore
//! use sluice::storage::{BulkheadStore, BulkheadStoreConfig, HttpDocumentStore};
//!
//! let store = HttpDocumentStore::new(settings);
//! let bulkhead = BulkheadStore::new(store, BulkheadStoreConfig::default());
//!
//! // Only 10 concurrent operations allowed (default)
//! bulkhead.bulk_write("people", &batch, WriteMode::Upsert)?;
//! ```

use super::document::{DocumentPage, DocumentStore, WriteMode};
use crate::models::{ColumnTypeSpec, Document};
use crate::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Configuration for the store bulkhead pattern.
#[derive(Debug, Clone)]
pub struct BulkheadStoreConfig {
    /// Maximum concurrent store operations allowed.
    ///
    /// Default: 10 (flush workers plus concurrent jobs).
    pub max_concurrent: usize,

    /// Timeout for acquiring a permit in milliseconds (0 = no timeout).
    ///
    /// Default: 5000ms (5 seconds).
    pub acquire_timeout_ms: u64,

    /// Whether to fail fast when bulkhead is full (vs. waiting).
    ///
    /// Default: false (wait for permit).
    pub fail_fast: bool,
}

impl Default for BulkheadStoreConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            acquire_timeout_ms: 5000,
            fail_fast: false,
        }
    }
}

impl BulkheadStoreConfig {
    /// Creates a new store bulkhead configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_concurrent: 10,
            acquire_timeout_ms: 5000,
            fail_fast: false,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `SLUICE_STORE_BULKHEAD_MAX_CONCURRENT` | Max concurrent operations | 10 |
    /// | `SLUICE_STORE_BULKHEAD_ACQUIRE_TIMEOUT_MS` | Permit timeout | 5000 |
    /// | `SLUICE_STORE_BULKHEAD_FAIL_FAST` | Fail when full | false |
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("SLUICE_STORE_BULKHEAD_MAX_CONCURRENT")
            && let Ok(parsed) = v.parse::<usize>()
        {
            self.max_concurrent = parsed.max(1);
        }
        if let Ok(v) = std::env::var("SLUICE_STORE_BULKHEAD_ACQUIRE_TIMEOUT_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.acquire_timeout_ms = parsed;
        }
        if let Ok(v) = std::env::var("SLUICE_STORE_BULKHEAD_FAIL_FAST") {
            self.fail_fast = v.to_lowercase() == "true" || v == "1";
        }
        self
    }

    /// Sets the maximum concurrent operations.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Sets the acquire timeout in milliseconds.
    #[must_use]
    pub const fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Sets whether to fail fast when the bulkhead is full.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Document store wrapper with bulkhead (concurrency limiting) pattern.
///
/// Flush worker pools and export readers from concurrent jobs all funnel
/// through one shared backend; the bulkhead caps what reaches it.
pub struct BulkheadStore<S: DocumentStore> {
    inner: S,
    config: BulkheadStoreConfig,
    semaphore: Arc<Semaphore>,
}

impl<S: DocumentStore> BulkheadStore<S> {
    /// Creates a new bulkhead-wrapped document store.
    #[must_use]
    pub fn new(inner: S, config: BulkheadStoreConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            inner,
            config,
            semaphore,
        }
    }

    /// Returns the current number of available permits.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquires a permit, respecting the configured timeout and fail-fast settings.
    fn acquire_permit(&self) -> Result<tokio::sync::OwnedSemaphorePermit> {
        let semaphore = &self.semaphore;
        let available = semaphore.available_permits();

        metrics::gauge!(
            "store_bulkhead_available_permits",
            "backend" => self.inner.name()
        )
        .set(available as f64);

        if self.config.fail_fast {
            return self.acquire_permit_fail_fast(semaphore, available);
        }

        let timeout_ms = if self.config.acquire_timeout_ms == 0 {
            60_000 // 60 second safety cap
        } else {
            self.config.acquire_timeout_ms
        };

        self.acquire_permit_with_timeout(timeout_ms)
    }

    /// Fast-fail acquisition that returns error immediately if bulkhead is full.
    fn acquire_permit_fail_fast(
        &self,
        semaphore: &Arc<Semaphore>,
        available: usize,
    ) -> Result<tokio::sync::OwnedSemaphorePermit> {
        Arc::clone(semaphore).try_acquire_owned().map_or_else(
            |_| {
                metrics::counter!(
                    "store_bulkhead_rejections_total",
                    "backend" => self.inner.name(),
                    "reason" => "full"
                )
                .increment(1);
                Err(Error::OperationFailed {
                    operation: "store_bulkhead_acquire".to_string(),
                    cause: format!(
                        "Store bulkhead full: {} concurrent operations (max: {})",
                        self.config.max_concurrent - available,
                        self.config.max_concurrent
                    ),
                })
            },
            |permit| {
                metrics::counter!(
                    "store_bulkhead_permits_acquired_total",
                    "backend" => self.inner.name()
                )
                .increment(1);
                Ok(permit)
            },
        )
    }

    /// Acquisition with timeout that waits for a permit.
    fn acquire_permit_with_timeout(
        &self,
        timeout_ms: u64,
    ) -> Result<tokio::sync::OwnedSemaphorePermit> {
        let timeout = Duration::from_millis(timeout_ms);
        let start = std::time::Instant::now();

        loop {
            if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
                metrics::counter!(
                    "store_bulkhead_permits_acquired_total",
                    "backend" => self.inner.name()
                )
                .increment(1);
                return Ok(permit);
            }

            if start.elapsed() >= timeout {
                metrics::counter!(
                    "store_bulkhead_rejections_total",
                    "backend" => self.inner.name(),
                    "reason" => "timeout"
                )
                .increment(1);
                return Err(Error::OperationFailed {
                    operation: "store_bulkhead_acquire".to_string(),
                    cause: format!("Store bulkhead acquire timed out after {timeout_ms}ms"),
                });
            }

            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Executes an operation with bulkhead protection.
    fn execute<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let _permit = self.acquire_permit()?;

        tracing::trace!(
            backend = self.inner.name(),
            operation = operation,
            "Acquired store bulkhead permit"
        );

        let result = call();

        tracing::trace!(
            backend = self.inner.name(),
            operation = operation,
            success = result.is_ok(),
            "Released store bulkhead permit"
        );

        result
    }
}

impl<S: DocumentStore> DocumentStore for BulkheadStore<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn schema(&self, table: &str) -> Result<Option<ColumnTypeSpec>> {
        self.execute("schema", || self.inner.schema(table))
    }

    fn put_mapping(&self, table: &str, mapping: &Value) -> Result<()> {
        self.execute("put_mapping", || self.inner.put_mapping(table, mapping))
    }

    fn bulk_write(&self, table: &str, batch: &[(String, Document)], mode: WriteMode) -> Result<()> {
        self.execute("bulk_write", || self.inner.bulk_write(table, batch, mode))
    }

    fn read_page(
        &self,
        table: &str,
        query: Option<&Value>,
        cursor: Option<&str>,
        size: usize,
    ) -> Result<DocumentPage> {
        self.execute("read_page", || {
            self.inner.read_page(table, query, cursor, size)
        })
    }
}
