//! Configuration management.
//!
//! Runtime configuration for import/export jobs: staging paths, chunk
//! and queue sizing, flush concurrency, the target document store, and
//! transform crypto material. Values resolve in order: built-in
//! defaults, then a TOML config file, then environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Type | Default | Description |
//! |----------|------|---------|-------------|
//! | `SLUICE_STAGING_ROOT` | path | system temp | Root for per-job staging directories |
//! | `SLUICE_TEMPLATES_DB` | path | platform data dir | Template database location |
//! | `SLUICE_CHUNK_THRESHOLD_BYTES` | usize | `10485760` | Splitter window size |
//! | `SLUICE_QUEUE_CAPACITY` | usize | `4` | Pending-chunk queue bound |
//! | `SLUICE_FLUSH_WORKERS` | usize | `3` | Concurrent flush workers |
//! | `SLUICE_BATCH_SIZE` | usize | `5000` | Documents per bulk write |
//! | `SLUICE_STORE_URL` | string | `http://localhost:9200` | Document store base URL |
//! | `SLUICE_STORE_USERNAME` | string | unset | Basic-auth username |
//! | `SLUICE_STORE_PASSWORD` | string | unset | Basic-auth password |
//! | `SLUICE_STORE_TIMEOUT_SECS` | u64 | `30` | Store request timeout |
//! | `SLUICE_ENCRYPTION_KEY` | string | unset | 32-character transform cipher key |
//! | `SLUICE_SHA3_SALT` | string | unset | Fast salt for the hash transform |
//! | `SLUICE_BCRYPT_SALT` | string | unset | Slow salt for the hash transform (72+ chars) |

use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;

/// Default splitter window: chunks are cut at roughly this many bytes.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 10 * 1024 * 1024;

/// Default bound on the pending-chunk queue before backpressure.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Default flush worker count against the target store.
pub const DEFAULT_FLUSH_WORKERS: usize = 3;

/// Default documents-per-bulk-write batch size.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Main configuration for sluice.
#[derive(Debug, Clone)]
pub struct SluiceConfig {
    /// Root directory for per-job staging directories.
    pub staging_root: PathBuf,
    /// Path to the template database.
    pub templates_db: PathBuf,
    /// Splitter window size in bytes.
    pub chunk_threshold: usize,
    /// Bound on the pending-chunk queue.
    pub queue_capacity: usize,
    /// Concurrent flush workers.
    pub flush_workers: usize,
    /// Documents per bulk write.
    pub batch_size: usize,
    /// Target document store connection.
    pub store: StoreSettings,
    /// Transform crypto material.
    pub crypto: CryptoSettings,
}

/// Document store connection settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Base URL of the store's HTTP API.
    pub base_url: String,
    /// Basic-auth username.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<SecretString>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

/// Key and salt material for the crypto transforms.
///
/// All fields are optional; a pipeline using `encrypt`, `decrypt`, or
/// `hash` fails at build time when the material it needs is missing.
#[derive(Debug, Clone, Default)]
pub struct CryptoSettings {
    /// 32-character key for the `encrypt`/`decrypt` transforms.
    pub encryption_key: Option<SecretString>,
    /// Fast-stage salt for the `hash` transform.
    pub fast_hash_salt: Option<SecretString>,
    /// Slow-stage salt for the `hash` transform; must be 72+ characters.
    pub slow_hash_salt: Option<SecretString>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Staging directory root.
    pub staging_root: Option<String>,
    /// Template database path.
    pub templates_db: Option<String>,
    /// Splitter window size in bytes.
    pub chunk_threshold: Option<usize>,
    /// Pending-chunk queue bound.
    pub queue_capacity: Option<usize>,
    /// Flush worker count.
    pub flush_workers: Option<usize>,
    /// Bulk write batch size.
    pub batch_size: Option<usize>,
    /// Store section.
    pub store: Option<ConfigFileStore>,
    /// Crypto section.
    pub crypto: Option<ConfigFileCrypto>,
}

/// Store section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStore {
    /// Base URL.
    pub base_url: Option<String>,
    /// Basic-auth username.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// Crypto section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileCrypto {
    /// Encryption key.
    pub encryption_key: Option<String>,
    /// Fast hash salt.
    pub fast_hash_salt: Option<String>,
    /// Slow hash salt.
    pub slow_hash_salt: Option<String>,
}

impl Default for SluiceConfig {
    fn default() -> Self {
        Self {
            staging_root: std::env::temp_dir(),
            templates_db: default_templates_db(),
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            flush_workers: DEFAULT_FLUSH_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            store: StoreSettings::default(),
            crypto: CryptoSettings::default(),
        }
    }
}

fn default_templates_db() -> PathBuf {
    directories::ProjectDirs::from("", "", "sluice").map_or_else(
        || PathBuf::from(".sluice").join("templates.db"),
        |dirs| dirs.data_dir().join("templates.db"),
    )
}

impl SluiceConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from environment variables.
    ///
    /// Falls back to defaults for any unset variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides on top of this
    /// configuration.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("SLUICE_STAGING_ROOT") {
            self.staging_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SLUICE_TEMPLATES_DB") {
            self.templates_db = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SLUICE_CHUNK_THRESHOLD_BYTES")
            && let Ok(parsed) = v.parse()
        {
            self.chunk_threshold = parsed;
        }
        if let Ok(v) = std::env::var("SLUICE_QUEUE_CAPACITY")
            && let Ok(parsed) = v.parse()
        {
            self.queue_capacity = parsed;
        }
        if let Ok(v) = std::env::var("SLUICE_FLUSH_WORKERS")
            && let Ok(parsed) = v.parse()
        {
            self.flush_workers = parsed;
        }
        if let Ok(v) = std::env::var("SLUICE_BATCH_SIZE")
            && let Ok(parsed) = v.parse()
        {
            self.batch_size = parsed;
        }
        if let Ok(v) = std::env::var("SLUICE_STORE_URL") {
            self.store.base_url = v;
        }
        if let Ok(v) = std::env::var("SLUICE_STORE_USERNAME") {
            self.store.username = Some(v);
        }
        if let Ok(v) = std::env::var("SLUICE_STORE_PASSWORD") {
            self.store.password = Some(SecretString::from(v));
        }
        if let Ok(v) = std::env::var("SLUICE_STORE_TIMEOUT_SECS")
            && let Ok(parsed) = v.parse()
        {
            self.store.timeout_secs = parsed;
        }
        if let Ok(v) = std::env::var("SLUICE_ENCRYPTION_KEY") {
            self.crypto.encryption_key = Some(SecretString::from(v));
        }
        if let Ok(v) = std::env::var("SLUICE_SHA3_SALT") {
            self.crypto.fast_hash_salt = Some(SecretString::from(v));
        }
        if let Ok(v) = std::env::var("SLUICE_BCRYPT_SALT") {
            self.crypto.slow_hash_salt = Some(SecretString::from(v));
        }
        self
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location, then applies
    /// environment overrides.
    ///
    /// Checks the platform config dir first, then `~/.config/sluice/`,
    /// and falls back to defaults when no file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let from_file = Self::find_config_file().map_or_else(Self::default, |config| config);
        from_file.with_env_overrides()
    }

    fn find_config_file() -> Option<Self> {
        let base_dirs = directories::BaseDirs::new()?;

        let platform_config = base_dirs.config_dir().join("sluice").join("config.toml");
        if platform_config.exists()
            && let Ok(config) = Self::load_from_file(&platform_config)
        {
            return Some(config);
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("sluice")
            .join("config.toml");
        if xdg_config.exists()
            && let Ok(config) = Self::load_from_file(&xdg_config)
        {
            return Some(config);
        }

        None
    }

    /// Converts a `ConfigFile` to `SluiceConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(staging_root) = file.staging_root {
            config.staging_root = PathBuf::from(staging_root);
        }
        if let Some(templates_db) = file.templates_db {
            config.templates_db = PathBuf::from(templates_db);
        }
        if let Some(chunk_threshold) = file.chunk_threshold {
            config.chunk_threshold = chunk_threshold;
        }
        if let Some(queue_capacity) = file.queue_capacity {
            config.queue_capacity = queue_capacity;
        }
        if let Some(flush_workers) = file.flush_workers {
            config.flush_workers = flush_workers;
        }
        if let Some(batch_size) = file.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(store) = file.store {
            if let Some(base_url) = store.base_url {
                config.store.base_url = base_url;
            }
            config.store.username = store.username;
            config.store.password = store.password.map(SecretString::from);
            if let Some(timeout_secs) = store.timeout_secs {
                config.store.timeout_secs = timeout_secs;
            }
        }
        if let Some(crypto) = file.crypto {
            config.crypto.encryption_key = crypto.encryption_key.map(SecretString::from);
            config.crypto.fast_hash_salt = crypto.fast_hash_salt.map(SecretString::from);
            config.crypto.slow_hash_salt = crypto.slow_hash_salt.map(SecretString::from);
        }

        config
    }

    /// Sets the staging root directory.
    #[must_use]
    pub fn with_staging_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.staging_root = path.into();
        self
    }

    /// Sets the template database path.
    #[must_use]
    pub fn with_templates_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.templates_db = path.into();
        self
    }

    /// Sets the flush worker count.
    #[must_use]
    pub const fn with_flush_workers(mut self, workers: usize) -> Self {
        self.flush_workers = workers;
        self
    }

    /// Sets the pending-chunk queue bound.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the splitter window size.
    #[must_use]
    pub const fn with_chunk_threshold(mut self, bytes: usize) -> Self {
        self.chunk_threshold = bytes;
        self
    }

    /// Sets the bulk write batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SluiceConfig::default();
        assert_eq!(config.chunk_threshold, 10 * 1024 * 1024);
        assert_eq!(config.queue_capacity, 4);
        assert_eq!(config.flush_workers, 3);
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.store.base_url, "http://localhost:9200");
        assert!(config.crypto.encryption_key.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let config = SluiceConfig::new()
            .with_staging_root("/tmp/sluice-test")
            .with_flush_workers(1)
            .with_queue_capacity(2)
            .with_chunk_threshold(1024)
            .with_batch_size(10);
        assert_eq!(config.staging_root, PathBuf::from("/tmp/sluice-test"));
        assert_eq!(config.flush_workers, 1);
        assert_eq!(config.queue_capacity, 2);
        assert_eq!(config.chunk_threshold, 1024);
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_from_config_file_merges_onto_defaults() {
        let file: ConfigFile = toml::from_str(
            r#"
            chunk_threshold = 2048
            flush_workers = 2

            [store]
            base_url = "http://store.internal:9200"
            username = "ingest"
            password = "hunter2"

            [crypto]
            encryption_key = "0123456789abcdef0123456789abcdef"
            "#,
        )
        .unwrap();
        let config = SluiceConfig::from_config_file(file);
        assert_eq!(config.chunk_threshold, 2048);
        assert_eq!(config.flush_workers, 2);
        // Untouched fields keep their defaults.
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.store.base_url, "http://store.internal:9200");
        assert_eq!(config.store.username.as_deref(), Some("ingest"));
        assert!(config.store.password.is_some());
        assert!(config.crypto.encryption_key.is_some());
    }
}
