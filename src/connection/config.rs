use crate::core::{PersistError, Result};
use std::path::{Path, PathBuf};

const MEMORY_SCHEME: &str = "memory://";
const FILE_SCHEME: &str = "file://";

/// Where a bucket's documents live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local; everything is lost on exit.
    Memory,
    /// Snapshot file rewritten after every mutation.
    File(PathBuf),
}

/// Document store configuration
///
/// Similar to a cluster connection string: picks the bucket and the backend
/// holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Bucket (storage namespace) name
    pub bucket: String,

    /// Backend holding the bucket
    pub backend: StoreBackend,
}

impl StoreConfig {
    /// Create an in-memory configuration for a bucket
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            backend: StoreBackend::Memory,
        }
    }

    /// Set the bucket name
    pub fn bucket(mut self, bucket: &str) -> Self {
        self.bucket = bucket.to_string();
        self
    }

    /// Keep the bucket in a snapshot file
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.backend = StoreBackend::File(path.as_ref().to_path_buf());
        self
    }

    /// Keep the bucket in memory
    pub fn memory(mut self) -> Self {
        self.backend = StoreBackend::Memory;
        self
    }

    /// Parse from connection string
    ///
    /// Formats: `memory://<bucket>` or `file://<path>`; a file-backed bucket
    /// is named after the file stem.
    ///
    /// # Examples
    ///
    /// ```
    /// use updown::connection::{StoreBackend, StoreConfig};
    ///
    /// let config = StoreConfig::from_url("file:///var/lib/updown/talks.store").unwrap();
    /// assert_eq!(config.bucket, "talks");
    /// assert!(matches!(config.backend, StoreBackend::File(_)));
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        if let Some(bucket) = url.strip_prefix(MEMORY_SCHEME) {
            let config = Self::new(bucket);
            config.validate()?;
            return Ok(config);
        }

        if let Some(path) = url.strip_prefix(FILE_SCHEME) {
            let path = PathBuf::from(path);
            let bucket = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .ok_or_else(|| {
                    PersistError::Validation(format!("Invalid store path in '{}'", url))
                })?
                .to_string();
            let config = Self::new(&bucket).file(path);
            config.validate()?;
            return Ok(config);
        }

        Err(PersistError::Validation(format!(
            "Store URL must start with '{}' or '{}'",
            MEMORY_SCHEME, FILE_SCHEME
        )))
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        match &self.backend {
            StoreBackend::Memory => format!("{}{}", MEMORY_SCHEME, self.bucket),
            StoreBackend::File(path) => format!("{}{}", FILE_SCHEME, path.display()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(PersistError::Validation(
                "Bucket name cannot be empty".to_string(),
            ));
        }

        if !self
            .bucket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(PersistError::Validation(format!(
                "Bucket name '{}' can only contain letters, digits, '-', '_' and '.'",
                self.bucket
            )));
        }

        if let StoreBackend::File(path) = &self.backend {
            if path.as_os_str().is_empty() {
                return Err(PersistError::Validation(
                    "Store file path cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("default")
    }
}
