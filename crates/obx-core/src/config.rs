use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObxConfig {
    pub storage: StorageConfig,
    pub records: RecordsConfig,
    pub crypto: CryptoConfig,
    pub transfer: TransferConfig,
    pub capability: CapabilityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Namespace prefix inside the bucket that holds encrypted objects
    pub container: String,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
}

/// Which metadata store backs the object records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordBackend {
    /// Local JSON file
    Json,
    /// JSON documents stored next to the blobs in the object store
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    pub backend: RecordBackend,
    /// JSON file path for the `json` backend
    pub path: PathBuf,
    /// Key prefix for the `remote` backend
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2-HMAC-SHA256 iteration count (default: 210000)
    pub pbkdf2_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Retries after the first attempt, for retryable failures only
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry
    pub base_delay_ms: u64,
    /// Per-attempt timeout for uploads
    pub upload_timeout_secs: u64,
    /// Per-attempt timeout for downloads
    pub download_timeout_secs: u64,
}

/// Lifetimes of issued capability URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub upload_ttl_secs: u64,
    pub read_ttl_secs: u64,
    /// Longer than reads: large objects need more transfer time
    pub download_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl TransferConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl CapabilityConfig {
    pub fn upload_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_ttl_secs)
    }

    pub fn read_ttl(&self) -> Duration {
        Duration::from_secs(self.read_ttl_secs)
    }

    pub fn download_ttl(&self) -> Duration {
        Duration::from_secs(self.download_ttl_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "opaquebox".into(),
            container: "obx".into(),
            enforce_tls: false,
        }
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            backend: RecordBackend::Json,
            path: PathBuf::from("~/.local/share/obx/records.json"),
            prefix: "records".into(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: 210_000,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            upload_timeout_secs: 60,
            download_timeout_secs: 120,
        }
    }
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            upload_ttl_secs: 600,
            read_ttl_secs: 600,
            download_ttl_secs: 1800,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
