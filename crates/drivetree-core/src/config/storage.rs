//! Blob store configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Top-level storage configuration.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Blob store provider: `"local"`, `"memory"`, or `"s3"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Maximum upload size in bytes (default 100 MB).
    #[serde(default = "default_max_upload")]
    #[validate(range(min = 1))]
    pub max_upload_size_bytes: u64,
    /// Local filesystem storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,
    /// S3-compatible storage configuration.
    #[serde(default)]
    pub s3: S3StorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            max_upload_size_bytes: default_max_upload(),
            local: LocalStorageConfig::default(),
            s3: S3StorageConfig::default(),
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    /// Root path for local blob storage.
    #[serde(default = "default_local_root")]
    pub root_path: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_path: default_local_root(),
        }
    }
}

/// S3-compatible object storage configuration (AWS S3, MinIO).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3StorageConfig {
    /// Endpoint URL for non-AWS services such as MinIO. Empty for AWS.
    #[serde(default)]
    pub endpoint: String,
    /// Region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket name. Created on startup when missing.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Access key ID.
    #[serde(default)]
    pub access_key: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
}

impl Default for S3StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            bucket: default_bucket(),
            access_key: String::new(),
            secret_key: String::new(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}

fn default_max_upload() -> u64 {
    104_857_600 // 100 MB
}

fn default_local_root() -> String {
    "./data/blobs".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket() -> String {
    "drivetree".to_string()
}
