//! Configuration for the ingestion service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming a TOML configuration file
pub const CONFIG_ENV_VAR: &str = "FILE_INGEST_CONFIG";

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Blob and record storage locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Progress channel configuration
    #[serde(default)]
    pub progress: ProgressConfig,
    /// Background processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// MIME type and extension tables used by format detection
    #[serde(default)]
    pub formats: FormatConfig,
}

impl IngestConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `FILE_INGEST_CONFIG`, or fall back to defaults
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.max_upload_size == 0 {
            return Err(Error::Config("server.max_upload_size must be positive".to_string()));
        }
        if self.processing.parallel_files == Some(0) {
            return Err(Error::Config("processing.parallel_files must be positive".to_string()));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 10MB)
    pub max_upload_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            max_upload_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory receiving uploaded bytes
    pub upload_dir: PathBuf,
    /// SQLite database holding file records
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = dirs::data_local_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join("file-ingest");

        Self {
            upload_dir: root.join("uploads"),
            database_path: root.join("files.db"),
        }
    }
}

/// Progress channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Lifetime of a progress entry after its last write (default: 1 hour)
    pub ttl_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

/// Background processing configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Files parsed concurrently (default: CPU count, max 8)
    pub parallel_files: Option<usize>,
}

impl ProcessingConfig {
    /// Effective concurrency bound
    pub fn worker_limit(&self) -> usize {
        self.parallel_files
            .unwrap_or_else(|| num_cpus::get().min(8))
            .max(1)
    }
}

/// MIME type and extension tables for format detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// MIME prefix routed to the CSV parser
    pub text_mime_prefix: String,
    /// Extensions routed to the CSV parser
    pub csv_extensions: Vec<String>,
    /// MIME types routed to the spreadsheet parser
    pub spreadsheet_mime_types: Vec<String>,
    /// Extensions routed to the spreadsheet parser
    pub spreadsheet_extensions: Vec<String>,
    /// MIME types routed to the PDF parser
    pub pdf_mime_types: Vec<String>,
    /// Extensions routed to the PDF parser
    pub pdf_extensions: Vec<String>,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            text_mime_prefix: "text/".to_string(),
            csv_extensions: vec![".csv".to_string()],
            spreadsheet_mime_types: vec![
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
                "application/vnd.ms-excel".to_string(),
            ],
            spreadsheet_extensions: vec![".xlsx".to_string(), ".xls".to_string()],
            pdf_mime_types: vec!["application/pdf".to_string()],
            pdf_extensions: vec![".pdf".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = IngestConfig::from_toml(
            r#"
            [server]
            max_upload_size = 2048

            [progress]
            ttl_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.server.max_upload_size, 2048);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.progress.ttl_secs, 60);
        assert_eq!(config.formats.pdf_extensions, vec![".pdf".to_string()]);
    }

    #[test]
    fn test_zero_upload_size_rejected() {
        let result = IngestConfig::from_toml("[server]\nmax_upload_size = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_worker_limit_is_positive() {
        let config = ProcessingConfig { parallel_files: None };
        assert!(config.worker_limit() >= 1);
        assert_eq!(ProcessingConfig { parallel_files: Some(3) }.worker_limit(), 3);
    }
}
