//! Infrastructure configuration: storage paths, telemetry, the blocking
//! worker pool and ingest behaviour.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem locations of the two backing stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the filesystem blob store.
    /// Default: ~/.local/share/chartvault/blobs
    #[serde(default = "PathsConfig::default_blob_dir")]
    pub blob_dir: PathBuf,

    /// SQLite metadata database.
    /// Default: ~/.local/share/chartvault/charts.db
    #[serde(default = "PathsConfig::default_db_path")]
    pub db_path: PathBuf,
}

impl PathsConfig {
    fn data_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/chartvault"))
            .unwrap_or_else(|| PathBuf::from(".local/share/chartvault"))
    }

    fn default_blob_dir() -> PathBuf {
        Self::data_dir().join("blobs")
    }

    fn default_db_path() -> PathBuf {
        Self::data_dir().join("charts.db")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            blob_dir: Self::default_blob_dir(),
            db_path: Self::default_db_path(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint. Traces and logs are only exported when set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Log filter (trace, debug, info, warn, error, or a full EnvFilter).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: Self::default_log_level(),
        }
    }
}

/// Bounded pool for CPU-bound work (script conversion, jacket rendering).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Maximum concurrent blocking tasks.
    /// Default: number of available CPUs
    #[serde(default = "WorkersConfig::default_max_blocking")]
    pub max_blocking: usize,
}

impl WorkersConfig {
    fn default_max_blocking() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_blocking: Self::default_max_blocking(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Accept canonical payloads from any producer.
    #[serde(default)]
    pub debug: bool,

    /// External jacket renderer command. Receives the raw image on stdin and
    /// a target size argument, writes a PNG to stdout.
    #[serde(default)]
    pub renderer: Option<String>,
}
