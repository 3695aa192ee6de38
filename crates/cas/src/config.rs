//! Filesystem blob store configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for [`crate::FileBlobStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasConfig {
    /// Base path for storage.
    /// Objects live in `{base_path}/objects/`, sidecars in `{base_path}/metadata/`.
    pub base_path: PathBuf,

    /// Whether to write metadata JSON alongside objects.
    #[serde(default = "default_true")]
    pub store_metadata: bool,

    /// Read-only mode - prevents any writes or deletes.
    #[serde(default)]
    pub read_only: bool,
}

fn default_true() -> bool {
    true
}

impl CasConfig {
    /// Create a config with a specific base path.
    pub fn with_base_path(path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: path.into(),
            store_metadata: true,
            read_only: false,
        }
    }

    /// Create a read-only config with a specific base path.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: path.into(),
            store_metadata: false,
            read_only: true,
        }
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.base_path.join("objects")
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.base_path.join("metadata")
    }

    /// Scratch directory for atomic writes (same filesystem as objects).
    pub fn tmp_dir(&self) -> PathBuf {
        self.base_path.join("tmp")
    }
}
