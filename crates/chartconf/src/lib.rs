//! Layered configuration loading for chartvault.
//!
//! # Usage
//!
//! ```rust,no_run
//! use chartconf::VaultConfig;
//!
//! let config = VaultConfig::load().expect("Failed to load config");
//! println!("blobs in {}", config.paths.blob_dir.display());
//! println!("chart limit {} bytes", config.limits.files.chart);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/chartvault/config.toml` (system)
//! 2. `~/.config/chartvault/config.toml` (user)
//! 3. `./chartvault.toml` (local override, or `--config <path>`)
//! 4. Environment variables (`CHARTVAULT_*`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! blob_dir = "~/.local/share/chartvault/blobs"
//! db_path = "~/.local/share/chartvault/charts.db"
//!
//! [limits.files]
//! chart = 20971520
//!
//! [limits.text]
//! tags_count = 3
//!
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//! log_level = "info"
//!
//! [workers]
//! max_blocking = 4
//!
//! [ingest]
//! debug = false
//! ```

pub mod infra;
pub mod limits;
pub mod loader;

pub use infra::{IngestConfig, PathsConfig, TelemetryConfig, WorkersConfig};
pub use limits::{FileLimits, LimitsConfig, RatingLimits, TextLimits};
pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete chartvault configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl VaultConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` replacing the local override.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and env vars contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = VaultConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::load_from_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand so the section order matches the docs
        let mut out = String::new();
        let _ = writeln!(out, "# chartvault configuration\n");

        let _ = writeln!(out, "[paths]");
        let _ = writeln!(out, "blob_dir = \"{}\"", self.paths.blob_dir.display());
        let _ = writeln!(out, "db_path = \"{}\"", self.paths.db_path.display());

        let f = &self.limits.files;
        let _ = writeln!(out, "\n[limits.files]");
        let _ = writeln!(out, "jacket = {}", f.jacket);
        let _ = writeln!(out, "chart = {}", f.chart);
        let _ = writeln!(out, "audio = {}", f.audio);
        let _ = writeln!(out, "preview = {}", f.preview);
        let _ = writeln!(out, "background = {}", f.background);

        let t = &self.limits.text;
        let _ = writeln!(out, "\n[limits.text]");
        let _ = writeln!(out, "description = {}", t.description);
        let _ = writeln!(out, "artists = {}", t.artists);
        let _ = writeln!(out, "author = {}", t.author);
        let _ = writeln!(out, "title = {}", t.title);
        let _ = writeln!(out, "per_tag = {}", t.per_tag);
        let _ = writeln!(out, "tags_count = {}", t.tags_count);

        let _ = writeln!(out, "\n[limits.rating]");
        let _ = writeln!(out, "min = {}", self.limits.rating.min);
        let _ = writeln!(out, "max = {}", self.limits.rating.max);

        let _ = writeln!(out, "\n[telemetry]");
        match &self.telemetry.otlp_endpoint {
            Some(endpoint) => {
                let _ = writeln!(out, "otlp_endpoint = \"{}\"", endpoint);
            }
            None => {
                let _ = writeln!(out, "# otlp_endpoint = \"127.0.0.1:4317\"");
            }
        }
        let _ = writeln!(out, "log_level = \"{}\"", self.telemetry.log_level);

        let _ = writeln!(out, "\n[workers]");
        let _ = writeln!(out, "max_blocking = {}", self.workers.max_blocking);

        let _ = writeln!(out, "\n[ingest]");
        let _ = writeln!(out, "debug = {}", self.ingest.debug);
        match &self.ingest.renderer {
            Some(renderer) => {
                let _ = writeln!(out, "renderer = \"{}\"", renderer);
            }
            None => {
                let _ = writeln!(out, "# renderer = \"jacket-render\"");
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.limits.text.title, 50);
        assert!(config.workers.max_blocking >= 1);
        assert!(config.telemetry.otlp_endpoint.is_none());
        assert!(!config.ingest.debug);
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = VaultConfig::default();
        config.limits.files.chart = 123;
        config.telemetry.otlp_endpoint = Some("collector:4317".to_string());

        let toml = config.to_toml();
        assert!(toml.contains("[limits.files]"));
        assert!(toml.contains("[workers]"));

        let parsed: VaultConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, config);
    }
}
