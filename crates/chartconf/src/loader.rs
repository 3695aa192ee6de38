//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, VaultConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local). Only returns files
/// that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/chartvault/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("chartvault/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("chartvault.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and overlay it onto `config`.
pub fn load_from_file(config: &mut VaultConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

fn invalid(path: &Path, key: &str, expected: &str) -> ConfigError {
    ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("{} must be {}", key, expected),
    }
}

fn get_u64(table: &toml::Table, key: &str, path: &Path) -> Result<Option<u64>, ConfigError> {
    match table.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_integer()
            .and_then(|i| u64::try_from(i).ok())
            .map(Some)
            .ok_or_else(|| invalid(path, key, "a non-negative integer")),
    }
}

fn get_i32(table: &toml::Table, key: &str, path: &Path) -> Result<Option<i32>, ConfigError> {
    match table.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_integer()
            .and_then(|i| i32::try_from(i).ok())
            .map(Some)
            .ok_or_else(|| invalid(path, key, "an integer")),
    }
}

/// Overlay the keys present in a TOML document onto `config`.
///
/// Keys that are absent keep their current value, so later files only need
/// to mention what they change.
fn apply_toml(config: &mut VaultConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("blob_dir").and_then(|v| v.as_str()) {
            config.paths.blob_dir = expand_path(v);
        }
        if let Some(v) = paths.get("db_path").and_then(|v| v.as_str()) {
            config.paths.db_path = expand_path(v);
        }
    }

    if let Some(limits) = table.get("limits").and_then(|v| v.as_table()) {
        if let Some(files) = limits.get("files").and_then(|v| v.as_table()) {
            let f = &mut config.limits.files;
            for (key, slot) in [
                ("jacket", &mut f.jacket),
                ("chart", &mut f.chart),
                ("audio", &mut f.audio),
                ("preview", &mut f.preview),
                ("background", &mut f.background),
            ] {
                if let Some(v) = get_u64(files, key, path)? {
                    *slot = v;
                }
            }
        }

        if let Some(text) = limits.get("text").and_then(|v| v.as_table()) {
            let t = &mut config.limits.text;
            for (key, slot) in [
                ("description", &mut t.description),
                ("artists", &mut t.artists),
                ("author", &mut t.author),
                ("title", &mut t.title),
                ("per_tag", &mut t.per_tag),
                ("tags_count", &mut t.tags_count),
            ] {
                if let Some(v) = get_u64(text, key, path)? {
                    *slot = v as usize;
                }
            }
        }

        if let Some(rating) = limits.get("rating").and_then(|v| v.as_table()) {
            if let Some(v) = get_i32(rating, "min", path)? {
                config.limits.rating.min = v;
            }
            if let Some(v) = get_i32(rating, "max", path)? {
                config.limits.rating.max = v;
            }
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.telemetry.otlp_endpoint = non_empty(v);
        }
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    if let Some(workers) = table.get("workers").and_then(|v| v.as_table()) {
        if let Some(v) = get_u64(workers, "max_blocking", path)? {
            if v == 0 {
                return Err(invalid(path, "max_blocking", "at least 1"));
            }
            config.workers.max_blocking = v as usize;
        }
    }

    if let Some(ingest) = table.get("ingest").and_then(|v| v.as_table()) {
        if let Some(v) = ingest.get("debug").and_then(|v| v.as_bool()) {
            config.ingest.debug = v;
        }
        if let Some(v) = ingest.get("renderer").and_then(|v| v.as_str()) {
            config.ingest.renderer = non_empty(v);
        }
    }

    Ok(())
}

fn non_empty(v: &str) -> Option<String> {
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut VaultConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from any key lookup (the process environment in
/// production).
pub fn apply_overrides_from<F>(config: &mut VaultConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = |key: &str| sources.env_overrides.push(key.to_string());

    if let Some(v) = lookup("CHARTVAULT_BLOB_DIR") {
        config.paths.blob_dir = expand_path(&v);
        applied("CHARTVAULT_BLOB_DIR");
    }
    if let Some(v) = lookup("CHARTVAULT_DB_PATH") {
        config.paths.db_path = expand_path(&v);
        applied("CHARTVAULT_DB_PATH");
    }

    if let Some(debug) = lookup("CHARTVAULT_DEBUG").as_deref().and_then(parse_bool) {
        config.ingest.debug = debug;
        applied("CHARTVAULT_DEBUG");
    }
    if let Some(n) = lookup("CHARTVAULT_MAX_BLOCKING").and_then(|v| v.parse::<usize>().ok()) {
        if n > 0 {
            config.workers.max_blocking = n;
            applied("CHARTVAULT_MAX_BLOCKING");
        }
    }

    // Also support the standard OTEL variable
    if let Some(v) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = non_empty(&v);
        applied("OTEL_EXPORTER_OTLP_ENDPOINT");
    }
    if let Some(v) = lookup("CHARTVAULT_LOG_LEVEL") {
        config.telemetry.log_level = v;
        applied("CHARTVAULT_LOG_LEVEL");
    }
    // RUST_LOG wins over everything
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        applied("RUST_LOG");
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        PathBuf::from(path)
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            match env::var(var_name) {
                Ok(var_value) => PathBuf::from(var_value).join(&stripped[slash_pos + 1..]),
                Err(_) => PathBuf::from(path),
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn apply(contents: &str) -> Result<VaultConfig, ConfigError> {
        let mut config = VaultConfig::default();
        apply_toml(&mut config, contents, Path::new("test.toml"))?;
        Ok(config)
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        assert_eq!(expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = apply("[paths]\nblob_dir = \"/custom/blobs\"\n").unwrap();
        assert_eq!(config.paths.blob_dir, PathBuf::from("/custom/blobs"));
        // Other values should be defaults
        assert_eq!(config.limits, crate::LimitsConfig::default());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[paths]
blob_dir = "/data/blobs"
db_path = "/data/charts.db"

[limits.files]
chart = 1048576

[limits.text]
tags_count = 5

[limits.rating]
min = 0
max = 50

[telemetry]
otlp_endpoint = "127.0.0.1:4317"
log_level = "debug"

[workers]
max_blocking = 2

[ingest]
debug = true
renderer = "jacket-render"
"#;
        let config = apply(toml).unwrap();

        assert_eq!(config.paths.db_path, PathBuf::from("/data/charts.db"));
        assert_eq!(config.limits.files.chart, 1_048_576);
        assert_eq!(config.limits.files.audio, 50 * 1024 * 1024);
        assert_eq!(config.limits.text.tags_count, 5);
        assert_eq!(config.limits.rating.min, 0);
        assert_eq!(config.telemetry.otlp_endpoint.as_deref(), Some("127.0.0.1:4317"));
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.workers.max_blocking, 2);
        assert!(config.ingest.debug);
        assert_eq!(config.ingest.renderer.as_deref(), Some("jacket-render"));
    }

    #[test]
    fn test_later_file_only_overrides_named_keys() {
        let mut config = VaultConfig::default();
        apply_toml(&mut config, "[limits.files]\nchart = 10\naudio = 20\n", Path::new("a")).unwrap();
        apply_toml(&mut config, "[limits.files]\naudio = 30\n", Path::new("b")).unwrap();
        assert_eq!(config.limits.files.chart, 10);
        assert_eq!(config.limits.files.audio, 30);
    }

    #[test]
    fn test_negative_size_rejected() {
        let err = apply("[limits.files]\nchart = -1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(apply("[workers]\nmax_blocking = 0\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CHARTVAULT_DB_PATH", "/env/charts.db"),
            ("CHARTVAULT_DEBUG", "1"),
            ("CHARTVAULT_MAX_BLOCKING", "3"),
            ("CHARTVAULT_LOG_LEVEL", "warn"),
            ("RUST_LOG", "chartvault=trace"),
        ]
        .into_iter()
        .collect();

        let mut config = VaultConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.paths.db_path, PathBuf::from("/env/charts.db"));
        assert!(config.ingest.debug);
        assert_eq!(config.workers.max_blocking, 3);
        assert_eq!(config.telemetry.log_level, "chartvault=trace");
        assert_eq!(
            sources.env_overrides,
            vec![
                "CHARTVAULT_DB_PATH",
                "CHARTVAULT_DEBUG",
                "CHARTVAULT_MAX_BLOCKING",
                "CHARTVAULT_LOG_LEVEL",
                "RUST_LOG"
            ]
        );
    }
}
