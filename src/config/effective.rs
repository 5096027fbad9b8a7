//! Effective settings with provenance
//!
//! Records every layer that contributed, with the SHA-256 of each file's raw
//! bytes, so a run can be traced back to the exact files it read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::defaults::Settings;
use super::merge::merge_layers;

/// Host config location relative to the home directory
pub const HOST_CONFIG_PATH: &str = ".config/studio-routing/config.toml";

/// Project config file name, looked up in the working directory
pub const PROJECT_CONFIG_FILE: &str = "studio-routing.toml";

/// Upper bound for `lock.timeout_ms`
const MAX_LOCK_TIMEOUT_MS: u64 = 600_000;

/// Origin of a settings layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Host,
    Project,
    Cli,
}

/// A contributing layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged settings plus where they came from
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveSettings {
    pub loaded_at: DateTime<Utc>,

    pub settings: Settings,

    /// Contributing layers, lowest precedence first
    pub sources: Vec<ConfigSource>,
}

impl EffectiveSettings {
    /// Merge builtin defaults, the host file, the project file and CLI
    /// overrides. Missing files are skipped.
    pub fn build(
        host_config_path: Option<&Path>,
        project_config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![Settings::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        for (origin, path) in [
            (ConfigOrigin::Host, host_config_path),
            (ConfigOrigin::Project, project_config_path),
        ] {
            let Some(path) = path.filter(|p| p.exists()) else {
                continue;
            };
            let (value, digest) = load_toml_file(path)?;
            tracing::debug!(
                target: "studio_routing::config",
                origin = ?origin,
                path = %path.display(),
                digest = %digest,
                "loaded config layer"
            );
            layers.push(value);
            sources.push(ConfigSource {
                origin,
                path: Some(path.to_string_lossy().into_owned()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides.filter(|v| v.as_object().is_some_and(|m| !m.is_empty())) {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let settings: Settings = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ParseError(format!("invalid settings: {}", e)))?;
        validate(&settings)?;

        Ok(Self {
            loaded_at: Utc::now(),
            settings,
            sources,
        })
    }

    /// `~/.config/studio-routing/config.toml`, if a home directory is known
    pub fn default_host_config_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(HOST_CONFIG_PATH))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.lock.timeout_ms)
    }

    pub fn lock_warn_after(&self) -> Duration {
        Duration::from_millis(self.settings.lock.warn_after_ms)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Read a TOML file, returning it as JSON together with its digest.
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = std::str::from_utf8(&bytes)
        .map_err(|e| ConfigError::ParseError(format!("{}: invalid UTF-8: {}", path.display(), e)))?;
    let table: toml::Table = toml::from_str(contents)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
    let value = serde_json::to_value(table)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

    Ok((value, digest))
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let lock = &settings.lock;
    if lock.timeout_ms == 0 || lock.timeout_ms > MAX_LOCK_TIMEOUT_MS {
        return Err(ConfigError::ValidationError(format!(
            "lock.timeout_ms must be in (0, {}]",
            MAX_LOCK_TIMEOUT_MS
        )));
    }
    if lock.warn_after_ms > lock.timeout_ms {
        return Err(ConfigError::ValidationError(format!(
            "lock.warn_after_ms must not exceed lock.timeout_ms ({})",
            lock.timeout_ms
        )));
    }
    if settings.store.dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "store.dir must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(contents.as_bytes()).unwrap();
        temp
    }

    #[test]
    fn test_builtin_only() {
        let effective = EffectiveSettings::build(None, None, None).unwrap();
        assert_eq!(effective.settings, Settings::default());
        assert_eq!(effective.sources.len(), 1);
        assert_eq!(effective.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_layer_precedence() {
        let host = toml_file("[lock]\ntimeout_ms = 2000\n[log]\nfilter = \"debug\"\n");
        let project = toml_file("[lock]\ntimeout_ms = 3000\n");
        let effective = EffectiveSettings::build(
            Some(host.path()),
            Some(project.path()),
            Some(json!({"log": {"filter": "warn"}})),
        )
        .unwrap();

        assert_eq!(effective.settings.lock.timeout_ms, 3000);
        assert_eq!(effective.settings.lock.warn_after_ms, 500);
        assert_eq!(effective.settings.log.filter, "warn");
        let origins: Vec<_> = effective.sources.iter().map(|s| s.origin).collect();
        assert_eq!(
            origins,
            vec![
                ConfigOrigin::Builtin,
                ConfigOrigin::Host,
                ConfigOrigin::Project,
                ConfigOrigin::Cli
            ]
        );
    }

    #[test]
    fn test_file_digest_recorded() {
        let contents = "[store]\ndir = \"/srv/route-sets\"\n";
        let project = toml_file(contents);
        let effective = EffectiveSettings::build(None, Some(project.path()), None).unwrap();

        let expected = hex::encode(Sha256::digest(contents.as_bytes()));
        assert_eq!(effective.sources[1].digest.as_deref(), Some(expected.as_str()));
        assert_eq!(effective.settings.store.dir, PathBuf::from("/srv/route-sets"));
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let missing = Path::new("/nonexistent/config.toml");
        let effective = EffectiveSettings::build(Some(missing), None, None).unwrap();
        assert_eq!(effective.sources.len(), 1);
    }

    #[test]
    fn test_empty_cli_layer_not_recorded() {
        let effective = EffectiveSettings::build(None, None, Some(json!({}))).unwrap();
        assert_eq!(effective.sources.len(), 1);
    }

    #[test]
    fn test_validation_lock_timeout() {
        let err = EffectiveSettings::build(None, None, Some(json!({"lock": {"timeout_ms": 0}})))
            .unwrap_err();
        assert!(err.to_string().contains("lock.timeout_ms"));

        let err = EffectiveSettings::build(
            None,
            None,
            Some(json!({"lock": {"timeout_ms": 700000}})),
        )
        .unwrap_err();
        assert!(err.to_string().contains("lock.timeout_ms"));
    }

    #[test]
    fn test_validation_warn_after() {
        let err = EffectiveSettings::build(
            None,
            None,
            Some(json!({"lock": {"timeout_ms": 100, "warn_after_ms": 200}})),
        )
        .unwrap_err();
        assert!(err.to_string().contains("lock.warn_after_ms"));
    }

    #[test]
    fn test_validation_store_dir() {
        let err = EffectiveSettings::build(None, None, Some(json!({"store": {"dir": ""}})))
            .unwrap_err();
        assert!(err.to_string().contains("store.dir"));
    }

    #[test]
    fn test_malformed_toml() {
        let project = toml_file("[lock\n");
        let err = EffectiveSettings::build(None, Some(project.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let err = EffectiveSettings::build(
            None,
            None,
            Some(json!({"lock": {"timeout_ms": "soon"}})),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
