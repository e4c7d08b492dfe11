//! Effective configuration with full provenance
//!
//! The merged layers are deserialized into [`RepackConfig`] and validated
//! before secrets are redacted, so the typed settings keep the real upload
//! key while every persisted copy carries `[REDACTED]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::defaults::RepackConfig;
use super::merge::merge_layers;

/// Schema version for effective_config
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "photon-repack/effective_config@1";

/// Project config file, looked up in the current directory
pub const PROJECT_CONFIG_FILE: &str = "photon-repack.toml";

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Host,
    Project,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Effective configuration with full provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,

    pub schema_id: String,

    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// The merged configuration object, secrets redacted
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,

    /// Redacted key paths
    pub redactions: Vec<String>,

    /// Typed view, unredacted. Never serialized.
    #[serde(skip)]
    settings: RepackConfig,
}

/// Keys that contain secrets and should be redacted
const SECRET_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "private_key",
    "api_key",
    "credential",
];

/// `$HOME/.config/photon-repack/config.toml`
pub fn default_host_config_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("photon-repack")
            .join("config.toml")
    })
}

impl EffectiveConfig {
    /// Build effective config from layers. Missing files are skipped.
    pub fn build(
        host_config_path: Option<&Path>,
        project_config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![RepackConfig::default().to_value()];
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
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let mut merged = merge_layers(layers);

        let settings: RepackConfig = serde_json::from_value(merged.clone())
            .map_err(|e| ConfigError::ParseError(format!("invalid settings: {}", e)))?;
        Self::validate_settings(&settings)?;

        let redactions = Self::redact_secrets(&mut merged);

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            sources,
            redactions,
            settings,
        })
    }

    /// Typed settings, including secrets
    pub fn settings(&self) -> &RepackConfig {
        &self.settings
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;

        let toml_value: toml::Value = toml::from_str(&contents).map_err(|e| {
            ConfigError::ParseError(format!("{}: TOML parse error: {}", path.display(), e))
        })?;

        Ok((Self::toml_to_json(toml_value), digest))
    }

    fn toml_to_json(toml: toml::Value) -> Value {
        match toml {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i.into()),
            toml::Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Self::toml_to_json).collect())
            }
            toml::Value::Table(table) => Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect(),
            ),
        }
    }

    /// Redact secrets in the config, returning list of redacted paths
    fn redact_secrets(value: &mut Value) -> Vec<String> {
        let mut redactions = Vec::new();
        Self::redact_recursive(value, String::new(), &mut redactions);
        redactions
    }

    fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let current_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", path, key)
                    };

                    let is_secret = SECRET_KEYS.iter().any(|s| key_lower.contains(s));

                    if is_secret && !val.is_object() && !val.is_array() && !val.is_null() {
                        *val = Value::String("[REDACTED]".to_string());
                        redactions.push(current_path);
                    } else {
                        Self::redact_recursive(val, current_path, redactions);
                    }
                }
            }
            Value::Array(arr) => {
                for (i, val) in arr.iter_mut().enumerate() {
                    let current_path = format!("{}[{}]", path, i);
                    Self::redact_recursive(val, current_path, redactions);
                }
            }
            _ => {}
        }
    }

    fn validate_settings(settings: &RepackConfig) -> Result<(), ConfigError> {
        settings
            .timeouts
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if settings.patch.default_port == 0 {
            return Err(ConfigError::ValidationError(
                "patch.default_port must be in 1..=65535".to_string(),
            ));
        }

        let name = settings.asset.file_name.as_str();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(ConfigError::ValidationError(format!(
                "asset.file_name must be a bare file name, got {:?}",
                name
            )));
        }

        for (key, value) in [
            ("output.rebuilt_name", &settings.output.rebuilt_name),
            ("output.signed_name", &settings.output.signed_name),
        ] {
            if let Some(v) = value {
                if v.is_empty() || v.contains(['/', '\\']) {
                    return Err(ConfigError::ValidationError(format!(
                        "{} must be a bare file name, got {:?}",
                        key, v
                    )));
                }
            }
        }

        if settings.output.rebuilt_name.is_some()
            && settings.output.rebuilt_name == settings.output.signed_name
        {
            return Err(ConfigError::ValidationError(
                "output.rebuilt_name and output.signed_name must differ".to_string(),
            ));
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }
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
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None, None).unwrap();

        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.get_u64("timeouts.decompile_seconds"), Some(600));
        assert_eq!(config.get_str("asset.file_name"), Some("PhotonServerSettings.asset"));
        assert_eq!(config.settings(), &RepackConfig::default());
    }

    #[test]
    fn test_build_with_cli_override() {
        let cli = serde_json::json!({"patch": {"default_port": 7000}});
        let config = EffectiveConfig::build(None, None, Some(cli)).unwrap();

        assert_eq!(config.settings().patch.default_port, 7000);
        assert_eq!(config.get_u64("patch.default_port"), Some(7000));
    }

    #[test]
    fn test_validation_timeouts() {
        let cli = serde_json::json!({"timeouts": {"keygen_seconds": 0}});
        let err = EffectiveConfig::build(None, None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("keygen_seconds"));

        let cli = serde_json::json!({"timeouts": {"decompile_seconds": 90000}});
        assert!(EffectiveConfig::build(None, None, Some(cli)).is_err());
    }

    #[test]
    fn test_validation_port_and_names() {
        let cli = serde_json::json!({"patch": {"default_port": 0}});
        let err = EffectiveConfig::build(None, None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("default_port"));

        let cli = serde_json::json!({"asset": {"file_name": "a/b.asset"}});
        assert!(EffectiveConfig::build(None, None, Some(cli)).is_err());

        let cli = serde_json::json!({"output": {"rebuilt_name": "x.apk", "signed_name": "x.apk"}});
        assert!(EffectiveConfig::build(None, None, Some(cli)).is_err());
    }

    #[test]
    fn test_type_mismatch_is_parse_error() {
        let cli = serde_json::json!({"patch": {"default_port": "seven"}});
        let err = EffectiveConfig::build(None, None, Some(cli)).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_api_key_redacted_but_usable() {
        let cli = serde_json::json!({"upload": {"api_key": "tok_live_123"}});
        let config = EffectiveConfig::build(None, None, Some(cli)).unwrap();

        assert_eq!(config.get_str("upload.api_key"), Some("[REDACTED]"));
        assert_eq!(config.redactions, vec!["upload.api_key".to_string()]);
        assert_eq!(config.settings().upload.api_key.as_deref(), Some("tok_live_123"));
        assert!(!config.to_json().unwrap().contains("tok_live_123"));
    }

    #[test]
    fn test_load_toml_layers() {
        let mut host = NamedTempFile::new().unwrap();
        writeln!(host, "[tools]").unwrap();
        writeln!(host, "apktool = \"/opt/apktool/apktool\"").unwrap();
        writeln!(host, "[output]").unwrap();
        writeln!(host, "dir = \"/srv/out\"").unwrap();

        let mut project = NamedTempFile::new().unwrap();
        writeln!(project, "[output]").unwrap();
        writeln!(project, "write_summary = false").unwrap();

        let config =
            EffectiveConfig::build(Some(host.path()), Some(project.path()), None).unwrap();
        let settings = config.settings();

        assert_eq!(settings.tools.apktool, "/opt/apktool/apktool");
        assert_eq!(settings.tools.keytool, "keytool");
        assert_eq!(settings.output.dir, PathBuf::from("/srv/out"));
        assert!(!settings.output.write_summary);

        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[1].origin, ConfigOrigin::Host);
        assert_eq!(config.sources[2].origin, ConfigOrigin::Project);
        assert_eq!(config.sources[2].digest.as_ref().unwrap().len(), 64);
    }

    #[test]
    fn test_missing_files_skipped() {
        let config = EffectiveConfig::build(
            Some(Path::new("/nonexistent/host.toml")),
            Some(Path::new("/nonexistent/project.toml")),
            None,
        )
        .unwrap();

        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_invalid_toml() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "[tools").unwrap();

        let err = EffectiveConfig::build(None, Some(temp.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
