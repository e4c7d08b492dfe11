//! Patch request and the two-strategy patcher

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::{structured, text, DEFAULT_SERVER_PORT};

/// Patch errors. Only I/O is fatal.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid substitution pattern: {0}")]
    Pattern(#[from] regex_lite::Error),
}

pub type PatchResult<T> = Result<T, PatchError>;

/// Self-hosted server target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub address: String,
    pub port: u16,
}

impl ServerEndpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// What to change in the settings asset
///
/// Built once by the caller and passed down unchanged. A request with
/// neither an app id nor a server leaves the asset untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub app_id: Option<String>,
    pub server: Option<ServerEndpoint>,
}

impl PatchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cloud application id. Blank ids are ignored.
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        let app_id = app_id.into();
        self.app_id = (!app_id.trim().is_empty()).then_some(app_id);
        self
    }

    /// Point at a self-hosted server. Blank addresses are ignored.
    pub fn with_server(mut self, address: impl Into<String>, port: Option<u16>) -> Self {
        let address = address.into();
        self.server = (!address.trim().is_empty()).then(|| {
            ServerEndpoint::new(address, port.unwrap_or(DEFAULT_SERVER_PORT))
        });
        self
    }

    pub fn is_noop(&self) -> bool {
        self.app_id.is_none() && self.server.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStrategy {
    Structured,
    Text,
}

impl PatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchStrategy::Structured => "structured",
            PatchStrategy::Text => "text",
        }
    }
}

/// A settings field whose value changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchedField {
    AppId,
    HostType,
    ServerAddress,
    ServerPort,
}

impl PatchedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchedField::AppId => "app_id",
            PatchedField::HostType => "host_type",
            PatchedField::ServerAddress => "server_address",
            PatchedField::ServerPort => "server_port",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PatchOutcome {
    /// Asset rewritten. `fields` may be empty when the text strategy found
    /// none of its literals.
    Patched {
        strategy: PatchStrategy,
        fields: Vec<PatchedField>,
    },
    /// No-op request, asset not opened for writing
    Unchanged,
}

impl PatchOutcome {
    pub fn strategy(&self) -> Option<PatchStrategy> {
        match self {
            PatchOutcome::Patched { strategy, .. } => Some(*strategy),
            PatchOutcome::Unchanged => None,
        }
    }
}

/// Rewrites the settings asset in place
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigPatcher;

impl ConfigPatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn patch(&self, asset: &Path, request: &PatchRequest) -> PatchResult<PatchOutcome> {
        if request.is_noop() {
            info!(asset = %asset.display(), "no app id or server requested, asset left as is");
            return Ok(PatchOutcome::Unchanged);
        }

        let raw = fs::read(asset).map_err(|source| PatchError::Read {
            path: asset.to_path_buf(),
            source,
        })?;
        let (strategy, patched, fields) = match String::from_utf8(raw) {
            Ok(content) => match structured::apply(&content, request) {
                Ok(edit) => (PatchStrategy::Structured, edit.content.into_bytes(), edit.fields),
                Err(unavailable) => {
                    warn!(
                        asset = %asset.display(),
                        reason = %unavailable,
                        "structured patch unavailable, using text substitution"
                    );
                    let edit = text::apply(&content, request)?;
                    (PatchStrategy::Text, edit.content.into_bytes(), edit.fields)
                }
            },
            Err(not_utf8) => {
                warn!(
                    asset = %asset.display(),
                    "asset is not UTF-8, substituting within its text runs"
                );
                let edit = text::apply_bytes(not_utf8.as_bytes(), request)?;
                (PatchStrategy::Text, edit.content, edit.fields)
            }
        };

        write_in_place(asset, &patched)?;

        if fields.is_empty() {
            warn!(asset = %asset.display(), "no settings field matched the request");
        }
        info!(strategy = strategy.as_str(), ?fields, "settings asset patched");

        Ok(PatchOutcome::Patched { strategy, fields })
    }
}

/// Write-then-rename next to the asset
fn write_in_place(path: &Path, content: &[u8]) -> PatchResult<()> {
    let temp_path = path.with_extension("patching");
    let write_err = |source: io::Error| PatchError::Write {
        path: path.to_path_buf(),
        source,
    };

    fs::write(&temp_path, content).map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::DEFAULT_APP_ID;
    use serde_yaml::Value;
    use tempfile::TempDir;

    const UNITY_ASSET: &str = "%YAML 1.1
%TAG !u! tag:unity3d.com,2011:
--- !u!114 &11400000
MonoBehaviour:
  m_ObjectHideFlags: 0
  m_Script: {fileID: 11500000, guid: 9f3758f8aa1e4c7cbd3c3ec1b1a2d2e4, type: 3}
  m_Name: PhotonServerSettings
  AppID: 1eb3a592-f2d1-41c1-ac3a-cd6308fca5cb
  HostType: 4
  ServerAddress:
  ServerPort: 5055
  Protocol: 0
  EnabledRegions: 4294967295
";

    /// Flat text that parses, but has no settings group
    const FLAT_ASSET: &str = "AppID: 1eb3a592-f2d1-41c1-ac3a-cd6308fca5cb
HostType: 4
ServerAddress:
ServerPort: 5055
";

    fn write_asset(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("PhotonServerSettings.asset");
        fs::write(&path, content).unwrap();
        path
    }

    fn body(content: &str) -> Value {
        let start = content.find("MonoBehaviour:").unwrap();
        let root: Value = serde_yaml::from_str(&content[start..]).unwrap();
        root["MonoBehaviour"].clone()
    }

    #[test]
    fn test_noop_request_leaves_bytes_identical() {
        let dir = TempDir::new().unwrap();
        let path = write_asset(&dir, UNITY_ASSET);

        let outcome = ConfigPatcher::new().patch(&path, &PatchRequest::new()).unwrap();

        assert_eq!(outcome, PatchOutcome::Unchanged);
        assert_eq!(fs::read(&path).unwrap(), UNITY_ASSET.as_bytes());
    }

    #[test]
    fn test_blank_inputs_are_noop() {
        let request = PatchRequest::new().with_app_id("  ").with_server("", Some(7000));
        assert!(request.is_noop());
    }

    #[test]
    fn test_app_id_only_structured() {
        let dir = TempDir::new().unwrap();
        let path = write_asset(&dir, UNITY_ASSET);
        let request = PatchRequest::new().with_app_id("abc-123");

        let outcome = ConfigPatcher::new().patch(&path, &request).unwrap();
        assert_eq!(
            outcome,
            PatchOutcome::Patched {
                strategy: PatchStrategy::Structured,
                fields: vec![PatchedField::AppId],
            }
        );

        let patched = fs::read_to_string(&path).unwrap();
        assert!(patched.starts_with("%YAML 1.1\n%TAG !u! tag:unity3d.com,2011:\n--- !u!114 &11400000\n"));
        assert!(!patched.contains(DEFAULT_APP_ID));

        assert_eq!(body(&patched)["AppID"], Value::from("abc-123"));
        assert_eq!(patched.lines().count(), UNITY_ASSET.lines().count());
        for (before, after) in UNITY_ASSET.lines().zip(patched.lines()) {
            if !before.starts_with("  AppID:") {
                assert_eq!(after, before);
            }
        }
    }

    #[test]
    fn test_server_structured() {
        let dir = TempDir::new().unwrap();
        let path = write_asset(&dir, UNITY_ASSET);
        let request = PatchRequest::new().with_server("10.0.0.5", Some(7000));

        let outcome = ConfigPatcher::new().patch(&path, &request).unwrap();
        assert_eq!(outcome.strategy(), Some(PatchStrategy::Structured));

        let after = body(&fs::read_to_string(&path).unwrap());
        assert_eq!(after["HostType"], Value::from(2u64));
        assert_eq!(after["ServerAddress"], Value::from("10.0.0.5"));
        assert_eq!(after["ServerPort"], Value::from(7000u64));
        assert_eq!(after["AppID"], Value::from(DEFAULT_APP_ID));
    }

    #[test]
    fn test_missing_group_falls_back_to_text() {
        let dir = TempDir::new().unwrap();
        let path = write_asset(&dir, FLAT_ASSET);
        let request = PatchRequest::new()
            .with_app_id("abc-123")
            .with_server("10.0.0.5", Some(7000));

        let outcome = ConfigPatcher::new().patch(&path, &request).unwrap();
        assert_eq!(outcome.strategy(), Some(PatchStrategy::Text));

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "AppID: abc-123\nHostType: 2\nServerAddress: 10.0.0.5\nServerPort: 7000\n"
        );
    }

    #[test]
    fn test_unparseable_asset_falls_back_to_text() {
        let dir = TempDir::new().unwrap();
        let content = "MonoBehaviour:\n  AppID: 1eb3a592-f2d1-41c1-ac3a-cd6308fca5cb\n  broken: [unclosed\n";
        let path = write_asset(&dir, content);

        let outcome = ConfigPatcher::new()
            .patch(&path, &PatchRequest::new().with_app_id("abc-123"))
            .unwrap();

        assert_eq!(
            outcome,
            PatchOutcome::Patched {
                strategy: PatchStrategy::Text,
                fields: vec![PatchedField::AppId],
            }
        );
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "MonoBehaviour:\n  AppID: abc-123\n  broken: [unclosed\n"
        );
    }

    #[test]
    fn test_hybrid_asset_uses_text_substitution() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("PhotonServerSettings.asset");
        let mut content = vec![0x00, 0x01, 0xff, 0xfe];
        content.extend_from_slice(b"header\nAppID: 1eb3a592-f2d1-41c1-ac3a-cd6308fca5cb\n");
        fs::write(&path, &content).unwrap();

        let outcome = ConfigPatcher::new()
            .patch(&path, &PatchRequest::new().with_app_id("abc-123"))
            .unwrap();

        assert_eq!(
            outcome,
            PatchOutcome::Patched {
                strategy: PatchStrategy::Text,
                fields: vec![PatchedField::AppId],
            }
        );
        let mut expected = vec![0x00, 0x01, 0xff, 0xfe];
        expected.extend_from_slice(b"header\nAppID: abc-123\n");
        assert_eq!(fs::read(&path).unwrap(), expected);
    }

    #[test]
    fn test_default_port() {
        let request = PatchRequest::new().with_server("game.example.net", None);
        assert_eq!(request.server.unwrap().port, DEFAULT_SERVER_PORT);
    }
}
