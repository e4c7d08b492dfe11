//! Typed settings and built-in defaults (layer 1)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::asset::{DEFAULT_ASSET_FILE_NAME, DEFAULT_SERVER_PORT};
use crate::timeout::TimeoutConfig;
use crate::toolchain::ToolsConfig;

/// Default upload endpoint for emulator builds
pub const DEFAULT_UPLOAD_ENDPOINT: &str = "https://api.appetize.io/v1/apps";

/// Fully merged, typed settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepackConfig {
    pub tools: ToolsConfig,
    pub timeouts: TimeoutConfig,
    pub asset: AssetConfig,
    pub patch: PatchDefaults,
    pub output: OutputConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// File name searched for in the working tree
    pub file_name: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_ASSET_FILE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchDefaults {
    /// Port used when a server address is given without one
    pub default_port: u16,
}

impl Default for PatchDefaults {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_SERVER_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output root; the working tree and keystore live under `<dir>/work`
    pub dir: PathBuf,
    pub write_summary: bool,
    /// Rebuilt package name, `<source stem>_Modified.apk` when unset
    pub rebuilt_name: Option<String>,
    /// Signed package name, `<source stem>_Modified_Signed.apk` when unset
    pub signed_name: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("modified-apk"),
            write_summary: true,
            rebuilt_name: None,
            signed_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub endpoint: String,
    pub platform: String,
    pub api_key: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_UPLOAD_ENDPOINT.to_string(),
            platform: "android".to_string(),
            api_key: None,
        }
    }
}

impl RepackConfig {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        let mut output = serde_json::json!({
            "dir": self.output.dir.to_string_lossy(),
            "write_summary": self.output.write_summary,
        });
        if let Some(name) = &self.output.rebuilt_name {
            output["rebuilt_name"] = name.clone().into();
        }
        if let Some(name) = &self.output.signed_name {
            output["signed_name"] = name.clone().into();
        }

        let mut upload = serde_json::json!({
            "endpoint": self.upload.endpoint,
            "platform": self.upload.platform,
        });
        if let Some(key) = &self.upload.api_key {
            upload["api_key"] = key.clone().into();
        }

        serde_json::json!({
            "tools": {
                "apktool": self.tools.apktool,
                "keytool": self.tools.keytool,
                "jarsigner": self.tools.jarsigner,
            },
            "timeouts": {
                "decompile_seconds": self.timeouts.decompile_seconds,
                "rebuild_seconds": self.timeouts.rebuild_seconds,
                "keygen_seconds": self.timeouts.keygen_seconds,
                "sign_seconds": self.timeouts.sign_seconds,
            },
            "asset": {
                "file_name": self.asset.file_name,
            },
            "patch": {
                "default_port": self.patch.default_port,
            },
            "output": output,
            "upload": upload,
        })
    }
}
