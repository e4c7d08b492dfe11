//! External tool discovery
//!
//! Each run probes for its tools exactly once. Stages pick their strategy
//! from the resulting `ToolAvailability` instead of probing on their own:
//! - `apktool` present: structured decompile/rebuild, otherwise raw zip
//! - `keytool` present: debug keystore generation, otherwise signing is skipped
//! - `jarsigner` present: package signing, otherwise signing fails soft

mod process;

pub use process::{ToolError, ToolInvocation, ToolOutput, ToolResult, ToolRunner};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configured tool names or paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Decompile/rebuild tool (`d` and `b` subcommands)
    pub apktool: String,

    /// Key generation tool
    pub keytool: String,

    /// Signing tool
    pub jarsigner: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            apktool: "apktool".to_string(),
            keytool: "keytool".to_string(),
            jarsigner: "jarsigner".to_string(),
        }
    }
}

/// Result of probing for every tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAvailability {
    pub apktool: Option<PathBuf>,
    pub keytool: Option<PathBuf>,
    pub jarsigner: Option<PathBuf>,
}

impl ToolAvailability {
    /// Resolve every configured tool
    pub fn probe(config: &ToolsConfig) -> Self {
        Self {
            apktool: resolve_tool(&config.apktool),
            keytool: resolve_tool(&config.keytool),
            jarsigner: resolve_tool(&config.jarsigner),
        }
    }

    /// Availability with no tools at all (raw zip paths, unsigned output)
    pub fn none() -> Self {
        Self::default()
    }

    /// Per-tool check rows for `doctor`
    pub fn checks(&self, config: &ToolsConfig) -> Vec<ToolCheck> {
        vec![
            ToolCheck::new(
                "apktool",
                &config.apktool,
                self.apktool.as_deref(),
                "structured decompile/rebuild",
                "raw zip extraction and re-archiving",
            ),
            ToolCheck::new(
                "keytool",
                &config.keytool,
                self.keytool.as_deref(),
                "debug keystore generation",
                "unsigned output (unless a keystore already exists)",
            ),
            ToolCheck::new(
                "jarsigner",
                &config.jarsigner,
                self.jarsigner.as_deref(),
                "package signing",
                "unsigned output",
            ),
        ]
    }
}

/// One row of the doctor report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCheck {
    pub name: String,
    pub configured: String,
    pub resolved: Option<PathBuf>,
    pub purpose: String,
    pub fallback: String,
}

impl ToolCheck {
    fn new(name: &str, configured: &str, resolved: Option<&Path>, purpose: &str, fallback: &str) -> Self {
        Self {
            name: name.to_string(),
            configured: configured.to_string(),
            resolved: resolved.map(Path::to_path_buf),
            purpose: purpose.to_string(),
            fallback: fallback.to_string(),
        }
    }

    pub fn ok(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn to_human(&self) -> String {
        match &self.resolved {
            Some(path) => format!("  ✓ {:<10} {} ({})", self.name, path.display(), self.purpose),
            None => format!(
                "  ⚠ {:<10} not found: {} (fallback: {})",
                self.name, self.configured, self.fallback
            ),
        }
    }
}

/// Resolve a tool name to an executable path.
///
/// Names containing a path separator are checked as given; bare names are
/// searched on `PATH`. Empty names resolve to nothing.
pub fn resolve_tool(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let as_path = Path::new(name);
    if as_path.components().count() > 1 || as_path.is_absolute() {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }

    find_in_path(name)
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for segment in std::env::split_paths(&path_var) {
        let candidate = segment.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            for ext in ["exe", "bat", "cmd"] {
                let candidate = segment.join(format!("{binary}.{ext}"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }

    None
}
