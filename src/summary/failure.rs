//! Failure taxonomy and stable exit codes

use serde::{Deserialize, Serialize};

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
    Cancelled,
}

impl Status {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Status::Success)
    }
}

/// Failure kind, one per fatal stage error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Source package missing, empty or not a file
    InvalidSource,
    /// Decompiler exited non-zero or the package is not a readable zip
    ExtractionFailed,
    /// No settings asset in the working tree
    ConfigNotFound,
    /// Settings asset could not be read or written
    PatchFailed,
    /// Repackager exited non-zero or produced no package
    RebuildFailed,
    Cancelled,
    /// Invalid configuration
    Config,
    /// Filesystem error outside any stage
    Io,
}

impl FailureKind {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            FailureKind::InvalidSource | FailureKind::Io => ExitCode::Failure,
            FailureKind::ExtractionFailed => ExitCode::ExtractionFailed,
            FailureKind::ConfigNotFound => ExitCode::ConfigNotFound,
            FailureKind::PatchFailed => ExitCode::PatchFailed,
            FailureKind::RebuildFailed => ExitCode::RebuildFailed,
            FailureKind::Cancelled => ExitCode::Cancelled,
            FailureKind::Config => ExitCode::Config,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::InvalidSource => "Source package unusable",
            FailureKind::ExtractionFailed => "Extraction failed",
            FailureKind::ConfigNotFound => "Settings asset not found",
            FailureKind::PatchFailed => "Settings patch failed",
            FailureKind::RebuildFailed => "Rebuild failed",
            FailureKind::Cancelled => "Run cancelled",
            FailureKind::Config => "Invalid configuration",
            FailureKind::Io => "Filesystem error",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            FailureKind::Cancelled => Status::Cancelled,
            _ => Status::Failed,
        }
    }
}

/// Stable process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    /// Unusable source package or filesystem error
    Failure = 1,
    Config = 2,
    ExtractionFailed = 20,
    ConfigNotFound = 30,
    PatchFailed = 40,
    RebuildFailed = 50,
    Cancelled = 80,
}

impl ExitCode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::Success),
            1 => Some(ExitCode::Failure),
            2 => Some(ExitCode::Config),
            20 => Some(ExitCode::ExtractionFailed),
            30 => Some(ExitCode::ConfigNotFound),
            40 => Some(ExitCode::PatchFailed),
            50 => Some(ExitCode::RebuildFailed),
            80 => Some(ExitCode::Cancelled),
            _ => None,
        }
    }
}
