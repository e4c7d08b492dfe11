//! Run summary (summary.json)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::failure::{ExitCode, FailureKind, Status};
use crate::artifact::{OutputArtifact, SigningDegraded, SigningState};
use crate::asset::{PatchOutcome, PatchRequest};
use crate::toolchain::ToolAvailability;

/// Schema version for summary.json
pub const RUN_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for summary.json
pub const RUN_SUMMARY_SCHEMA_ID: &str = "photon-repack/run_summary@1";

/// File name inside the output directory
pub const RUN_SUMMARY_FILE: &str = "summary.json";

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extract,
    Locate,
    Patch,
    Rebuild,
    Sign,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Locate => "locate",
            Stage::Patch => "patch",
            Stage::Rebuild => "rebuild",
            Stage::Sign => "sign",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Succeeded,
    /// Finished, but with a non-fatal shortfall (unsigned output)
    Degraded,
    Failed,
    Cancelled,
}

/// One attempted stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,

    /// Strategy used (`apktool`, `zip`, `structured`, `text`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    pub status: StageStatus,

    pub duration_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StageRecord {
    pub fn new(stage: Stage, status: StageStatus, duration: Duration) -> Self {
        Self {
            stage,
            strategy: None,
            status,
            duration_ms: duration.as_millis() as u64,
            detail: None,
        }
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// The caller's input package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
}

/// How far the signer got
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningRecord {
    pub trail: Vec<SigningState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<SigningDegraded>,
}

/// Run summary (summary.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,

    pub schema_id: String,

    pub run_id: String,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    pub status: Status,

    pub exit_code: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRecord>,

    pub request: PatchRequest,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolAvailability>,

    /// Stages attempted, in order. Stages never reached are absent.
    pub stages: Vec<StageRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<OutputArtifact>,

    pub warnings: Vec<String>,

    pub duration_ms: u64,

    pub human_summary: String,
}

impl RunSummary {
    /// Start a summary for a run that has not finished yet
    pub fn begin(run_id: String, request: PatchRequest) -> Self {
        Self {
            schema_version: RUN_SUMMARY_SCHEMA_VERSION,
            schema_id: RUN_SUMMARY_SCHEMA_ID.to_string(),
            run_id,
            created_at: Utc::now(),
            finished_at: None,
            status: Status::Success,
            exit_code: ExitCode::Success.as_i32(),
            failure_kind: None,
            failure_message: None,
            source: None,
            request,
            tools: None,
            stages: Vec::new(),
            patch: None,
            signing: None,
            artifact: None,
            warnings: Vec::new(),
            duration_ms: 0,
            human_summary: "Run in progress".to_string(),
        }
    }

    pub fn record(&mut self, record: StageRecord) {
        self.stages.push(record);
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Stages in the order they ran
    pub fn stage_names(&self) -> Vec<Stage> {
        self.stages.iter().map(|r| r.stage).collect()
    }

    pub fn finish_success(&mut self, artifact: OutputArtifact, duration: Duration) {
        self.finished_at = Some(Utc::now());
        self.status = Status::Success;
        self.exit_code = ExitCode::Success.as_i32();
        self.duration_ms = duration.as_millis() as u64;
        self.human_summary = if artifact.signed {
            format!("Run succeeded: {}", artifact.path.display())
        } else {
            format!("Run succeeded (unsigned): {}", artifact.path.display())
        };
        self.artifact = Some(artifact);
    }

    pub fn finish_failure(&mut self, kind: FailureKind, message: String, duration: Duration) {
        self.finished_at = Some(Utc::now());
        self.status = kind.status();
        self.exit_code = kind.exit_code().as_i32();
        self.duration_ms = duration.as_millis() as u64;
        self.human_summary = match self.stages.last() {
            Some(last) => format!("{} at {}: {}", kind.description(), last.stage.as_str(), message),
            None => format!("{}: {}", kind.description(), message),
        };
        self.failure_kind = Some(kind);
        self.failure_message = Some(message);
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write atomically to file (write-then-rename)
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, path)
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
