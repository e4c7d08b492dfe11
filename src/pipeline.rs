//! Pipeline orchestration
//!
//! One run is a strict linear chain:
//! - Open and fingerprint the source package
//! - Probe tools once, pick extract/rebuild strategies
//! - Extract into a fresh working tree
//! - Locate the settings asset (missing asset stops the run)
//! - Patch it
//! - Rebuild the package
//! - Sign it, degrading to the unsigned package on any signing failure
//! - Emit summary.json
//!
//! Cancellation is checked between stages and propagated into every child
//! process. A cancelled run deletes its working tree; any other failure keeps
//! it for inspection.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::archive::{ArchiveStrategies, BuildError, ExtractError, WorkingTree};
use crate::artifact::{
    ArtifactError, ArtifactSigner, OutputArtifact, SignOutcome, SigningIdentity, SourceArchive,
};
use crate::asset::{
    ConfigLocator, ConfigPatcher, LocateError, PatchError, PatchOutcome, PatchRequest,
};
use crate::config::RepackConfig;
use crate::signal::CancelToken;
use crate::summary::{
    FailureKind, RunSummary, SigningRecord, SourceRecord, Stage, StageRecord, StageStatus,
    RUN_SUMMARY_FILE,
};
use crate::timeout::TimeoutConfig;
use crate::toolchain::{ToolAvailability, ToolRunner, ToolsConfig};

/// Directory under the output root holding the working tree and keystore
pub const WORK_DIR_NAME: &str = "work";

/// Working tree directory under the work dir
pub const TREE_DIR_NAME: &str = "decompiled";

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid source package: {0}")]
    InvalidSource(#[source] ArtifactError),

    #[error("extraction failed: {0}")]
    ExtractionFailed(#[source] ExtractError),

    #[error("{0}")]
    ConfigNotFound(#[source] LocateError),

    #[error("patch failed: {0}")]
    PatchFailed(#[source] PatchError),

    #[error("rebuild failed: {0}")]
    RebuildFailed(#[source] BuildError),

    #[error("cancelled during {}", .0.as_str())]
    Cancelled(Stage),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::InvalidSource(_) => FailureKind::InvalidSource,
            PipelineError::ExtractionFailed(_) => FailureKind::ExtractionFailed,
            PipelineError::ConfigNotFound(_) => FailureKind::ConfigNotFound,
            PipelineError::PatchFailed(_) => FailureKind::PatchFailed,
            PipelineError::RebuildFailed(_) => FailureKind::RebuildFailed,
            PipelineError::Cancelled(_) => FailureKind::Cancelled,
            PipelineError::Config(_) => FailureKind::Config,
            PipelineError::Io(_) => FailureKind::Io,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code().as_i32()
    }

    /// Stage that failed, when the failure belongs to one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::ExtractionFailed(_) => Some(Stage::Extract),
            PipelineError::ConfigNotFound(_) => Some(Stage::Locate),
            PipelineError::PatchFailed(_) => Some(Stage::Patch),
            PipelineError::RebuildFailed(_) => Some(Stage::Rebuild),
            PipelineError::Cancelled(stage) => Some(*stage),
            _ => None,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Output root. Receives the packages, `summary.json` and `work/`.
    pub output_dir: PathBuf,

    /// Settings asset file name
    pub asset_file_name: String,

    pub tools: ToolsConfig,

    pub timeouts: TimeoutConfig,

    /// Write summary.json at the end of every run
    pub write_summary: bool,

    /// Rebuilt package file name override
    pub rebuilt_name: Option<String>,

    /// Signed package file name override
    pub signed_name: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_settings(&RepackConfig::default())
    }
}

impl PipelineConfig {
    pub fn from_settings(settings: &RepackConfig) -> Self {
        Self {
            output_dir: settings.output.dir.clone(),
            asset_file_name: settings.asset.file_name.clone(),
            tools: settings.tools.clone(),
            timeouts: settings.timeouts,
            write_summary: settings.output.write_summary,
            rebuilt_name: settings.output.rebuilt_name.clone(),
            signed_name: settings.output.signed_name.clone(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn work_dir(&self) -> PathBuf {
        self.output_dir.join(WORK_DIR_NAME)
    }

    pub fn tree_dir(&self) -> PathBuf {
        self.work_dir().join(TREE_DIR_NAME)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join(RUN_SUMMARY_FILE)
    }

    /// `<stem>_Modified.apk` unless overridden
    pub fn rebuilt_path(&self, source: &Path) -> PathBuf {
        let name = self
            .rebuilt_name
            .clone()
            .unwrap_or_else(|| format!("{}_Modified.apk", source_stem(source)));
        self.output_dir.join(name)
    }

    /// `<stem>_Modified_Signed.apk` unless overridden
    pub fn signed_path(&self, source: &Path) -> PathBuf {
        let name = self
            .signed_name
            .clone()
            .unwrap_or_else(|| format!("{}_Modified_Signed.apk", source_stem(source)));
        self.output_dir.join(name)
    }
}

fn source_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "package".to_string())
}

/// Everything a successful run hands back
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: String,

    /// Terminal artifact, signed unless `signing.degraded` is set
    pub artifact: OutputArtifact,

    /// The unsigned rebuilt package
    pub rebuilt: SourceArchive,

    /// Patched settings asset inside the working tree
    pub asset: PathBuf,

    pub patch: PatchOutcome,

    pub signing: SignOutcome,

    pub warnings: Vec<String>,

    /// Where summary.json was written
    pub summary_path: Option<PathBuf>,
}

impl PipelineOutcome {
    pub fn is_signed(&self) -> bool {
        self.signing.is_signed()
    }
}

/// Pipeline execution context
pub struct Pipeline {
    config: PipelineConfig,
    runner: ToolRunner,
    tools: Option<ToolAvailability>,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            runner: ToolRunner::default(),
            tools: None,
        }
    }

    /// Share a cancellation token with the caller (signal handler, UI)
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.runner = ToolRunner::new(token);
        self
    }

    /// Use a fixed tool set instead of probing
    pub fn with_tools(mut self, tools: ToolAvailability) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.runner.cancel_token()
    }

    /// Run every stage against `source`
    pub fn run(&self, source: &Path, request: &PatchRequest) -> PipelineResult<PipelineOutcome> {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let mut summary = RunSummary::begin(run_id.clone(), request.clone());

        info!(
            run_id = %run_id,
            source = %source.display(),
            output_dir = %self.config.output_dir.display(),
            app_id = ?request.app_id,
            server = ?request.server.as_ref().map(|s| s.to_string()),
            "pipeline run starting"
        );

        let result = self.run_stages(source, request, &mut summary);

        match &result {
            Ok(outcome) => {
                summary.finish_success(outcome.artifact.clone(), started.elapsed());
                info!(
                    run_id = %run_id,
                    artifact = %outcome.artifact.path.display(),
                    size_bytes = outcome.artifact.size_bytes,
                    signed = outcome.artifact.signed,
                    "pipeline run finished"
                );
            }
            Err(e) => {
                if matches!(e, PipelineError::Cancelled(_)) {
                    self.discard_tree();
                }
                summary.finish_failure(e.kind(), e.to_string(), started.elapsed());
                warn!(run_id = %run_id, stage = ?e.stage(), error = %e, "pipeline run failed");
            }
        }

        let summary_path = self.persist_summary(&summary);
        result.map(|mut outcome| {
            outcome.summary_path = summary_path;
            outcome
        })
    }

    /// Extract `source` into the working tree and stop
    pub fn extract_only(&self, source: &Path) -> PipelineResult<WorkingTree> {
        let archive = SourceArchive::open(source).map_err(PipelineError::InvalidSource)?;
        let tools = self.probe();
        let strategies = ArchiveStrategies::select(&tools, &self.runner, &self.config.timeouts);

        self.prepare_work_dir()?;
        let result = strategies
            .extractor
            .extract(&archive, &self.config.tree_dir())
            .map_err(extract_failure);

        if matches!(result, Err(PipelineError::Cancelled(_))) {
            self.discard_tree();
        }
        let tree = result?;
        info!(tree = %tree.root().display(), strategy = tree.strategy(), "package extracted");
        Ok(tree)
    }

    fn run_stages(
        &self,
        source: &Path,
        request: &PatchRequest,
        summary: &mut RunSummary,
    ) -> PipelineResult<PipelineOutcome> {
        let archive = SourceArchive::open(source).map_err(PipelineError::InvalidSource)?;
        summary.source = Some(SourceRecord {
            path: archive.path().to_path_buf(),
            size_bytes: archive.size_bytes(),
            sha256: archive.sha256()?,
        });

        let tools = self.probe();
        summary.tools = Some(tools.clone());
        let strategies = ArchiveStrategies::select(&tools, &self.runner, &self.config.timeouts);

        self.prepare_work_dir()?;

        // 1. Extract
        self.check_cancelled(Stage::Extract)?;
        let stage_start = Instant::now();
        let strategy = strategies.extractor.strategy();
        info!(strategy, "extracting package");
        let tree = match strategies.extractor.extract(&archive, &self.config.tree_dir()) {
            Ok(tree) => {
                summary.record(succeeded(Stage::Extract, stage_start).with_strategy(strategy));
                tree
            }
            Err(e) => {
                let err = extract_failure(e);
                summary.record(failed(Stage::Extract, stage_start, &err).with_strategy(strategy));
                return Err(err);
            }
        };

        // 2. Locate
        self.check_cancelled(Stage::Locate)?;
        let stage_start = Instant::now();
        let locator = ConfigLocator::new(self.config.asset_file_name.clone());
        let asset = match locator.locate(&tree) {
            Ok(asset) => asset,
            Err(e) => {
                let err = match e {
                    LocateError::Walk(walk) => PipelineError::Io(io::Error::other(walk)),
                    not_found => PipelineError::ConfigNotFound(not_found),
                };
                summary.record(failed(Stage::Locate, stage_start, &err));
                return Err(err);
            }
        };
        for ignored in &asset.ignored {
            summary.warn(format!(
                "duplicate settings asset ignored: {}",
                ignored.display()
            ));
        }
        summary.record(
            succeeded(Stage::Locate, stage_start).with_detail(asset.path.display().to_string()),
        );

        // 3. Patch
        self.check_cancelled(Stage::Patch)?;
        let stage_start = Instant::now();
        let patch = match ConfigPatcher::new().patch(&asset.path, request) {
            Ok(patch) => patch,
            Err(e) => {
                let err = PipelineError::PatchFailed(e);
                summary.record(failed(Stage::Patch, stage_start, &err));
                return Err(err);
            }
        };
        let mut record = succeeded(Stage::Patch, stage_start);
        match &patch {
            PatchOutcome::Patched { strategy, fields } => {
                record = record.with_strategy(strategy.as_str());
                if fields.is_empty() {
                    summary.warn("settings asset rewritten but no field matched the request");
                    record = record.with_detail("no fields changed");
                } else {
                    let names: Vec<&str> = fields.iter().map(|f| f.as_str()).collect();
                    record = record.with_detail(names.join(","));
                }
            }
            PatchOutcome::Unchanged => {
                record = record.with_detail("no app id or server requested");
            }
        }
        summary.patch = Some(patch.clone());
        summary.record(record);

        // 4. Rebuild
        self.check_cancelled(Stage::Rebuild)?;
        let stage_start = Instant::now();
        let strategy = strategies.repackager.strategy();
        let rebuilt_path = self.config.rebuilt_path(archive.path());
        info!(strategy, output = %rebuilt_path.display(), "rebuilding package");
        let rebuilt = match strategies.repackager.build(&tree, &rebuilt_path) {
            Ok(rebuilt) => {
                summary.record(succeeded(Stage::Rebuild, stage_start).with_strategy(strategy));
                rebuilt
            }
            Err(e) => {
                let err = if e.is_cancelled() {
                    PipelineError::Cancelled(Stage::Rebuild)
                } else {
                    PipelineError::RebuildFailed(e)
                };
                summary.record(failed(Stage::Rebuild, stage_start, &err).with_strategy(strategy));
                return Err(err);
            }
        };

        // 5. Sign
        self.check_cancelled(Stage::Sign)?;
        let stage_start = Instant::now();
        let signer = ArtifactSigner::new(
            tools.keytool.clone(),
            tools.jarsigner.clone(),
            self.runner.clone(),
            self.config.timeouts.keygen(),
            self.config.timeouts.sign(),
        );
        let identity = SigningIdentity::scoped_to(&self.config.work_dir());
        let signed_path = self.config.signed_path(archive.path());
        // a signed package from an earlier run must not outlive a degraded signing
        if let Err(e) = remove_stale(&signed_path) {
            let err = PipelineError::Io(e);
            summary.record(failed(Stage::Sign, stage_start, &err));
            return Err(err);
        }
        let signing = signer.sign(&rebuilt, &identity, &signed_path);

        // the signer absorbs tool failures, including a killed child
        if self.cancel_token().is_cancelled() {
            let err = PipelineError::Cancelled(Stage::Sign);
            summary.record(failed(Stage::Sign, stage_start, &err));
            return Err(err);
        }

        summary.signing = Some(SigningRecord {
            trail: signing.trail.clone(),
            degraded: signing.degraded.clone(),
        });
        let record = match &signing.degraded {
            None => succeeded(Stage::Sign, stage_start),
            Some(degraded) => {
                summary.warn(format!("package left unsigned: {}", degraded.reason));
                StageRecord::new(Stage::Sign, StageStatus::Degraded, stage_start.elapsed())
                    .with_detail(degraded.reason.clone())
            }
        };
        summary.record(record.with_strategy("jarsigner"));

        let artifact = OutputArtifact::from_archive(&signing.artifact, signing.is_signed())?;

        Ok(PipelineOutcome {
            run_id: summary.run_id.clone(),
            artifact,
            rebuilt,
            asset: asset.path,
            patch,
            signing,
            warnings: summary.warnings.clone(),
            summary_path: None,
        })
    }

    fn probe(&self) -> ToolAvailability {
        let tools = self
            .tools
            .clone()
            .unwrap_or_else(|| ToolAvailability::probe(&self.config.tools));
        for check in tools.checks(&self.config.tools) {
            if !check.ok() {
                info!(tool = %check.name, fallback = %check.fallback, "tool not available");
            }
        }
        tools
    }

    fn check_cancelled(&self, next: Stage) -> PipelineResult<()> {
        if self.cancel_token().is_cancelled() {
            return Err(PipelineError::Cancelled(next));
        }
        Ok(())
    }

    /// Start every run from an empty working tree
    fn prepare_work_dir(&self) -> PipelineResult<()> {
        fs::create_dir_all(self.config.work_dir())?;
        remove_dir_if_exists(&self.config.tree_dir())?;
        Ok(())
    }

    fn discard_tree(&self) {
        let tree = self.config.tree_dir();
        match remove_dir_if_exists(&tree) {
            Ok(()) => info!(tree = %tree.display(), "working tree removed after cancellation"),
            Err(e) => warn!(tree = %tree.display(), error = %e, "cannot remove working tree"),
        }
    }

    fn persist_summary(&self, summary: &RunSummary) -> Option<PathBuf> {
        if !self.config.write_summary {
            return None;
        }
        let path = self.config.summary_path();
        let written = fs::create_dir_all(&self.config.output_dir)
            .and_then(|()| summary.write_to_file(&path));
        match written {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot write run summary");
                None
            }
        }
    }
}

fn extract_failure(e: ExtractError) -> PipelineError {
    if e.is_cancelled() {
        PipelineError::Cancelled(Stage::Extract)
    } else {
        PipelineError::ExtractionFailed(e)
    }
}

fn succeeded(stage: Stage, started: Instant) -> StageRecord {
    StageRecord::new(stage, StageStatus::Succeeded, started.elapsed())
}

fn failed(stage: Stage, started: Instant, err: &PipelineError) -> StageRecord {
    let status = if matches!(err, PipelineError::Cancelled(_)) {
        StageStatus::Cancelled
    } else {
        StageStatus::Failed
    };
    StageRecord::new(stage, status, started.elapsed()).with_detail(err.to_string())
}

fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn remove_stale(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
