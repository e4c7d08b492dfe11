//! Deployment orchestration
//!
//! A deployment wraps one pipeline run with the collaborator services from
//! `repack-collab`: the modified package is uploaded to a device-emulation
//! service and the manual test checklist is recorded next to it. Everything
//! ends up in `deployment_report.json`.
//!
//! Only the pipeline is fatal. A failed upload is written into the report
//! and the deployment still succeeds.

use chrono::{DateTime, Utc};
use repack_collab::{
    ChecklistCollector, ChecklistError, ChecklistResults, ChecklistSummary, UploadService,
    DEFAULT_CHECKLIST,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::artifact::{size_mb, ArtifactError, SourceArchive};
use crate::asset::PatchRequest;
use crate::pipeline::{Pipeline, PipelineError, PipelineOutcome};
use crate::summary::ExitCode;

/// Report file name inside the report directory
pub const DEPLOYMENT_REPORT_FILE: &str = "deployment_report.json";

/// Deployment errors
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("invalid source package: {0}")]
    InvalidSource(#[from] ArtifactError),

    #[error("checklist error: {0}")]
    Checklist(#[from] ChecklistError),

    #[error("deployment cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeployError {
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::Pipeline(e) => e.exit_code(),
            DeployError::Checklist(_) => ExitCode::Config.as_i32(),
            DeployError::Cancelled => ExitCode::Cancelled.as_i32(),
            DeployError::InvalidSource(_) | DeployError::Io(_) | DeployError::Serialization(_) => {
                ExitCode::Failure.as_i32()
            }
        }
    }
}

/// Result type for deployments
pub type DeployResult<T> = Result<T, DeployError>;

/// Which multiplayer backend the package now points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendChoice {
    Cloud {
        app_id: String,
    },
    SelfHosted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_id: Option<String>,
        server: String,
        port: u16,
    },
    NotConfigured,
}

impl BackendChoice {
    pub fn from_request(request: &PatchRequest) -> Self {
        match (&request.app_id, &request.server) {
            (app_id, Some(server)) => BackendChoice::SelfHosted {
                app_id: app_id.clone(),
                server: server.address.clone(),
                port: server.port,
            },
            (Some(app_id), None) => BackendChoice::Cloud {
                app_id: app_id.clone(),
            },
            (None, None) => BackendChoice::NotConfigured,
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, BackendChoice::NotConfigured)
    }
}

/// Input and output packages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApkRecord {
    pub original: PathBuf,

    /// None when no backend was requested and the original was used as is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<PathBuf>,

    pub signed: bool,

    /// Size of the package that was handed to the upload service
    pub size_mb: f64,
}

/// What happened to the upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadRecord {
    Uploaded { public_key: String, url: String },
    NotUploaded { reason: String },
    Failed { error: String },
}

impl UploadRecord {
    pub fn url(&self) -> Option<&str> {
        match self {
            UploadRecord::Uploaded { url, .. } => Some(url),
            _ => None,
        }
    }
}

/// deployment_report.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub timestamp: DateTime<Utc>,

    /// Pipeline run id, absent when the pipeline was skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    pub backend: BackendChoice,

    pub apk: ApkRecord,

    pub upload: UploadRecord,

    /// Checklist answers keyed by test name; empty when no collector ran
    pub tests: ChecklistResults,

    pub test_summary: ChecklistSummary,

    pub warnings: Vec<String>,
}

impl DeploymentReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Write atomically to file (write-then-rename)
    pub fn write_to_file(&self, path: &Path) -> DeployResult<()> {
        let json = self.to_json()?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

/// A finished deployment
#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    pub report: DeploymentReport,
    pub report_path: PathBuf,
    pub pipeline: Option<PipelineOutcome>,
}

/// Pipeline plus optional upload and checklist
pub struct Deployment {
    pipeline: Pipeline,
    uploader: Option<Box<dyn UploadService>>,
    checklist: Option<Box<dyn ChecklistCollector>>,
    report_dir: Option<PathBuf>,
}

impl Deployment {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            uploader: None,
            checklist: None,
            report_dir: None,
        }
    }

    pub fn with_uploader(mut self, uploader: Box<dyn UploadService>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_checklist(mut self, checklist: Box<dyn ChecklistCollector>) -> Self {
        self.checklist = Some(checklist);
        self
    }

    /// Directory for the report. Defaults to the pipeline's output dir.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn report_path(&self) -> PathBuf {
        self.report_dir
            .clone()
            .unwrap_or_else(|| self.pipeline.config().output_dir.clone())
            .join(DEPLOYMENT_REPORT_FILE)
    }

    pub fn run(&self, source: &Path, request: &PatchRequest) -> DeployResult<DeploymentOutcome> {
        // answers are read up front so a malformed file fails before any work
        let tests = match &self.checklist {
            Some(collector) => collector.collect(DEFAULT_CHECKLIST)?,
            None => ChecklistResults::new(),
        };

        let backend = BackendChoice::from_request(request);
        let mut warnings = Vec::new();

        let pipeline = if backend.is_configured() {
            Some(self.pipeline.run(source, request)?)
        } else {
            info!(source = %source.display(), "no backend requested, deploying the original package");
            warnings.push("no backend requested; package not modified".to_string());
            None
        };

        let apk = match &pipeline {
            Some(outcome) => {
                warnings.extend(outcome.warnings.iter().cloned());
                ApkRecord {
                    original: source.to_path_buf(),
                    modified: Some(outcome.artifact.path.clone()),
                    signed: outcome.artifact.signed,
                    size_mb: outcome.artifact.size_mb(),
                }
            }
            None => {
                let original = SourceArchive::open(source)?;
                ApkRecord {
                    original: source.to_path_buf(),
                    modified: None,
                    signed: false,
                    size_mb: size_mb(original.size_bytes()),
                }
            }
        };

        if self.pipeline.cancel_token().is_cancelled() {
            return Err(DeployError::Cancelled);
        }

        let upload_target = apk.modified.clone().unwrap_or_else(|| apk.original.clone());
        let upload = self.upload(&upload_target);
        if let UploadRecord::Failed { error } = &upload {
            warnings.push(format!("upload failed: {}", error));
        }

        let test_summary = ChecklistSummary::from_results(&tests);
        if !tests.is_empty() {
            info!(
                passed = test_summary.passed,
                failed = test_summary.failed,
                skipped = test_summary.skipped,
                "checklist recorded"
            );
        }

        let report = DeploymentReport {
            timestamp: Utc::now(),
            run_id: pipeline.as_ref().map(|p| p.run_id.clone()),
            backend,
            apk,
            upload,
            tests,
            test_summary,
            warnings,
        };

        let report_path = self.report_path();
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        report.write_to_file(&report_path)?;
        info!(report = %report_path.display(), "deployment report written");

        Ok(DeploymentOutcome {
            report,
            report_path,
            pipeline,
        })
    }

    fn upload(&self, artifact: &Path) -> UploadRecord {
        let Some(uploader) = &self.uploader else {
            return UploadRecord::NotUploaded {
                reason: "no upload service configured".to_string(),
            };
        };

        info!(artifact = %artifact.display(), "uploading package");
        match uploader.upload(artifact) {
            Ok(receipt) => {
                info!(url = %receipt.url, "upload finished");
                UploadRecord::Uploaded {
                    public_key: receipt.public_key,
                    url: receipt.url,
                }
            }
            Err(e) => {
                warn!(error = %e, "upload failed");
                UploadRecord::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use crate::toolchain::ToolAvailability;
    use repack_collab::{FileChecklist, TestOutcome, UploadError, UploadReceipt, UploadResult};
    use std::cell::RefCell;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    const SETTINGS: &str = "MonoBehaviour:\n  AppID: 1eb3a592-f2d1-41c1-ac3a-cd6308fca5cb\n  HostType: 4\n  ServerAddress:\n  ServerPort: 5055\n";

    struct RecordingUploader {
        uploaded: RefCell<Vec<PathBuf>>,
    }

    impl UploadService for RecordingUploader {
        fn upload(&self, artifact: &Path) -> UploadResult<UploadReceipt> {
            self.uploaded.borrow_mut().push(artifact.to_path_buf());
            Ok(UploadReceipt::from_public_key("pk_test"))
        }
    }

    struct RejectingUploader;

    impl UploadService for RejectingUploader {
        fn upload(&self, _artifact: &Path) -> UploadResult<UploadReceipt> {
            Err(UploadError::Rejected {
                status: 401,
                body: "bad key".to_string(),
            })
        }
    }

    fn write_apk(path: &Path) {
        let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
        writer
            .start_file("assets/PhotonServerSettings.asset", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(SETTINGS.as_bytes()).unwrap();
        writer.finish().unwrap();
    }

    fn pipeline(out: &Path) -> Pipeline {
        Pipeline::new(PipelineConfig::default().with_output_dir(out))
            .with_tools(ToolAvailability::none())
    }

    #[test]
    fn test_backend_choice_from_request() {
        assert_eq!(
            BackendChoice::from_request(&PatchRequest::new()),
            BackendChoice::NotConfigured
        );
        assert_eq!(
            BackendChoice::from_request(&PatchRequest::new().with_app_id("abc-123")),
            BackendChoice::Cloud {
                app_id: "abc-123".to_string()
            }
        );
        assert_eq!(
            BackendChoice::from_request(&PatchRequest::new().with_server("10.0.0.5", None)),
            BackendChoice::SelfHosted {
                app_id: None,
                server: "10.0.0.5".to_string(),
                port: 5055
            }
        );
    }

    #[test]
    fn test_deploy_uploads_modified_package() {
        let dir = TempDir::new().unwrap();
        let apk = dir.path().join("game.apk");
        write_apk(&apk);
        let out = dir.path().join("out");

        let answers = dir.path().join("answers.toml");
        fs::write(
            &answers,
            "\"APK loads without crashes\" = \"y\"\n\"Game saves progress\" = \"n\"\n",
        )
        .unwrap();

        let deployment = Deployment::new(pipeline(&out))
            .with_uploader(Box::new(RecordingUploader {
                uploaded: RefCell::new(Vec::new()),
            }))
            .with_checklist(Box::new(FileChecklist::new(&answers)));

        let outcome = deployment
            .run(&apk, &PatchRequest::new().with_app_id("abc-123"))
            .unwrap();

        assert_eq!(outcome.report_path, out.join(DEPLOYMENT_REPORT_FILE));
        assert_eq!(
            outcome.report.apk.modified,
            Some(out.join("game_Modified.apk"))
        );
        assert_eq!(
            outcome.report.upload.url(),
            Some("https://appetize.io/app/pk_test")
        );
        assert_eq!(outcome.report.tests.len(), DEFAULT_CHECKLIST.len());
        assert_eq!(
            outcome.report.tests["Game saves progress"],
            TestOutcome::Fail
        );
        assert_eq!(outcome.report.test_summary.passed, 1);
        assert_eq!(outcome.report.test_summary.failed, 1);
        assert_eq!(outcome.report.test_summary.skipped, 8);

        let loaded = DeploymentReport::from_file(&outcome.report_path).unwrap();
        assert_eq!(
            loaded.backend,
            BackendChoice::Cloud {
                app_id: "abc-123".to_string()
            }
        );
    }

    #[test]
    fn test_upload_failure_is_recorded() {
        let dir = TempDir::new().unwrap();
        let apk = dir.path().join("game.apk");
        write_apk(&apk);
        let out = dir.path().join("out");

        let outcome = Deployment::new(pipeline(&out))
            .with_uploader(Box::new(RejectingUploader))
            .run(&apk, &PatchRequest::new().with_server("10.0.0.5", Some(7000)))
            .unwrap();

        assert!(matches!(outcome.report.upload, UploadRecord::Failed { .. }));
        assert!(outcome
            .report
            .warnings
            .iter()
            .any(|w| w.starts_with("upload failed")));
        assert!(outcome.report_path.is_file());
    }

    #[test]
    fn test_no_backend_skips_pipeline() {
        let dir = TempDir::new().unwrap();
        let apk = dir.path().join("game.apk");
        write_apk(&apk);
        let out = dir.path().join("out");
        let reports = dir.path().join("reports");

        let outcome = Deployment::new(pipeline(&out))
            .with_report_dir(&reports)
            .run(&apk, &PatchRequest::new())
            .unwrap();

        assert!(outcome.pipeline.is_none());
        assert!(outcome.report.apk.modified.is_none());
        assert_eq!(
            outcome.report.upload,
            UploadRecord::NotUploaded {
                reason: "no upload service configured".to_string()
            }
        );
        assert!(outcome.report.tests.is_empty());
        assert_eq!(outcome.report_path, reports.join(DEPLOYMENT_REPORT_FILE));
        assert!(!out.join("game_Modified.apk").exists());
    }

    #[test]
    fn test_pipeline_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");

        let err = Deployment::new(pipeline(&out))
            .run(
                &dir.path().join("missing.apk"),
                &PatchRequest::new().with_app_id("abc-123"),
            )
            .unwrap_err();

        assert!(matches!(err, DeployError::Pipeline(PipelineError::InvalidSource(_))));
        assert_eq!(err.exit_code(), 1);
        assert!(!out.join(DEPLOYMENT_REPORT_FILE).exists());
    }

    #[test]
    fn test_malformed_checklist_fails_fast() {
        let dir = TempDir::new().unwrap();
        let apk = dir.path().join("game.apk");
        write_apk(&apk);
        let out = dir.path().join("out");
        let answers = dir.path().join("answers.toml");
        fs::write(&answers, "not = [valid").unwrap();

        let err = Deployment::new(pipeline(&out))
            .with_checklist(Box::new(FileChecklist::new(&answers)))
            .run(&apk, &PatchRequest::new().with_app_id("abc-123"))
            .unwrap_err();

        assert!(matches!(err, DeployError::Checklist(_)));
        assert_eq!(err.exit_code(), 2);
        assert!(!out.join("game_Modified.apk").exists());
    }
}
