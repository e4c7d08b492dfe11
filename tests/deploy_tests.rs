//! Deployment runs with stand-in collaborators

mod fixtures;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fixtures::{game_apk, read_entry, ASSET_ENTRY};
use photon_repack::deploy::{
    BackendChoice, Deployment, DeploymentReport, UploadRecord, DEPLOYMENT_REPORT_FILE,
};
use photon_repack::{PatchRequest, Pipeline, PipelineConfig, ToolAvailability};
use repack_collab::{
    ChecklistCollector, ChecklistError, ChecklistResults, TestOutcome, UploadReceipt,
    UploadResult, UploadService, DEFAULT_CHECKLIST,
};
use tempfile::TempDir;

/// Records every upload and answers with a fixed key
#[derive(Clone, Default)]
struct StubUploader {
    uploads: Arc<Mutex<Vec<PathBuf>>>,
}

impl UploadService for StubUploader {
    fn upload(&self, artifact: &Path) -> UploadResult<UploadReceipt> {
        self.uploads.lock().unwrap().push(artifact.to_path_buf());
        Ok(UploadReceipt::from_public_key("p7nww3n6ubq73r1nh9jtauqy8w"))
    }
}

/// Passes everything
struct AllPass;

impl ChecklistCollector for AllPass {
    fn collect(&self, tests: &[&str]) -> Result<ChecklistResults, ChecklistError> {
        Ok(tests
            .iter()
            .map(|t| (t.to_string(), TestOutcome::Pass))
            .collect())
    }
}

fn pipeline(out: &Path) -> Pipeline {
    Pipeline::new(PipelineConfig::default().with_output_dir(out))
        .with_tools(ToolAvailability::none())
}

#[test]
fn test_self_hosted_deployment_report() {
    let dir = TempDir::new().unwrap();
    let apk = game_apk(dir.path());
    let out = dir.path().join("out");
    let uploader = StubUploader::default();

    let outcome = Deployment::new(pipeline(&out))
        .with_uploader(Box::new(uploader.clone()))
        .with_checklist(Box::new(AllPass))
        .run(&apk, &PatchRequest::new().with_server("play.example.net", Some(5056)))
        .unwrap();

    let modified = out.join("DragonLand_Modified.apk");
    assert_eq!(*uploader.uploads.lock().unwrap(), vec![modified.clone()]);
    assert!(read_entry(&modified, ASSET_ENTRY).contains("ServerPort: 5056"));

    let report = DeploymentReport::from_file(&out.join(DEPLOYMENT_REPORT_FILE)).unwrap();
    assert_eq!(
        report.backend,
        BackendChoice::SelfHosted {
            app_id: None,
            server: "play.example.net".to_string(),
            port: 5056,
        }
    );
    assert_eq!(report.apk.original, apk);
    assert_eq!(report.apk.modified, Some(modified));
    assert!(report.apk.size_mb > 0.0);
    assert_eq!(
        report.upload.url(),
        Some("https://appetize.io/app/p7nww3n6ubq73r1nh9jtauqy8w")
    );
    assert_eq!(report.test_summary.passed, DEFAULT_CHECKLIST.len());
    assert!(report.test_summary.all_passed());
    assert_eq!(report.run_id, outcome.pipeline.map(|p| p.run_id));
}

#[test]
fn test_report_json_shape() {
    let dir = TempDir::new().unwrap();
    let apk = game_apk(dir.path());
    let out = dir.path().join("out");

    Deployment::new(pipeline(&out))
        .run(&apk, &PatchRequest::new().with_app_id("abc-123"))
        .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join(DEPLOYMENT_REPORT_FILE)).unwrap())
            .unwrap();
    assert_eq!(json["backend"]["type"], "cloud");
    assert_eq!(json["backend"]["app_id"], "abc-123");
    assert_eq!(json["upload"]["status"], "not_uploaded");
    assert!(json["apk"]["size_mb"].is_number());
    assert!(json["timestamp"].is_string());
    assert_eq!(json["tests"], serde_json::json!({}));
}

#[test]
fn test_unconfigured_backend_uploads_original() {
    let dir = TempDir::new().unwrap();
    let apk = game_apk(dir.path());
    let out = dir.path().join("out");
    let uploader = StubUploader::default();

    let outcome = Deployment::new(pipeline(&out))
        .with_uploader(Box::new(uploader.clone()))
        .run(&apk, &PatchRequest::new().with_app_id("   "))
        .unwrap();

    assert_eq!(outcome.report.backend, BackendChoice::NotConfigured);
    assert_eq!(*uploader.uploads.lock().unwrap(), vec![apk.clone()]);
    assert!(matches!(outcome.report.upload, UploadRecord::Uploaded { .. }));
    assert!(!out.join("DragonLand_Modified.apk").exists());
}
