//! Remote device-emulation upload
//!
//! Publishes a built package to an emulation service and returns the public
//! reference the tester opens in a browser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default upload endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.appetize.io/v1/apps";

/// Public app page prefix
pub const APP_URL_PREFIX: &str = "https://appetize.io/app/";

/// Upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upload rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("upload response missing publicKey")]
    MissingPublicKey,
}

/// Result type for uploads
pub type UploadResult<T> = Result<T, UploadError>;

/// Successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub public_key: String,
    pub url: String,
}

impl UploadReceipt {
    pub fn from_public_key(public_key: impl Into<String>) -> Self {
        let public_key = public_key.into();
        let url = format!("{}{}", APP_URL_PREFIX, public_key);
        Self { public_key, url }
    }
}

/// Accepts a binary artifact and returns a public reference
pub trait UploadService {
    fn upload(&self, artifact: &Path) -> UploadResult<UploadReceipt>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    public_key: Option<String>,
}

/// Multipart uploader for the Appetize API
pub struct AppetizeUploader {
    endpoint: String,
    api_key: String,
    platform: String,
    timeout: Duration,
}

impl AppetizeUploader {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            platform: "android".to_string(),
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl UploadService for AppetizeUploader {
    fn upload(&self, artifact: &Path) -> UploadResult<UploadReceipt> {
        info!(artifact = %artifact.display(), endpoint = %self.endpoint, "uploading artifact");

        let form = reqwest::blocking::multipart::Form::new()
            .text("platform", self.platform.clone())
            .file("file", artifact)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;

        let response = client
            .post(&self.endpoint)
            .basic_auth(&self.api_key, Some(""))
            .multipart(form)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = response.json()?;
        debug!(?parsed, "upload response");
        let public_key = parsed
            .public_key
            .filter(|k| !k.is_empty())
            .ok_or(UploadError::MissingPublicKey)?;

        Ok(UploadReceipt::from_public_key(public_key))
    }
}
