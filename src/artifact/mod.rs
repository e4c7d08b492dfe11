//! Package files flowing through the pipeline
//!
//! A `SourceArchive` is any compiled package on disk: the caller's input,
//! the rebuilt package, or the signed package. It is never mutated.
//! `OutputArtifact` is the terminal file handed back to the caller.

mod signing;

pub use signing::{
    ArtifactSigner, SignOutcome, SigningDegraded, SigningIdentity, SigningState,
    DISTINGUISHED_NAME, KEYSTORE_FILE_NAME, KEYSTORE_PASSWORD, KEY_ALGORITHM, KEY_ALIAS,
    KEY_SIZE, VALIDITY_DAYS,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors opening a package file
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("package not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("package is empty: {}", .0.display())]
    Empty(PathBuf),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An immutable compiled package on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArchive {
    path: PathBuf,
    size_bytes: u64,
}

impl SourceArchive {
    /// Open an existing, non-empty package file
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let path = path.into();
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(path));
            }
            Err(source) => return Err(ArtifactError::Io { path, source }),
        };

        if !metadata.is_file() {
            return Err(ArtifactError::NotAFile(path));
        }
        if metadata.len() == 0 {
            return Err(ArtifactError::Empty(path));
        }

        Ok(Self {
            size_bytes: metadata.len(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Hex SHA-256 of the file contents
    pub fn sha256(&self) -> io::Result<String> {
        sha256_file(&self.path)
    }
}

/// Terminal artifact of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
    /// False when signing degraded and the unsigned rebuild was returned
    pub signed: bool,
}

impl OutputArtifact {
    pub fn from_archive(archive: &SourceArchive, signed: bool) -> io::Result<Self> {
        Ok(Self {
            path: archive.path().to_path_buf(),
            size_bytes: archive.size_bytes(),
            sha256: archive.sha256()?,
            signed,
        })
    }

    pub fn size_mb(&self) -> f64 {
        size_mb(self.size_bytes)
    }
}

/// Bytes to MiB, as shown to users
pub fn size_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Hex SHA-256 of a file, streamed
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
