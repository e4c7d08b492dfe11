//! Package → working tree

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};
use zip::ZipArchive;

use super::WorkingTree;
use crate::artifact::SourceArchive;
use crate::toolchain::{ToolError, ToolInvocation, ToolRunner};

/// Extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("decompiler failed: {0}")]
    Tool(#[from] ToolError),

    #[error("decompiler produced no directory at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("corrupt or unreadable package: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ExtractError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExtractError::Tool(e) if e.is_cancelled())
    }
}

/// Result type for extraction
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Turns a compiled package into an editable directory tree
pub trait Extractor {
    /// Short strategy name for logs and summaries
    fn strategy(&self) -> &'static str;

    /// Extract `source` into `dest`. `dest` must not exist or be empty.
    fn extract(&self, source: &SourceArchive, dest: &Path) -> ExtractResult<WorkingTree>;
}

/// Structured decompilation with `apktool d`
#[derive(Debug, Clone)]
pub struct ApktoolExtractor {
    apktool: PathBuf,
    runner: ToolRunner,
    timeout: Duration,
}

impl ApktoolExtractor {
    pub fn new(apktool: PathBuf, runner: ToolRunner, timeout: Duration) -> Self {
        Self {
            apktool,
            runner,
            timeout,
        }
    }
}

impl Extractor for ApktoolExtractor {
    fn strategy(&self) -> &'static str {
        "apktool"
    }

    fn extract(&self, source: &SourceArchive, dest: &Path) -> ExtractResult<WorkingTree> {
        info!(source = %source.path().display(), "decompiling with apktool");

        let invocation = ToolInvocation::new(&self.apktool, self.timeout)
            .args(["d", "-f"])
            .arg(source.path())
            .arg("-o")
            .arg(dest);
        self.runner.run_checked(&invocation)?;

        if !dest.is_dir() {
            return Err(ExtractError::MissingOutput(dest.to_path_buf()));
        }

        Ok(WorkingTree::new(dest, self.strategy()))
    }
}

/// Raw extraction of the package's zip container
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn strategy(&self) -> &'static str {
        "zip"
    }

    fn extract(&self, source: &SourceArchive, dest: &Path) -> ExtractResult<WorkingTree> {
        info!(source = %source.path().display(), "extracting package as zip");

        let reader = BufReader::new(File::open(source.path())?);
        let mut archive = ZipArchive::new(reader)?;
        fs::create_dir_all(dest)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let outpath = match entry.enclosed_name() {
                Some(path) => dest.join(path),
                None => {
                    debug!(name = entry.name(), "skipping entry outside the tree");
                    continue;
                }
            };

            if entry.is_dir() {
                fs::create_dir_all(&outpath)?;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            io::copy(&mut entry, &mut outfile)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    fs::set_permissions(&outpath, fs::Permissions::from_mode(mode & 0o777))?;
                }
            }
        }

        Ok(WorkingTree::new(dest, self.strategy()))
    }
}
