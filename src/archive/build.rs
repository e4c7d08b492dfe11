//! Working tree → package

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::WorkingTree;
use crate::artifact::{ArtifactError, SourceArchive};
use crate::toolchain::{ToolError, ToolInvocation, ToolRunner};

/// Entries the platform expects uncompressed, or that do not shrink
const STORED_EXTENSIONS: &[&str] = &["arsc", "png", "jpg", "jpeg", "ogg", "mp3", "mp4", "wav"];

/// Rebuild errors
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("repackager failed: {0}")]
    Tool(#[from] ToolError),

    #[error("rebuilt package unusable: {0}")]
    Output(#[from] ArtifactError),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("path is not within the working tree: {}", .0.display())]
    PathNotInTree(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BuildError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildError::Tool(e) if e.is_cancelled())
    }
}

/// Result type for rebuilds
pub type BuildResult<T> = Result<T, BuildError>;

/// Reassembles a working tree into a compiled package
pub trait Repackager {
    fn strategy(&self) -> &'static str;

    /// Write the package to `output`, replacing any existing file
    fn build(&self, tree: &WorkingTree, output: &Path) -> BuildResult<SourceArchive>;
}

/// Structured rebuild with `apktool b`
#[derive(Debug, Clone)]
pub struct ApktoolRepackager {
    apktool: PathBuf,
    runner: ToolRunner,
    timeout: Duration,
}

impl ApktoolRepackager {
    pub fn new(apktool: PathBuf, runner: ToolRunner, timeout: Duration) -> Self {
        Self {
            apktool,
            runner,
            timeout,
        }
    }
}

impl Repackager for ApktoolRepackager {
    fn strategy(&self) -> &'static str {
        "apktool"
    }

    fn build(&self, tree: &WorkingTree, output: &Path) -> BuildResult<SourceArchive> {
        info!(tree = %tree.root().display(), output = %output.display(), "rebuilding with apktool");
        prepare_output(output)?;

        let invocation = ToolInvocation::new(&self.apktool, self.timeout)
            .arg("b")
            .arg(tree.root())
            .arg("-o")
            .arg(output);
        self.runner.run_checked(&invocation)?;

        Ok(SourceArchive::open(output)?)
    }
}

/// Re-archives every file of the tree into a fresh zip container
#[derive(Debug, Clone, Default)]
pub struct ZipRepackager {
    compress_everything: bool,
}

impl ZipRepackager {
    /// Deflate every entry, including ones normally stored
    pub fn compress_everything(mut self, yes: bool) -> Self {
        self.compress_everything = yes;
        self
    }

    fn options_for(&self, rel_path: &Path, size: u64) -> SimpleFileOptions {
        let stored = !self.compress_everything
            && rel_path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| STORED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);

        let method = if stored {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };

        SimpleFileOptions::default()
            .compression_method(method)
            .large_file(size >= u64::from(u32::MAX))
    }
}

impl Repackager for ZipRepackager {
    fn strategy(&self) -> &'static str {
        "zip"
    }

    fn build(&self, tree: &WorkingTree, output: &Path) -> BuildResult<SourceArchive> {
        info!(tree = %tree.root().display(), output = %output.display(), "re-archiving tree as zip");
        prepare_output(output)?;

        let mut writer = ZipWriter::new(BufWriter::new(File::create(output)?));
        let mut count = 0usize;

        for entry in WalkDir::new(tree.root())
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let rel_path = entry
                .path()
                .strip_prefix(tree.root())
                .map_err(|_| BuildError::PathNotInTree(entry.path().to_path_buf()))?;

            // zip entry names always use '/'
            let name = rel_path
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let size = entry.metadata()?.len();
            writer.start_file(name, self.options_for(rel_path, size))?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, &mut writer)?;
            count += 1;
        }

        writer.finish()?;
        info!(entries = count, "package re-archived");

        Ok(SourceArchive::open(output)?)
    }
}

fn prepare_output(output: &Path) -> io::Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::remove_file(output) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn make_tree(root: &Path) -> WorkingTree {
        fs::create_dir_all(root.join("assets/bin/Data")).unwrap();
        fs::write(root.join("AndroidManifest.xml"), b"<manifest/>").unwrap();
        fs::write(root.join("resources.arsc"), vec![7u8; 64]).unwrap();
        fs::write(root.join("assets/bin/Data/settings.asset"), b"MonoBehaviour:\n").unwrap();
        WorkingTree::new(root, "zip")
    }

    #[test]
    fn test_zip_build_preserves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let tree = make_tree(&dir.path().join("tree"));
        let output = dir.path().join("out/rebuilt.apk");

        let archive = ZipRepackager::default().build(&tree, &output).unwrap();
        assert_eq!(archive.path(), output.as_path());

        let mut zip = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "AndroidManifest.xml",
                "assets/bin/Data/settings.asset",
                "resources.arsc",
            ]
        );

        let mut contents = String::new();
        zip.by_name("assets/bin/Data/settings.asset")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "MonoBehaviour:\n");
    }

    #[test]
    fn test_resources_table_is_stored() {
        let dir = TempDir::new().unwrap();
        let tree = make_tree(&dir.path().join("tree"));
        let output = dir.path().join("rebuilt.apk");
        ZipRepackager::default().build(&tree, &output).unwrap();

        let mut zip = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        assert_eq!(
            zip.by_name("resources.arsc").unwrap().compression(),
            CompressionMethod::Stored
        );
        assert_eq!(
            zip.by_name("AndroidManifest.xml").unwrap().compression(),
            CompressionMethod::Deflated
        );
    }

    #[test]
    fn test_existing_output_is_replaced() {
        let dir = TempDir::new().unwrap();
        let tree = make_tree(&dir.path().join("tree"));
        let output = dir.path().join("rebuilt.apk");
        fs::write(&output, b"stale contents that are not a zip").unwrap();

        ZipRepackager::default().build(&tree, &output).unwrap();
        assert!(ZipArchive::new(File::open(&output).unwrap()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_apktool_missing_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("apktool");
        fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let tree = make_tree(&dir.path().join("tree"));
        let repackager = ApktoolRepackager::new(tool, ToolRunner::default(), Duration::from_secs(10));
        let err = repackager
            .build(&tree, &dir.path().join("rebuilt.apk"))
            .unwrap_err();
        assert!(matches!(err, BuildError::Output(ArtifactError::NotFound(_))));
    }
}
