//! Find the settings asset by file name

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use super::DEFAULT_ASSET_FILE_NAME;
use crate::archive::WorkingTree;

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("{file_name} not found under {}", root.display())]
    NotFound { file_name: String, root: PathBuf },

    #[error("cannot walk working tree: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type LocateResult<T> = Result<T, LocateError>;

/// A located settings asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationAsset {
    /// The asset that will be patched
    pub path: PathBuf,
    /// Later matches with the same name, never touched
    pub ignored: Vec<PathBuf>,
}

/// Walks a working tree looking for one file name
///
/// Directory entries are visited depth-first, sorted by name, so the result
/// is stable for a given tree. The first match wins.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    file_name: String,
}

impl Default for ConfigLocator {
    fn default() -> Self {
        Self::new(DEFAULT_ASSET_FILE_NAME)
    }
}

impl ConfigLocator {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Every regular file named `file_name`, in walk order
    pub fn locate_all(&self, root: &Path) -> LocateResult<Vec<PathBuf>> {
        let mut matches = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry?;
            if entry.file_type().is_file() && entry.file_name() == self.file_name.as_str() {
                matches.push(entry.into_path());
            }
        }
        Ok(matches)
    }

    pub fn locate(&self, tree: &WorkingTree) -> LocateResult<ConfigurationAsset> {
        let mut matches = self.locate_all(tree.root())?.into_iter();

        let path = matches.next().ok_or_else(|| LocateError::NotFound {
            file_name: self.file_name.clone(),
            root: tree.root().to_path_buf(),
        })?;
        let ignored: Vec<PathBuf> = matches.collect();

        info!(asset = %path.display(), "settings asset found");
        for other in &ignored {
            warn!(
                used = %path.display(),
                ignored = %other.display(),
                "duplicate settings asset ignored"
            );
        }

        Ok(ConfigurationAsset { path, ignored })
    }
}
