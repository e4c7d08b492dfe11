//! Package extraction and reassembly
//!
//! Both directions have two strategies, chosen once per run from the tool
//! probe:
//! - structured: `apktool d` / `apktool b` (exit status is authoritative)
//! - raw: the package is a zip container, so unzip / re-zip it directly

mod build;
mod extract;

pub use build::{ApktoolRepackager, BuildError, BuildResult, Repackager, ZipRepackager};
pub use extract::{ApktoolExtractor, ExtractError, ExtractResult, Extractor, ZipExtractor};

use std::path::{Path, PathBuf};

use crate::timeout::TimeoutConfig;
use crate::toolchain::{ToolAvailability, ToolRunner};

/// Editable directory produced by an extractor
///
/// Owned by exactly one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingTree {
    root: PathBuf,
    strategy: &'static str,
}

impl WorkingTree {
    pub fn new(root: impl Into<PathBuf>, strategy: &'static str) -> Self {
        Self {
            root: root.into(),
            strategy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the extractor that produced this tree
    pub fn strategy(&self) -> &'static str {
        self.strategy
    }
}

/// Extract and rebuild strategies for one run
pub struct ArchiveStrategies {
    pub extractor: Box<dyn Extractor>,
    pub repackager: Box<dyn Repackager>,
}

impl ArchiveStrategies {
    /// Pick strategies from a single availability probe
    pub fn select(tools: &ToolAvailability, runner: &ToolRunner, timeouts: &TimeoutConfig) -> Self {
        match &tools.apktool {
            Some(apktool) => Self {
                extractor: Box::new(ApktoolExtractor::new(
                    apktool.clone(),
                    runner.clone(),
                    timeouts.decompile(),
                )),
                repackager: Box::new(ApktoolRepackager::new(
                    apktool.clone(),
                    runner.clone(),
                    timeouts.rebuild(),
                )),
            },
            None => Self::raw(),
        }
    }

    /// Raw zip strategies, no external tools
    pub fn raw() -> Self {
        Self {
            extractor: Box::new(ZipExtractor),
            repackager: Box::new(ZipRepackager::default()),
        }
    }
}
