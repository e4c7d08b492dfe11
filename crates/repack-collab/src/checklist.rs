//! Manual test checklist
//!
//! Results are collected outside the pipeline (by a tester, a file, or a
//! harness) and summarized into pass/fail/skip counts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Tests performed on the emulated device after upload
pub const DEFAULT_CHECKLIST: &[&str] = &[
    "APK loads without crashes",
    "Connects to server (check logs)",
    "Player authentication works",
    "Main menu displays correctly",
    "Can start a level",
    "Dragon movement responds",
    "Multiplayer lobby accessible (if applicable)",
    "No network timeout errors",
    "Game saves progress",
    "Performance is acceptable",
];

/// Checklist errors
#[derive(Debug, Error)]
pub enum ChecklistError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Outcome of one manual test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Pass,
    Fail,
    Skip,
}

impl TestOutcome {
    /// Parse a tester's answer: `y`/`pass` passes, `n`/`fail` fails,
    /// anything else is a skip.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" | "pass" | "passed" => TestOutcome::Pass,
            "n" | "no" | "fail" | "failed" => TestOutcome::Fail,
            _ => TestOutcome::Skip,
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOutcome::Pass => write!(f, "pass"),
            TestOutcome::Fail => write!(f, "fail"),
            TestOutcome::Skip => write!(f, "skip"),
        }
    }
}

/// Test name to outcome
pub type ChecklistResults = BTreeMap<String, TestOutcome>;

/// Source of checklist results
pub trait ChecklistCollector {
    /// Return an outcome for every test in `tests`. Tests the collector has
    /// no answer for are reported as skipped.
    fn collect(&self, tests: &[&str]) -> Result<ChecklistResults, ChecklistError>;
}

/// Reads answers from a TOML table of `"test name" = "y" | "n" | "skip"`
#[derive(Debug, Clone)]
pub struct FileChecklist {
    path: PathBuf,
}

impl FileChecklist {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_answers(&self) -> Result<BTreeMap<String, String>, ChecklistError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| ChecklistError::Io {
            path: self.path.clone(),
            source,
        })?;
        let table: toml::Table = toml::from_str(&contents).map_err(|e| ChecklistError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        Ok(table
            .into_iter()
            .map(|(name, value)| {
                let answer = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Boolean(true) => "y".to_string(),
                    toml::Value::Boolean(false) => "n".to_string(),
                    other => other.to_string(),
                };
                (name, answer)
            })
            .collect())
    }
}

impl ChecklistCollector for FileChecklist {
    fn collect(&self, tests: &[&str]) -> Result<ChecklistResults, ChecklistError> {
        let answers = self.load_answers()?;
        Ok(tests
            .iter()
            .map(|test| {
                let outcome = answers
                    .get(*test)
                    .map(|a| TestOutcome::from_answer(a))
                    .unwrap_or(TestOutcome::Skip);
                (test.to_string(), outcome)
            })
            .collect())
    }
}

/// Pass/fail/skip counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ChecklistSummary {
    pub fn from_results(results: &ChecklistResults) -> Self {
        let mut summary = Self::default();
        for outcome in results.values() {
            match outcome {
                TestOutcome::Pass => summary.passed += 1,
                TestOutcome::Fail => summary.failed += 1,
                TestOutcome::Skip => summary.skipped += 1,
            }
        }
        summary
    }

    /// True when nothing failed and at least one test passed
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.passed > 0
    }

    pub fn to_human(&self) -> String {
        format!(
            "Test Results: {} passed, {} failed, {} skipped",
            self.passed, self.failed, self.skipped
        )
    }
}
