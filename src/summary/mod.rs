//! Run summary and failure taxonomy
//!
//! Every pipeline run, successful or not, can leave a `summary.json` in its
//! output directory describing what was attempted and how it ended.

mod failure;
mod run_summary;

pub use failure::{ExitCode, FailureKind, Status};
pub use run_summary::{
    RunSummary, SigningRecord, SourceRecord, Stage, StageRecord, StageStatus, RUN_SUMMARY_FILE,
    RUN_SUMMARY_SCHEMA_ID, RUN_SUMMARY_SCHEMA_VERSION,
};
