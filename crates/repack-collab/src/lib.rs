//! Collaborator contracts for photon-repack
//!
//! The artifact pipeline never calls into this crate. An orchestrator
//! composes these services around the pipeline's output artifact:
//! - `player`: player/session store keyed by device id
//! - `upload`: remote device-emulation upload returning a public URL
//! - `checklist`: manual test checklist results

pub mod checklist;
pub mod player;
pub mod upload;

pub use checklist::{
    ChecklistCollector, ChecklistError, ChecklistResults, ChecklistSummary, FileChecklist,
    TestOutcome, DEFAULT_CHECKLIST,
};
pub use player::{
    GameProgress, InMemoryPlayerStore, Player, PlayerStore, PlayerUpdate, Session, StoreError,
    StoreStats,
};
pub use upload::{AppetizeUploader, UploadError, UploadReceipt, UploadResult, UploadService};
