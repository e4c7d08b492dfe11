//! Photon Repack - retarget the multiplayer backend of a compiled game package
//!
//! This crate takes a compiled Android package built with the Photon
//! networking SDK, rewrites the embedded `PhotonServerSettings.asset` to point
//! at a different application id or a self-hosted server, and produces a
//! rebuilt (and, when the signing tools are present, signed) package.
//!
//! The work is a linear pipeline of stages, each with a preferred external
//! tool and a built-in fallback: extract, locate, patch, rebuild, sign.

pub mod archive;
pub mod artifact;
pub mod asset;
pub mod config;
pub mod deploy;
pub mod pipeline;
pub mod signal;
pub mod summary;
pub mod timeout;
pub mod toolchain;

pub use artifact::{OutputArtifact, SignOutcome, SourceArchive};
pub use asset::{PatchOutcome, PatchRequest, ServerEndpoint};
pub use config::{EffectiveConfig, RepackConfig};
pub use deploy::{Deployment, DeploymentReport, DeployError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineOutcome};
pub use signal::{CancelToken, SignalHandler};
pub use summary::{RunSummary, Stage};
pub use toolchain::{ToolAvailability, ToolsConfig};
