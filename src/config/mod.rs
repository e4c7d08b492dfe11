//! Configuration merge system
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. Host/user config (~/.config/photon-repack/config.toml)
//! 3. Project config (./photon-repack.toml, or --config)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::{
    AssetConfig, OutputConfig, PatchDefaults, RepackConfig, UploadConfig, DEFAULT_UPLOAD_ENDPOINT,
};
pub use effective::{
    default_host_config_path, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig,
    PROJECT_CONFIG_FILE, SCHEMA_ID,
};
pub use merge::{deep_merge, merge_layers};
