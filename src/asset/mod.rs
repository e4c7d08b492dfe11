//! Photon server settings asset
//!
//! Locates the networking settings asset inside a working tree and retargets
//! it at a new cloud application id or a self-hosted server.
//!
//! Patching tries two strategies in order:
//! 1. structured: parse the Unity YAML body, edit the `MonoBehaviour` group
//!    and serialize it back (directive/document header kept verbatim)
//! 2. text: literal substitutions against the raw text, used whenever the
//!    structured strategy is unavailable for this asset

mod locate;
mod patch;
mod structured;
mod text;

pub use locate::{ConfigLocator, ConfigurationAsset, LocateError, LocateResult};
pub use patch::{
    ConfigPatcher, PatchError, PatchOutcome, PatchRequest, PatchResult, PatchStrategy,
    PatchedField, ServerEndpoint,
};

/// File name of the settings asset
pub const DEFAULT_ASSET_FILE_NAME: &str = "PhotonServerSettings.asset";

/// Group holding every networking field
pub const SETTINGS_GROUP: &str = "MonoBehaviour";

pub const APP_ID_KEY: &str = "AppID";
pub const HOST_TYPE_KEY: &str = "HostType";
pub const SERVER_ADDRESS_KEY: &str = "ServerAddress";
pub const SERVER_PORT_KEY: &str = "ServerPort";

/// Application id shipped in the stock asset
pub const DEFAULT_APP_ID: &str = "1eb3a592-f2d1-41c1-ac3a-cd6308fca5cb";

/// `HostType` value of the stock asset (best-region cloud)
pub const HOST_TYPE_CLOUD: u64 = 4;

/// `HostType` value selecting a custom address/port
pub const HOST_TYPE_SELF_HOSTED: u64 = 2;

pub const DEFAULT_SERVER_PORT: u16 = 5055;
